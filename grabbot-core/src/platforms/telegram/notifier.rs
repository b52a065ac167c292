use std::sync::Arc;
use async_trait::async_trait;
use tracing::{info, warn};

use grabbot_common::traits::AdminNotifier;
use crate::platforms::ChatSender;
use crate::Error;

/// Sends admin notifications as chat messages to one configured chat.
pub struct TelegramNotifier {
    sender: Arc<dyn ChatSender>,
    admin_chat_id: i64,
}

impl TelegramNotifier {
    /// `admin_chat_id == 0` means nobody is listening; messages are only logged.
    pub fn new(sender: Arc<dyn ChatSender>, admin_chat_id: i64) -> Self {
        Self { sender, admin_chat_id }
    }
}

#[async_trait]
impl AdminNotifier for TelegramNotifier {
    async fn notify_admin(&self, message: &str) -> Result<(), Error> {
        if self.admin_chat_id == 0 {
            warn!("Admin notification not sent (no admin chat configured): {}", message);
            return Ok(());
        }
        self.sender.send_text(self.admin_chat_id, message).await?;
        info!("Notified admin ({}): {}", self.admin_chat_id, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockChatSender;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn sends_to_admin_chat() {
        let mut sender = MockChatSender::new();
        sender
            .expect_send_text()
            .with(eq(55), eq("captcha!"))
            .times(1)
            .returning(|_, _| Ok(()));
        let notifier = TelegramNotifier::new(Arc::new(sender), 55);
        notifier.notify_admin("captcha!").await.unwrap();
    }

    #[tokio::test]
    async fn no_admin_is_not_an_error() {
        let mut sender = MockChatSender::new();
        sender.expect_send_text().times(0);
        let notifier = TelegramNotifier::new(Arc::new(sender), 0);
        assert!(notifier.notify_admin("hello").await.is_ok());
    }

    #[tokio::test]
    async fn send_failures_propagate_to_the_caller() {
        let mut sender = MockChatSender::new();
        sender
            .expect_send_text()
            .returning(|_, _| Err(Error::Platform("blocked by user".into())));
        let notifier = TelegramNotifier::new(Arc::new(sender), 55);
        assert!(notifier.notify_admin("x").await.is_err());
    }
}
