//! src/platforms/telegram/runtime.rs
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::eventbus::EventBus;
use crate::platforms::{ConnectionStatus, PlatformIntegration};

use super::client::{TelegramClient, Update};

pub const PLATFORM_NAME: &str = "telegram";

/// Wait after a failed poll before asking again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct TelegramPlatform {
    pub client: Arc<TelegramClient>,
    pub connection_status: ConnectionStatus,
    pub event_bus: Arc<EventBus>,
    pub poll_timeout_secs: u64,

    /// Our own user id; our messages are never fed back in.
    pub bot_user_id: Option<i64>,

    /// The poll loop that publishes chat messages onto the bus.
    pub read_loop_handle: Option<JoinHandle<()>>,
}

impl TelegramPlatform {
    pub fn new(client: Arc<TelegramClient>, event_bus: Arc<EventBus>, poll_timeout_secs: u64) -> Self {
        Self {
            client,
            connection_status: ConnectionStatus::Disconnected,
            event_bus,
            poll_timeout_secs,
            bot_user_id: None,
            read_loop_handle: None,
        }
    }
}

/// Publishes every text-bearing update and returns the next offset.
pub async fn publish_updates(
    bus: &EventBus,
    updates: Vec<Update>,
    mut offset: i64,
    bot_user_id: Option<i64>,
) -> i64 {
    for update in updates {
        offset = offset.max(update.update_id + 1);
        let Some(msg) = update.into_message() else {
            continue;
        };
        let sender_id = msg.sender_id();
        if Some(sender_id) == bot_user_id {
            debug!("(TelegramPlatform) ignoring own message in chat {}", msg.chat.id);
            continue;
        }
        match msg.body() {
            Some(text) if !text.trim().is_empty() => {
                bus.publish_chat(PLATFORM_NAME, msg.chat.id, sender_id, text).await;
            }
            _ => debug!("(TelegramPlatform) skipping non-text message {}", msg.message_id),
        }
    }
    offset
}

#[async_trait]
impl PlatformIntegration for TelegramPlatform {
    async fn connect(&mut self) -> Result<(), Error> {
        if self.read_loop_handle.is_some() {
            info!("(TelegramPlatform) connect => already connected");
            return Ok(());
        }

        let me = match self.client.get_me().await {
            Ok(me) => me,
            Err(e) => {
                let msg = format!("Error connecting to Telegram => {}", e);
                error!("{}", msg);
                self.connection_status = ConnectionStatus::Error(msg);
                return Err(e);
            }
        };
        info!(
            "(TelegramPlatform) connected as @{} (id {})",
            me.username.as_deref().unwrap_or("?"),
            me.id
        );
        self.bot_user_id = Some(me.id);
        self.connection_status = ConnectionStatus::Connected;

        let client = Arc::clone(&self.client);
        let bus = Arc::clone(&self.event_bus);
        let timeout = self.poll_timeout_secs;
        let bot_user_id = self.bot_user_id;
        let mut shutdown_rx = bus.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let mut offset: i64 = 0;
            loop {
                if bus.is_shutdown() {
                    break;
                }
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("(TelegramPlatform) shutdown signal received");
                        break;
                    }
                    result = client.get_updates(offset, timeout) => {
                        match result {
                            Ok(updates) => {
                                offset = publish_updates(&bus, updates, offset, bot_user_id).await;
                            }
                            Err(e) => {
                                warn!("(TelegramPlatform) getUpdates failed: {} => retrying", e);
                                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                            }
                        }
                    }
                }
            }
            info!("(TelegramPlatform) read loop ended.");
        });
        self.read_loop_handle = Some(handle);

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;
        if let Some(h) = self.read_loop_handle.take() {
            h.abort();
        }
        Ok(())
    }

    async fn send_message(&self, chat_id: i64, message: &str) -> Result<(), Error> {
        self.client.send_message(chat_id, message).await
    }

    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error> {
        Ok(self.connection_status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventbus::BotEvent;

    fn update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn publishes_text_and_advances_offset() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(10)).await;

        let updates = vec![
            update(r#"{"update_id":5,"message":{"message_id":1,"chat":{"id":-1,"type":"group"},"from":{"id":9},"text":"Code: AB3D9F8K"}}"#),
            // our own echo
            update(r#"{"update_id":6,"message":{"message_id":2,"chat":{"id":-1,"type":"group"},"from":{"id":1000},"text":"hi"}}"#),
            // sticker, no text
            update(r#"{"update_id":7,"message":{"message_id":3,"chat":{"id":-1,"type":"group"},"from":{"id":9}}}"#),
        ];
        let next = publish_updates(&bus, updates, 0, Some(1000)).await;
        assert_eq!(next, 8);

        match rx.try_recv().unwrap() {
            BotEvent::ChatMessage { platform, chat_id, sender_id, text, .. } => {
                assert_eq!(platform, "telegram");
                assert_eq!(chat_id, -1);
                assert_eq!(sender_id, 9);
                assert_eq!(text, "Code: AB3D9F8K");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
