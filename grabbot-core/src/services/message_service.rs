use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use grabbot_common::models::{Code, TelegramConfig};
use crate::eventbus::{BotEvent, EventBus};
use crate::platforms::ChatSender;
use crate::services::claim_service::{ClaimCoordinator, Disposition};
use crate::services::code_extractor;
use crate::services::command_service::{CommandContext, CommandService};
use crate::Error;

/// Switches the admin flips at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub monitoring: bool,
    pub auto_claim: bool,
    /// Empty = every chat.
    pub allowed_chats: BTreeSet<i64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            monitoring: true,
            auto_claim: true,
            allowed_chats: BTreeSet::new(),
        }
    }
}

impl SessionState {
    pub fn from_config(cfg: &TelegramConfig) -> Self {
        Self {
            allowed_chats: cfg.allowed_chats.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn accepts_chat(&self, chat_id: i64) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub sender_id: i64,
    pub text: String,
}

impl IncomingMessage {
    pub fn new(chat_id: i64, sender_id: i64, text: impl Into<String>) -> Self {
        Self { chat_id, sender_id, text: text.into() }
    }
}

/// Routes chat messages: commands to the [`CommandService`], everything
/// else through the code extractor into the claim coordinator.
pub struct MessageService {
    coordinator: Arc<ClaimCoordinator>,
    command_service: Arc<CommandService>,
    replies: Arc<dyn ChatSender>,
    session: Mutex<SessionState>,
    ignored_senders: HashSet<i64>,
}

impl MessageService {
    pub fn new(
        coordinator: Arc<ClaimCoordinator>,
        command_service: Arc<CommandService>,
        replies: Arc<dyn ChatSender>,
        session: SessionState,
        ignored_senders: impl IntoIterator<Item = i64>,
    ) -> Self {
        debug!("MessageService::new() called");
        Self {
            coordinator,
            command_service,
            replies,
            session: Mutex::new(session),
            ignored_senders: ignored_senders.into_iter().collect(),
        }
    }

    pub fn session(&self) -> SessionState {
        self.session.lock().clone()
    }

    /// Handles one message and returns what happened to each code found in
    /// it, in submission order. Errors only come from sending a command
    /// reply.
    ///
    /// Commands are answered in any chat; codes are only taken from
    /// monitored chats.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Result<Vec<(Code, Disposition)>, Error> {
        let text = msg.text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        if self.ignored_senders.contains(&msg.sender_id) {
            trace!("ignoring message from sender {}", msg.sender_id);
            return Ok(Vec::new());
        }
        if text.starts_with('/') {
            let ctx = CommandContext {
                chat_id: msg.chat_id,
                sender_id: msg.sender_id,
                session: &self.session,
            };
            if let Some(reply) = self.command_service.handle_command(&ctx, text).await {
                self.replies.send_text(msg.chat_id, &reply).await?;
            }
            return Ok(Vec::new());
        }

        let (accepted, monitoring, auto_claim) = {
            let session = self.session.lock();
            (session.accepts_chat(msg.chat_id), session.monitoring, session.auto_claim)
        };
        if !accepted {
            trace!("chat {} is not monitored", msg.chat_id);
            return Ok(Vec::new());
        }
        if !monitoring || !auto_claim {
            return Ok(Vec::new());
        }

        let codes = code_extractor::extract(text);
        let mut results = Vec::with_capacity(codes.len());
        for code in codes {
            if self.coordinator.store().contains(code.as_str()) {
                debug!("{} already claimed; skipping", code);
                continue;
            }
            info!("Found code {} in chat {}", code, msg.chat_id);
            let disposition = self.coordinator.submit(code.as_str()).await;
            results.push((code, disposition));
        }
        Ok(results)
    }

    /// Consumes bus events until the bus shuts down or the channel closes.
    pub async fn run(&self, bus: &EventBus, mut rx: mpsc::Receiver<BotEvent>) {
        let mut shutdown_rx = bus.shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("MessageService: shutdown signal received");
                    break;
                }
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else {
                        info!("MessageService: event channel closed");
                        break;
                    };
                    self.handle_event(event).await;
                }
            }
        }
    }

    async fn handle_event(&self, event: BotEvent) {
        match event {
            BotEvent::ChatMessage { chat_id, sender_id, text, .. } => {
                let msg = IncomingMessage { chat_id, sender_id, text };
                if let Err(e) = self.handle_message(&msg).await {
                    error!("Error handling message in chat {}: {}", chat_id, e);
                }
            }
            BotEvent::ClaimSucceeded(record) => {
                info!("🎉 {} => {} {}", record.code, record.amount, record.currency);
            }
            BotEvent::ClaimPaused(reason) => {
                info!("Claiming is paused: {}", reason);
            }
            BotEvent::SystemMessage(msg) => debug!("system: {}", msg),
        }
    }
}
