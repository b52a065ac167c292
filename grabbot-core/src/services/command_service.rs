// File: grabbot-core/src/services/command_service.rs
//! Admin commands sent to the bot as `/name args`.
//!
//! Every handler returns the reply text, or `None` when the message is not
//! a command we know. Commands that change state or expose the claim
//! history are refused to anyone but the admin.

use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{debug, info};

use grabbot_common::models::{ClaimOutcome, ClaimState, PauseReason};
use crate::services::claim_service::{ClaimCoordinator, Disposition};
use crate::services::message_service::SessionState;

/// How many records `/summary` lists.
const SUMMARY_RECENT: usize = 5;

pub const HELP_TEXT: &str = "🤖 Available commands:\n\
\n\
/start - enable monitoring\n\
/autoclaim - toggle automatic claiming\n\
/status - coordinator state and hourly usage\n\
/pause - stop claiming\n\
/resume - continue after a pause\n\
/summary - claimed codes and totals\n\
/claim CODE - claim one code now\n\
/help - this message";

/// Who sent the command and the session it acts on.
pub struct CommandContext<'a> {
    pub chat_id: i64,
    pub sender_id: i64,
    pub session: &'a Mutex<SessionState>,
}

pub struct CommandService {
    coordinator: Arc<ClaimCoordinator>,
    admin_chat_id: i64,
}

impl CommandService {
    pub fn new(coordinator: Arc<ClaimCoordinator>, admin_chat_id: i64) -> Self {
        Self { coordinator, admin_chat_id }
    }

    fn is_admin(&self, ctx: &CommandContext<'_>) -> bool {
        self.admin_chat_id != 0 && ctx.sender_id == self.admin_chat_id
    }

    /// `text` must start with `/`. A `@botname` suffix on the command is ignored.
    pub async fn handle_command(&self, ctx: &CommandContext<'_>, text: &str) -> Option<String> {
        let trimmed = text.trim();
        let without_slash = trimmed.strip_prefix('/')?;
        let (head, args) = match without_slash.split_once(char::is_whitespace) {
            Some((h, a)) => (h, a.trim()),
            None => (without_slash, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        debug!("command '{}' from {} in {}", name, ctx.sender_id, ctx.chat_id);

        let reply = match name.as_str() {
            "start" => self.handle_start(ctx),
            "help" => HELP_TEXT.to_string(),
            "autoclaim" => self.handle_autoclaim(ctx),
            "status" => self.handle_status(ctx),
            "pause" => self.handle_pause(ctx).await,
            "resume" => self.handle_resume(ctx),
            "summary" | "resumen" => self.handle_summary(ctx),
            "claim" => self.handle_claim(ctx, args).await,
            other => match other.strip_prefix("claim_") {
                Some(code) => self.handle_claim(ctx, code).await,
                None => return None,
            },
        };
        Some(reply)
    }

    fn handle_start(&self, ctx: &CommandContext<'_>) -> String {
        if self.is_admin(ctx) {
            let mut session = ctx.session.lock();
            session.monitoring = true;
            if !session.allowed_chats.is_empty() {
                session.allowed_chats.insert(ctx.chat_id);
            }
            info!("Monitoring enabled by admin in chat {}", ctx.chat_id);
        }
        format!("👋 Code grabber ready.\n\n{HELP_TEXT}")
    }

    fn handle_autoclaim(&self, ctx: &CommandContext<'_>) -> String {
        if !self.is_admin(ctx) {
            return denied("autoclaim");
        }
        let mut session = ctx.session.lock();
        session.auto_claim = !session.auto_claim;
        if session.auto_claim {
            session.monitoring = true;
            info!("Auto-claim enabled");
            format!(
                "🚀 Auto-claim ON\nMonitoring: ON\nChats: {}",
                describe_chats(&session)
            )
        } else {
            info!("Auto-claim disabled");
            format!(
                "⛔ Auto-claim OFF\nMonitoring: {}",
                on_off(session.monitoring)
            )
        }
    }

    fn handle_status(&self, ctx: &CommandContext<'_>) -> String {
        let (used, ceiling) = self.coordinator.window_usage();
        let ceiling = if ceiling == 0 { "∞".to_string() } else { ceiling.to_string() };
        let state = match self.coordinator.state() {
            ClaimState::Active => "active".to_string(),
            ClaimState::Paused(reason) => format!("paused ({reason})"),
        };
        let session = ctx.session.lock();
        format!(
            "📊 Claiming: {}\nRequests this hour: {}/{}\nKnown codes: {}\nMonitoring: {}\nAuto-claim: {}",
            state,
            used,
            ceiling,
            self.coordinator.store().len(),
            on_off(session.monitoring),
            on_off(session.auto_claim),
        )
    }

    async fn handle_pause(&self, ctx: &CommandContext<'_>) -> String {
        if !self.is_admin(ctx) {
            return denied("pause");
        }
        self.coordinator.pause(PauseReason::Manual).await;
        "⏸ Claiming paused. Send /resume to continue.".to_string()
    }

    fn handle_resume(&self, ctx: &CommandContext<'_>) -> String {
        if !self.is_admin(ctx) {
            return denied("resume");
        }
        match self.coordinator.resume() {
            Some(reason) => format!("▶️ Claiming resumed (was paused: {reason})."),
            None => "▶️ Claiming was not paused.".to_string(),
        }
    }

    fn handle_summary(&self, ctx: &CommandContext<'_>) -> String {
        if !self.is_admin(ctx) {
            return denied("summary");
        }
        let summary = self.coordinator.store().summary(SUMMARY_RECENT);
        if summary.successful_claims == 0 {
            return format!("No codes claimed yet (known codes: {}).", summary.known_codes);
        }
        format!("📈 {}", summary).trim_end().to_string()
    }

    async fn handle_claim(&self, ctx: &CommandContext<'_>, arg: &str) -> String {
        if !self.is_admin(ctx) {
            return denied("claim");
        }
        if arg.is_empty() {
            return "Usage: /claim CODE".to_string();
        }
        info!("Manual claim requested for '{}'", arg);
        let disposition = self.coordinator.submit(arg).await;
        let icon = match &disposition {
            Disposition::Attempted(ClaimOutcome::Claimed { .. }) => "✅",
            Disposition::Attempted(ClaimOutcome::AlreadyProcessed) => "ℹ️",
            Disposition::Attempted(_) => "⚠️",
            _ => "ℹ️",
        };
        format!("{icon} {}: {disposition}", arg.to_uppercase())
    }
}

fn denied(command: &str) -> String {
    format!("❌ Only the admin can use /{command}.")
}

fn on_off(flag: bool) -> &'static str {
    if flag { "ON" } else { "OFF" }
}

fn describe_chats(session: &SessionState) -> String {
    if session.allowed_chats.is_empty() {
        "all".to_string()
    } else {
        session.allowed_chats.len().to_string()
    }
}
