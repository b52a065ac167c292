// File: grabbot-common/src/models/mod.rs
pub mod code;
pub mod claim;
pub mod config;

pub use code::Code;
pub use claim::{ClaimOutcome, ClaimRecord, ClaimState, ClaimSummary, PauseReason};
pub use config::{ClaimConfig, Config, TelegramConfig};
