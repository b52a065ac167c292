// File: src/services/mod.rs

pub mod code_extractor;
pub mod claim_service;
pub mod command_service;
pub mod message_service;

pub use claim_service::{ClaimCoordinator, ClaimSettings, Disposition};
pub use command_service::CommandService;
pub use message_service::{IncomingMessage, MessageService, SessionState};
