// File: src/platforms/mod.rs

use async_trait::async_trait;
use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error(String),
}

/// Anything that can put a text message into a chat.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait PlatformIntegration {
    async fn connect(&mut self) -> Result<(), Error>;
    async fn disconnect(&mut self) -> Result<(), Error>;
    async fn send_message(&self, chat_id: i64, message: &str) -> Result<(), Error>;
    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error>;
}

// Re-export submodules
pub mod binance;
pub mod telegram;
