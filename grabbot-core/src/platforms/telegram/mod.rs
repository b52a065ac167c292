pub mod client;
pub mod notifier;
pub mod runtime;

pub use client::TelegramClient;
pub use notifier::TelegramNotifier;
pub use runtime::TelegramPlatform;
