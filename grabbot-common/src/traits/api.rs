use async_trait::async_trait;
use crate::error::Error;
use crate::models::{ClaimOutcome, Code};

/// Submits one code to the rewards endpoint.
///
/// Implementations never retry and never fail: every transport or protocol
/// problem is folded into a [`ClaimOutcome`] variant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RedemptionApi: Send + Sync {
    async fn claim(&self, code: &Code) -> ClaimOutcome;
}

/// Best-effort channel to whoever operates the bot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn notify_admin(&self, message: &str) -> Result<(), Error>;
}
