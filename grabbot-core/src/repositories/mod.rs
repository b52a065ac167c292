// src/repositories/mod.rs

use grabbot_common::models::{ClaimRecord, ClaimSummary, Code};
use crate::Error;

/// Durable record of which codes are spent.
///
/// Mutations update memory first and then persist; a persist failure is
/// returned as [`Error::Persistence`] but the in-memory state stays
/// authoritative for the rest of the session.
pub trait ClaimRepository: Send + Sync {
    fn contains(&self, code: &str) -> bool;

    /// Marks `code` as spent and stores (or refreshes) its claim record.
    fn record_success(&self, code: &Code, amount: &str, currency: &str) -> Result<ClaimRecord, Error>;

    /// Marks `code` as spent without a record: upstream already knows it.
    fn mark_processed(&self, code: &Code) -> Result<(), Error>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `recent` caps how many records the summary lists.
    fn summary(&self, recent: usize) -> ClaimSummary;
}

pub mod json;

pub use json::claim_store::JsonClaimStore;
