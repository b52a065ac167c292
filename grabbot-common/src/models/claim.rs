use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::models::code::Code;

/// One successful redemption. Written once, never edited afterwards
/// except when the same code is recorded again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub code: Code,
    pub amount: String,
    pub currency: String,
    #[serde(rename = "date")]
    pub claimed_at: DateTime<Utc>,
}

/// Everything the redemption endpoint can tell us about one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed { amount: String, currency: String },
    /// Already claimed by us or someone else, or the code is not valid upstream.
    AlreadyProcessed,
    CaptchaRequired,
    /// `wait_hint` is the "HH:MM" the endpoint sometimes puts in its message.
    RateLimited { wait_hint: Option<String> },
    SessionExpired,
    TransientNetworkError,
    ApiError { code: String, message: String },
    MalformedResponse,
}

impl ClaimOutcome {
    /// Outcomes that need a human before claiming can continue.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            ClaimOutcome::CaptchaRequired
                | ClaimOutcome::RateLimited { .. }
                | ClaimOutcome::SessionExpired
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClaimOutcome::Claimed { .. } => "claimed",
            ClaimOutcome::AlreadyProcessed => "already_processed",
            ClaimOutcome::CaptchaRequired => "captcha_required",
            ClaimOutcome::RateLimited { .. } => "rate_limited",
            ClaimOutcome::SessionExpired => "session_expired",
            ClaimOutcome::TransientNetworkError => "transient_network_error",
            ClaimOutcome::ApiError { .. } => "api_error",
            ClaimOutcome::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for ClaimOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimOutcome::Claimed { amount, currency } => write!(f, "claimed {amount} {currency}"),
            ClaimOutcome::RateLimited { wait_hint: Some(h) } => write!(f, "rate limited (wait {h})"),
            ClaimOutcome::ApiError { code, message } => write!(f, "api error {code}: {message}"),
            other => f.write_str(other.kind()),
        }
    }
}

/// Why the coordinator stopped claiming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseReason {
    /// The configured per-hour ceiling was used up. Lifted on hour rollover.
    HourlyCeiling,
    CaptchaRequired,
    RateLimited,
    SessionExpired,
    MalformedResponse,
    ApiError(String),
    /// Something failed inside the pipeline itself.
    Internal(String),
    /// Paused by the admin.
    Manual,
}

impl PauseReason {
    pub fn from_outcome(outcome: &ClaimOutcome) -> Option<Self> {
        match outcome {
            ClaimOutcome::CaptchaRequired => Some(PauseReason::CaptchaRequired),
            ClaimOutcome::RateLimited { .. } => Some(PauseReason::RateLimited),
            ClaimOutcome::SessionExpired => Some(PauseReason::SessionExpired),
            ClaimOutcome::MalformedResponse => Some(PauseReason::MalformedResponse),
            ClaimOutcome::ApiError { code, .. } => Some(PauseReason::ApiError(code.clone())),
            ClaimOutcome::Claimed { .. }
            | ClaimOutcome::AlreadyProcessed
            | ClaimOutcome::TransientNetworkError => None,
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::HourlyCeiling => f.write_str("hourly request ceiling reached"),
            PauseReason::CaptchaRequired => f.write_str("captcha required"),
            PauseReason::RateLimited => f.write_str("rate limited by the endpoint"),
            PauseReason::SessionExpired => f.write_str("session expired"),
            PauseReason::MalformedResponse => f.write_str("malformed response"),
            PauseReason::ApiError(code) => write!(f, "api error {code}"),
            PauseReason::Internal(msg) => write!(f, "internal error: {msg}"),
            PauseReason::Manual => f.write_str("paused by admin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimState {
    Active,
    Paused(PauseReason),
}

impl ClaimState {
    pub fn is_paused(&self) -> bool {
        matches!(self, ClaimState::Paused(_))
    }
}

/// Totals over the claim history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClaimSummary {
    /// Codes in the permanent set, claimed or not.
    pub known_codes: usize,
    pub successful_claims: usize,
    /// currency => summed amount
    pub totals: BTreeMap<String, f64>,
    /// Newest first.
    pub recent: Vec<ClaimRecord>,
}

impl fmt::Display for ClaimSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Claimed: {} (known codes: {})", self.successful_claims, self.known_codes)?;
        for (currency, total) in &self.totals {
            writeln!(f, "  {currency}: {total}")?;
        }
        if !self.recent.is_empty() {
            writeln!(f, "Recent:")?;
            for rec in &self.recent {
                writeln!(
                    f,
                    "  {} {} {} ({})",
                    rec.code,
                    rec.amount,
                    rec.currency,
                    rec.claimed_at.format("%Y-%m-%d %H:%M")
                )?;
            }
        }
        Ok(())
    }
}
