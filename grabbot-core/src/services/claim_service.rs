// File: grabbot-core/src/services/claim_service.rs

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use grabbot_common::models::{
    ClaimConfig, ClaimOutcome, ClaimRecord, ClaimState, Code, PauseReason,
};
use grabbot_common::traits::{AdminNotifier, RedemptionApi};
use crate::cache::{Admission, RateWindow};
use crate::eventbus::{BotEvent, EventBus};
use crate::repositories::ClaimRepository;
use crate::utils::time::Clock;

/// Knobs the coordinator reads once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimSettings {
    /// 0 = unlimited.
    pub max_hour_requests: usize,
    pub request_delay: Duration,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            max_hour_requests: 100,
            request_delay: Duration::from_secs(3),
        }
    }
}

impl From<&ClaimConfig> for ClaimSettings {
    fn from(cfg: &ClaimConfig) -> Self {
        Self {
            max_hour_requests: cfg.max_hour_requests as usize,
            request_delay: Duration::from_secs(cfg.request_delay_secs),
        }
    }
}

/// What happened to one submitted code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Already in the permanent store.
    AlreadyClaimed,
    /// Seen earlier this hour.
    DuplicateThisHour,
    /// The hourly ceiling is used up.
    HourlyCeiling,
    Paused(PauseReason),
    Invalid,
    /// The endpoint was called.
    Attempted(ClaimOutcome),
}

impl Disposition {
    pub fn attempted(&self) -> bool {
        matches!(self, Disposition::Attempted(_))
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::AlreadyClaimed => f.write_str("already claimed"),
            Disposition::DuplicateThisHour => f.write_str("already tried this hour"),
            Disposition::HourlyCeiling => f.write_str("hourly request ceiling reached"),
            Disposition::Paused(reason) => write!(f, "skipped, claiming is paused ({reason})"),
            Disposition::Invalid => f.write_str("not a valid code"),
            Disposition::Attempted(outcome) => write!(f, "{outcome}"),
        }
    }
}

/// Coordinates every claim attempt.
///
/// Codes go through one at a time: the permanent store, then the hourly
/// window, then the pause state, then the fixed delay and the endpoint.
/// Outcomes that need a human pause the coordinator until `resume()`.
pub struct ClaimCoordinator {
    api: Arc<dyn RedemptionApi>,
    notifier: Arc<dyn AdminNotifier>,
    store: Arc<dyn ClaimRepository>,
    clock: Arc<dyn Clock>,
    event_bus: Option<Arc<EventBus>>,
    request_delay: Duration,

    /// Held for the whole per-code sequence.
    gate: AsyncMutex<()>,
    state: Mutex<ClaimState>,
    window: Mutex<RateWindow>,
}

impl ClaimCoordinator {
    pub fn new(
        api: Arc<dyn RedemptionApi>,
        notifier: Arc<dyn AdminNotifier>,
        store: Arc<dyn ClaimRepository>,
        clock: Arc<dyn Clock>,
        settings: ClaimSettings,
    ) -> Self {
        debug!(
            "ClaimCoordinator::new() ceiling={} delay={:?}",
            settings.max_hour_requests, settings.request_delay
        );
        Self {
            api,
            notifier,
            store,
            clock,
            event_bus: None,
            request_delay: settings.request_delay,
            gate: AsyncMutex::new(()),
            state: Mutex::new(ClaimState::Active),
            window: Mutex::new(RateWindow::new(settings.max_hour_requests)),
        }
    }

    /// Claim successes and pauses are also published on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn state(&self) -> ClaimState {
        self.state.lock().clone()
    }

    pub fn store(&self) -> &Arc<dyn ClaimRepository> {
        &self.store
    }

    /// `(used, ceiling)` for the current hour; ceiling 0 = unlimited.
    pub fn window_usage(&self) -> (usize, usize) {
        let window = self.window.lock();
        (window.len(), window.ceiling())
    }

    /// Back to `Active`. Returns the reason that was lifted, if any.
    pub fn resume(&self) -> Option<PauseReason> {
        let previous = std::mem::replace(&mut *self.state.lock(), ClaimState::Active);
        match previous {
            ClaimState::Paused(reason) => {
                info!("Claiming resumed (was paused: {})", reason);
                Some(reason)
            }
            ClaimState::Active => None,
        }
    }

    pub async fn pause(&self, reason: PauseReason) {
        self.enter_pause(reason).await;
    }

    /// Runs one code through the pipeline. Never panics outward: a panic
    /// inside pauses the coordinator.
    pub async fn submit(&self, raw: &str) -> Disposition {
        let _gate = self.gate.lock().await;

        match AssertUnwindSafe(self.process(raw)).catch_unwind().await {
            Ok(disposition) => disposition,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Claim pipeline panicked on '{}': {}", raw, msg);
                let reason = PauseReason::Internal(msg);
                self.enter_pause(reason.clone()).await;
                Disposition::Paused(reason)
            }
        }
    }

    async fn process(&self, raw: &str) -> Disposition {
        let key = grabbot_common::models::code::normalize(raw);

        if self.store.contains(&key) {
            debug!("{} is already in the claim store", key);
            return Disposition::AlreadyClaimed;
        }

        let admission = self.admit(&key);
        match admission {
            Admission::RejectedDuplicate => {
                debug!("{} was already processed this hour", key);
                return Disposition::DuplicateThisHour;
            }
            Admission::RejectedRateLimited => {
                warn!("Hourly ceiling reached; dropping {}", key);
                self.enter_pause(PauseReason::HourlyCeiling).await;
                return Disposition::HourlyCeiling;
            }
            Admission::Accepted | Admission::AcceptedFinal => {}
        }

        if let ClaimState::Paused(reason) = self.state() {
            debug!("Paused ({}); not claiming {}", reason, key);
            return Disposition::Paused(reason);
        }

        let code = match Code::parse(&key) {
            Ok(code) => code,
            Err(e) => {
                warn!("Dropping candidate '{}': {}", raw, e);
                return Disposition::Invalid;
            }
        };

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        info!("Claiming {}", code);
        let outcome = self.api.claim(&code).await;
        self.dispatch(&code, &outcome).await;

        if admission == Admission::AcceptedFinal {
            info!("That was the last request allowed this hour");
            self.enter_pause(PauseReason::HourlyCeiling).await;
        }

        Disposition::Attempted(outcome)
    }

    /// Rolls the window over when the hour changed, then admits.
    fn admit(&self, key: &str) -> Admission {
        let now = self.clock.now();
        let mut window = self.window.lock();
        if window.roll_over(now) {
            debug!("New hour window starting {}", now.format("%H:00"));
            let mut state = self.state.lock();
            if *state == ClaimState::Paused(PauseReason::HourlyCeiling) {
                info!("New hour; lifting the hourly ceiling pause");
                *state = ClaimState::Active;
            }
        }
        window.admit(key)
    }

    async fn dispatch(&self, code: &Code, outcome: &ClaimOutcome) {
        match outcome {
            ClaimOutcome::Claimed { amount, currency } => {
                let record = match self.store.record_success(code, amount, currency) {
                    Ok(record) => record,
                    Err(e) => {
                        error!("Claimed {} but could not save it: {}", code, e);
                        ClaimRecord {
                            code: code.clone(),
                            amount: amount.clone(),
                            currency: currency.clone(),
                            claimed_at: self.clock.now(),
                        }
                    }
                };
                info!("✅ {} claimed: {} {}", code, amount, currency);
                self.publish(BotEvent::ClaimSucceeded(record)).await;
            }
            ClaimOutcome::AlreadyProcessed => {
                info!("{} already claimed or invalid upstream", code);
                if let Err(e) = self.store.mark_processed(code) {
                    error!("Could not save {} as processed: {}", code, e);
                }
            }
            ClaimOutcome::TransientNetworkError => {
                warn!("Network error claiming {}; state unchanged", code);
            }
            ClaimOutcome::CaptchaRequired
            | ClaimOutcome::RateLimited { .. }
            | ClaimOutcome::SessionExpired => {
                if let Some(reason) = PauseReason::from_outcome(outcome) {
                    self.enter_pause(reason).await;
                }
                let message = admin_message(code, outcome);
                if let Err(e) = self.notifier.notify_admin(&message).await {
                    error!("Failed to notify admin: {}", e);
                }
            }
            ClaimOutcome::MalformedResponse | ClaimOutcome::ApiError { .. } => {
                error!("Unexpected reply claiming {}: {}", code, outcome);
                if let Some(reason) = PauseReason::from_outcome(outcome) {
                    self.enter_pause(reason).await;
                }
            }
        }
    }

    /// A ceiling pause never replaces a pause that needs a human.
    async fn enter_pause(&self, reason: PauseReason) {
        let changed = {
            let mut state = self.state.lock();
            let keep = match &*state {
                ClaimState::Paused(current) => {
                    *current == reason || reason == PauseReason::HourlyCeiling
                }
                ClaimState::Active => false,
            };
            if !keep {
                *state = ClaimState::Paused(reason.clone());
            }
            !keep
        };
        if changed {
            warn!("Claiming paused: {}", reason);
            self.publish(BotEvent::ClaimPaused(reason)).await;
        }
    }

    /// Runs under the gate, usually on the task that drains the bus.
    async fn publish(&self, event: BotEvent) {
        if let Some(bus) = &self.event_bus {
            bus.try_publish(event).await;
        }
    }
}

fn admin_message(code: &Code, outcome: &ClaimOutcome) -> String {
    match outcome {
        ClaimOutcome::CaptchaRequired => format!(
            "⚠️ Captcha required while claiming {code}. Solve it in the app, then send /resume."
        ),
        ClaimOutcome::RateLimited { wait_hint: Some(hint) } => format!(
            "⏳ Too many requests while claiming {code}. The endpoint asks to wait {hint}. Send /resume afterwards."
        ),
        ClaimOutcome::RateLimited { wait_hint: None } => format!(
            "⏳ Too many requests while claiming {code}. Send /resume once the limit has passed."
        ),
        ClaimOutcome::SessionExpired => format!(
            "🔒 Session expired while claiming {code}. Refresh the headers and send /resume."
        ),
        other => format!("Claiming {code} needs attention: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use crate::repositories::JsonClaimStore;
    use crate::utils::time::ManualClock;
    use crate::Error;
    use tempfile::TempDir;

    mock! {
        pub Api {}
        #[async_trait]
        impl RedemptionApi for Api {
            async fn claim(&self, code: &Code) -> ClaimOutcome;
        }
    }

    mock! {
        pub Notifier {}
        #[async_trait]
        impl AdminNotifier for Notifier {
            async fn notify_admin(&self, message: &str) -> Result<(), Error>;
        }
    }

    struct ExplodingApi;

    #[async_trait]
    impl RedemptionApi for ExplodingApi {
        async fn claim(&self, _code: &Code) -> ClaimOutcome {
            panic!("boom")
        }
    }

    const NOON: i64 = 1_704_110_400;

    fn settings(ceiling: usize) -> ClaimSettings {
        ClaimSettings { max_hour_requests: ceiling, request_delay: Duration::ZERO }
    }

    fn coordinator(
        api: MockApi,
        notifier: MockNotifier,
        ceiling: usize,
    ) -> (ClaimCoordinator, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonClaimStore::open(dir.path().join("codes.json")));
        let coord = ClaimCoordinator::new(
            Arc::new(api),
            Arc::new(notifier),
            store,
            Arc::new(ManualClock::at_epoch(NOON)),
            settings(ceiling),
        );
        (coord, dir)
    }

    #[tokio::test]
    async fn api_error_pauses_without_notifying() {
        let mut api = MockApi::new();
        api.expect_claim().times(1).returning(|_| ClaimOutcome::ApiError {
            code: "999".into(),
            message: "odd".into(),
        });
        let mut notifier = MockNotifier::new();
        notifier.expect_notify_admin().times(0);
        let (coord, _dir) = coordinator(api, notifier, 0);

        let d = coord.submit("AB3D9F8K").await;
        assert!(d.attempted());
        assert_eq!(coord.state(), ClaimState::Paused(PauseReason::ApiError("999".into())));
    }

    #[tokio::test]
    async fn paused_coordinator_never_calls_the_endpoint() {
        let mut api = MockApi::new();
        api.expect_claim().times(0);
        let (coord, _dir) = coordinator(api, MockNotifier::new(), 0);

        coord.pause(PauseReason::Manual).await;
        assert_eq!(
            coord.submit("AB3D9F8K").await,
            Disposition::Paused(PauseReason::Manual)
        );
    }

    #[tokio::test]
    async fn invalid_candidates_are_dropped_without_state_change() {
        let mut api = MockApi::new();
        api.expect_claim().times(0);
        let (coord, _dir) = coordinator(api, MockNotifier::new(), 0);

        assert_eq!(coord.submit("12345678").await, Disposition::Invalid);
        assert_eq!(coord.submit("hello").await, Disposition::Invalid);
        assert_eq!(coord.state(), ClaimState::Active);
    }

    #[tokio::test]
    async fn already_processed_is_remembered_permanently() {
        let mut api = MockApi::new();
        api.expect_claim().times(1).returning(|_| ClaimOutcome::AlreadyProcessed);
        let (coord, _dir) = coordinator(api, MockNotifier::new(), 0);

        coord.submit("AB3D9F8K").await;
        assert!(coord.store().contains("AB3D9F8K"));
        assert_eq!(coord.submit("ab3d-9f8k").await, Disposition::AlreadyClaimed);
        assert_eq!(coord.state(), ClaimState::Active);
    }

    #[tokio::test]
    async fn ceiling_pause_does_not_hide_a_captcha_pause() {
        let mut api = MockApi::new();
        api.expect_claim().times(1).returning(|_| ClaimOutcome::CaptchaRequired);
        let mut notifier = MockNotifier::new();
        notifier.expect_notify_admin().times(1).returning(|_| Ok(()));
        let (coord, _dir) = coordinator(api, notifier, 1);

        coord.submit("AB3D9F8K").await;
        assert_eq!(coord.state(), ClaimState::Paused(PauseReason::CaptchaRequired));
    }

    #[tokio::test]
    async fn resume_reports_the_lifted_reason() {
        let (coord, _dir) = coordinator(MockApi::new(), MockNotifier::new(), 0);
        assert_eq!(coord.resume(), None);
        coord.pause(PauseReason::Manual).await;
        assert_eq!(coord.resume(), Some(PauseReason::Manual));
        assert_eq!(coord.state(), ClaimState::Active);
    }

    #[tokio::test]
    async fn pauses_and_successes_are_published() {
        let mut api = MockApi::new();
        api.expect_claim().times(1).returning(|_| ClaimOutcome::Claimed {
            amount: "1.5".into(),
            currency: "BNB".into(),
        });
        let (coord, _dir) = coordinator(api, MockNotifier::new(), 1);
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe(Some(10)).await;
        let coord = coord.with_event_bus(bus);

        coord.submit("AB3D9F8K").await;

        match rx.try_recv().unwrap() {
            BotEvent::ClaimSucceeded(rec) => {
                assert_eq!(rec.code.as_str(), "AB3D9F8K");
                assert_eq!(rec.currency, "BNB");
            }
            other => panic!("unexpected {other:?}"),
        }
        match rx.try_recv().unwrap() {
            BotEvent::ClaimPaused(PauseReason::HourlyCeiling) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_subscriber_queue_does_not_block_claims() {
        let mut api = MockApi::new();
        api.expect_claim().times(3).returning(|_| ClaimOutcome::Claimed {
            amount: "1".into(),
            currency: "USDT".into(),
        });
        let (coord, _dir) = coordinator(api, MockNotifier::new(), 0);
        let bus = Arc::new(EventBus::new());
        let _rx = bus.subscribe(Some(1)).await;
        let coord = coord.with_event_bus(bus);

        let run = async {
            for code in ["AB3D9F8K", "XY12ZT34", "Q1W2E3R4"] {
                assert!(coord.submit(code).await.attempted());
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(2), run)
            .await
            .expect("submit must not wait on a full subscriber");
        assert_eq!(coord.store().len(), 3);
    }

    #[tokio::test]
    async fn panic_inside_the_pipeline_pauses() {
        let dir = tempfile::tempdir().unwrap();
        let coord = ClaimCoordinator::new(
            Arc::new(ExplodingApi),
            Arc::new(MockNotifier::new()),
            Arc::new(JsonClaimStore::open(dir.path().join("codes.json"))),
            Arc::new(ManualClock::at_epoch(NOON)),
            settings(0),
        );

        let d = coord.submit("AB3D9F8K").await;
        assert_eq!(d, Disposition::Paused(PauseReason::Internal("boom".into())));
        assert!(coord.state().is_paused());
    }
}
