// File: grabbot-core/src/test_utils/helpers.rs
//
// In-memory stand-ins for the outbound collaborators, shared by the unit
// and integration tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;

use grabbot_common::models::{ClaimOutcome, Code};
use grabbot_common::traits::{AdminNotifier, RedemptionApi};
use crate::platforms::ChatSender;
use crate::repositories::ClaimRepository;
use crate::services::claim_service::{ClaimCoordinator, ClaimSettings};
use crate::utils::time::Clock;
use crate::Error;

/// Replies with scripted outcomes in order, then with `fallback`.
pub struct StubRedemptionApi {
    script: Mutex<VecDeque<ClaimOutcome>>,
    fallback: ClaimOutcome,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl StubRedemptionApi {
    pub fn always(outcome: ClaimOutcome) -> Self {
        Self::scripted(Vec::new(), outcome)
    }

    pub fn scripted(script: Vec<ClaimOutcome>, fallback: ClaimOutcome) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Codes in the order they were submitted.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl RedemptionApi for StubRedemptionApi {
    async fn claim(&self, code: &Code) -> ClaimOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(code.as_str().to_string());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Keeps every admin notification.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl AdminNotifier for RecordingNotifier {
    async fn notify_admin(&self, message: &str) -> Result<(), Error> {
        self.messages.lock().push(message.to_string());
        Ok(())
    }
}

/// Keeps every chat message as `(chat_id, text)`.
#[derive(Default)]
pub struct RecordingChatSender {
    sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingChatSender {
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChatSender for RecordingChatSender {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), Error> {
        self.sent.lock().push((chat_id, text.to_string()));
        Ok(())
    }
}

/// Coordinator without the request delay.
pub fn instant_coordinator(
    api: Arc<dyn RedemptionApi>,
    notifier: Arc<dyn AdminNotifier>,
    store: Arc<dyn ClaimRepository>,
    clock: Arc<dyn Clock>,
    max_hour_requests: usize,
) -> ClaimCoordinator {
    ClaimCoordinator::new(
        api,
        notifier,
        store,
        clock,
        ClaimSettings {
            max_hour_requests,
            request_delay: Duration::ZERO,
        },
    )
}

pub fn claimed(amount: &str, currency: &str) -> ClaimOutcome {
    ClaimOutcome::Claimed {
        amount: amount.to_string(),
        currency: currency.to_string(),
    }
}
