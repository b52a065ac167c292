//! src/eventbus/mod.rs
//!
//! Provides an in-process event bus that supports guaranteed delivery
//! to multiple subscribers via bounded MPSC queues.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use chrono::{DateTime, Utc};
use grabbot_common::models::{ClaimRecord, PauseReason};
use tracing::warn;

/// Global event type that various parts of the bot can publish or subscribe to.
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// A text message seen by the messaging platform.
    ChatMessage {
        platform: String,
        chat_id: i64,
        sender_id: i64,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A code was redeemed and written to the claim store.
    ClaimSucceeded(ClaimRecord),

    /// The claim coordinator stopped accepting codes.
    ClaimPaused(PauseReason),

    /// Example system-wide event for debugging or administration.
    SystemMessage(String),
}

impl BotEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::ChatMessage { .. } => "chat_message",
            BotEvent::ClaimSucceeded(_) => "claim_succeeded",
            BotEvent::ClaimPaused(_) => "claim_paused",
            BotEvent::SystemMessage(_) => "system_message",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<BotEvent>` for guaranteed delivery.
///
/// - If the subscriber’s channel buffer fills, `publish` will await
///   until there's space (backpressure). `try_publish` drops the event
///   for that subscriber instead.
/// - If the subscriber has dropped the `Receiver`, the channel is closed
///   and the sender is pruned on the next publish.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BotEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber’s buffer.
const DEFAULT_BUFFER_SIZE: usize = 1000;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new, empty event bus.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<BotEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers.
    pub async fn publish(&self, event: BotEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        let mut closed = false;
        for s in senders {
            if s.send(event.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            let mut subs = self.subscribers.lock().await;
            subs.retain(|s| !s.is_closed());
        }
    }

    /// Never waits on a full channel. Code that runs inside a subscriber's
    /// own task must use this, or it can end up waiting on itself.
    /// Returns how many subscribers got the event.
    pub async fn try_publish(&self, event: BotEvent) -> usize {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        let mut delivered = 0;
        let mut closed = false;
        for s in senders {
            match s.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Subscriber queue full; dropping {}", event.event_type());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed = true,
            }
        }
        if closed {
            let mut subs = self.subscribers.lock().await;
            subs.retain(|s| !s.is_closed());
        }
        delivered
    }

    /// Convenience method: publish a `ChatMessage` event.
    pub async fn publish_chat(&self, platform: &str, chat_id: i64, sender_id: i64, text: &str) {
        let event = BotEvent::ChatMessage {
            platform: platform.to_string(),
            chat_id,
            sender_id,
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        self.publish(event).await;
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout, Duration};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();

        let mut rx1 = bus.subscribe(Some(5)).await;
        let mut rx2 = bus.subscribe(Some(5)).await;

        bus.publish_chat("telegram", 1, 2, "hello").await;

        let evt1 = rx1.recv().await.expect("rx1 should get event");
        let evt2 = rx2.recv().await.expect("rx2 should get event");

        match evt1 {
            BotEvent::ChatMessage { chat_id, text, .. } => {
                assert_eq!(chat_id, 1);
                assert_eq!(text, "hello");
            }
            _ => panic!("rx1 got the wrong event type"),
        }
        assert_eq!(evt2.event_type(), "chat_message");
    }

    #[tokio::test]
    async fn test_backpressure_blocking() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(1)).await; // queue size = 1

        bus.publish(BotEvent::SystemMessage("msg1".into())).await;

        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let first = rx.recv().await.expect("expected first message");
            let second = rx.recv().await.expect("expected second message");
            (first, second)
        });

        // Blocks until the reader drains the first message.
        timeout(Duration::from_secs(1), bus.publish(BotEvent::SystemMessage("msg2".into())))
            .await
            .expect("publish should complete once the reader drains");

        let (first, second) = handle.await.unwrap();
        match (first, second) {
            (BotEvent::SystemMessage(a), BotEvent::SystemMessage(b)) => {
                assert_eq!(a, "msg1");
                assert_eq!(b, "msg2");
            }
            _ => panic!("unexpected events"),
        }
    }

    #[tokio::test]
    async fn test_try_publish_skips_full_queues() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(1)).await;

        assert_eq!(bus.try_publish(BotEvent::SystemMessage("a".into())).await, 1);
        let second = timeout(
            Duration::from_millis(200),
            bus.try_publish(BotEvent::SystemMessage("b".into())),
        )
        .await
        .expect("try_publish must not wait for the reader");
        assert_eq!(second, 0);

        match rx.recv().await.unwrap() {
            BotEvent::SystemMessage(m) => assert_eq!(m, "a"),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe(Some(5)).await;
        let _keep = bus.subscribe(Some(5)).await;
        drop(rx);

        bus.publish(BotEvent::SystemMessage("x".into())).await;
        assert_eq!(bus.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_flag() {
        let bus = EventBus::new();
        let mut watcher = bus.shutdown_rx.clone();
        assert!(!bus.is_shutdown());
        bus.shutdown();
        watcher.changed().await.unwrap();
        assert!(bus.is_shutdown());
    }
}
