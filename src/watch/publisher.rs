//! Notification publishing.
//!
//! The publisher emits one [`AutomationEvent`] per triggering write. The bus
//! is fire-and-forget: subscribers get events through bounded channels and a
//! slow subscriber only loses its own events.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::BusConfig;

use super::matcher::Match;
use super::stream::NotificationStream;

/// Unique identifier for a bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A published notification: the ordered matches of one write.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub matches: Vec<Match>,
}

impl AutomationEvent {
    #[must_use]
    pub fn new(matches: Vec<Match>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            matches,
        }
    }
}

/// Publish-only channel to the automation subsystem.
pub trait NotificationBus: Send + Sync {
    /// Emit an event. Must not block or fail back to the caller.
    fn emit(&self, event: AutomationEvent);
}

/// Turns match lists into bus events.
pub struct NotificationPublisher {
    bus: Arc<dyn NotificationBus>,
    published: AtomicU64,
}

impl NotificationPublisher {
    #[must_use]
    pub fn new(bus: Arc<dyn NotificationBus>) -> Self {
        Self {
            bus,
            published: AtomicU64::new(0),
        }
    }

    /// Emits exactly one event carrying `matches`, or nothing if empty.
    ///
    /// Returns true when an event was emitted.
    pub fn publish(&self, matches: Vec<Match>) -> bool {
        if matches.is_empty() {
            return false;
        }

        debug!(matches = matches.len(), "publishing automation event");
        self.bus.emit(AutomationEvent::new(matches));
        self.published.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Number of events emitted.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for NotificationPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationPublisher")
            .field("published", &self.published())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) struct BusShared {
    subscribers: Mutex<HashMap<SubscriptionId, Sender<AutomationEvent>>>,
    dropped_events: AtomicU64,
}

impl BusShared {
    pub(crate) fn unregister(&self, subscription_id: SubscriptionId) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscription_id);
    }
}

/// In-process fan-out [`NotificationBus`].
///
/// Every subscriber receives every event. Delivery uses non-blocking
/// `try_send`; a full subscriber drops the event and bumps
/// [`ChannelBus::dropped_events`], a disconnected one is removed.
#[derive(Debug)]
pub struct ChannelBus {
    cfg: BusConfig,
    shared: Arc<BusShared>,
}

impl ChannelBus {
    #[must_use]
    pub fn new(cfg: BusConfig) -> Self {
        Self {
            cfg,
            shared: Arc::new(BusShared {
                subscribers: Mutex::new(HashMap::new()),
                dropped_events: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a subscriber and returns its event stream.
    #[must_use]
    pub fn subscribe(&self) -> NotificationStream {
        let subscription_id = SubscriptionId::new();
        let (tx, rx) = bounded::<AutomationEvent>(self.cfg.stream_capacity.max(1));

        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscription_id, tx);

        NotificationStream::new(subscription_id, rx, Arc::downgrade(&self.shared))
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Events lost to full subscriber buffers.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped_events.load(Ordering::Relaxed)
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl NotificationBus for ChannelBus {
    fn emit(&self, event: AutomationEvent) {
        let mut subs = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        subs.retain(|_, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.shared.dropped_events.fetch_add(1, Ordering::Relaxed);
                true
            }
            // Streams unregister before their receiver drops; this catches
            // a receiver from a bus implementation that does not.
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBus {
        events: Mutex<Vec<AutomationEvent>>,
    }

    impl NotificationBus for RecordingBus {
        fn emit(&self, event: AutomationEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn empty_matches_publish_nothing() {
        let bus = Arc::new(RecordingBus::default());
        let publisher = NotificationPublisher::new(Arc::clone(&bus) as Arc<dyn NotificationBus>);

        assert!(!publisher.publish(Vec::new()));
        assert!(bus.events.lock().unwrap().is_empty());
        assert_eq!(publisher.published(), 0);
    }

    #[test]
    fn one_event_carries_all_matches_in_order() {
        let bus = Arc::new(RecordingBus::default());
        let publisher = NotificationPublisher::new(Arc::clone(&bus) as Arc<dyn NotificationBus>);

        let matches = vec![
            Match::new("A".into()),
            Match::new("B".into()),
            Match::new("A".into()),
        ];
        assert!(publisher.publish(matches.clone()));

        let events = bus.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].matches, matches);
    }

    #[test]
    fn channel_bus_fans_out_to_every_subscriber() {
        let bus = ChannelBus::default();
        let s1 = bus.subscribe();
        let s2 = bus.subscribe();

        bus.emit(AutomationEvent::new(vec![Match::new("STOP".into())]));

        let timeout = Duration::from_secs(1);
        assert_eq!(s1.recv_timeout(timeout).unwrap().matches[0].automation_id.as_str(), "STOP");
        assert_eq!(s2.recv_timeout(timeout).unwrap().matches[0].automation_id.as_str(), "STOP");
    }

    #[test]
    fn full_subscriber_drops_without_blocking() {
        let bus = ChannelBus::new(BusConfig { stream_capacity: 1 });
        let stream = bus.subscribe();

        bus.emit(AutomationEvent::new(vec![Match::new("A".into())]));
        bus.emit(AutomationEvent::new(vec![Match::new("B".into())]));

        assert_eq!(bus.dropped_events(), 1);
        assert_eq!(stream.try_recv().unwrap().matches[0].automation_id.as_str(), "A");
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn explicit_unsubscribe_is_idempotent_and_keeps_buffered_events() {
        let bus = ChannelBus::default();
        let stream = bus.subscribe();
        let other = bus.subscribe();

        bus.emit(AutomationEvent::new(vec![Match::new("A".into())]));
        stream.unsubscribe();
        stream.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(AutomationEvent::new(vec![Match::new("B".into())]));
        let seen: Vec<_> = stream
            .drain()
            .into_iter()
            .map(|e| e.matches[0].automation_id.to_string())
            .collect();
        assert_eq!(seen, ["A"]);
        assert_eq!(other.drain().len(), 2);

        drop(stream);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn dropped_stream_is_unregistered() {
        let bus = ChannelBus::default();
        let stream = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(stream);
        assert_eq!(bus.subscriber_count(), 0);

        // Emitting with no subscribers is fine.
        bus.emit(AutomationEvent::new(vec![Match::new("A".into())]));
    }
}
