use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::{ExecutionError, StreamRegexError, StreamRegexResult};

use super::publisher::{AutomationEvent, BusShared, SubscriptionId};

/// A subscription stream for automation events.
///
/// Dropping this stream unregisters it from the bus.
#[derive(Debug)]
pub struct NotificationStream {
    subscription_id: SubscriptionId,
    rx: Receiver<AutomationEvent>,
    bus: Weak<BusShared>,
    unregistered: AtomicBool,
}

impl NotificationStream {
    pub(crate) fn new(
        subscription_id: SubscriptionId,
        rx: Receiver<AutomationEvent>,
        bus: Weak<BusShared>,
    ) -> Self {
        Self {
            subscription_id,
            rx,
            bus,
            unregistered: AtomicBool::new(false),
        }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Explicit unregistration. Idempotent.
    ///
    /// Events already buffered can still be received afterwards.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.unregister(self.subscription_id);
        }
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> StreamRegexResult<AutomationEvent> {
        self.rx.recv().map_err(|_| {
            StreamRegexError::Execution(ExecutionError::Disconnected {
                path: "notification_stream".to_string(),
            })
        })
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> StreamRegexResult<AutomationEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => StreamRegexError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => {
                StreamRegexError::Execution(ExecutionError::Disconnected {
                    path: "notification_stream".to_string(),
                })
            }
        })
    }

    /// Receive a buffered event without waiting.
    #[must_use]
    pub fn try_recv(&self) -> Option<AutomationEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every buffered event.
    #[must_use]
    pub fn drain(&self) -> Vec<AutomationEvent> {
        self.rx.try_iter().collect()
    }
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
