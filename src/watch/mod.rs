//! Stream interception subsystem.
//!
//! The watcher follows the host's live streaming entry, intercepts writes to
//! its text and publishes the rules each new text matches.

/// Host generation flag and message buffer boundary.
pub mod buffer;
/// Write interception wrapper.
pub mod intercept;
/// Rule evaluation against a text snapshot.
pub mod matcher;
/// Notification publisher and in-process bus.
pub mod publisher;
/// Subscriber stream handle.
pub mod stream;
/// Polling state machine.
pub mod watcher;

pub use buffer::{
    ChatBuffer, ChatMessage, EntryRef, GenerationFlag, GenerationState, MessageBuffer,
    MessageEntry,
};
pub use intercept::{InterceptedEntry, WriteObserver};
pub use matcher::{evaluate, Match};
pub use publisher::{
    AutomationEvent, ChannelBus, NotificationBus, NotificationPublisher, SubscriptionId,
};
pub use stream::NotificationStream;
pub use watcher::{RuleObserver, StreamWatcher, Transition, WatchGuard, WatcherHandle};
