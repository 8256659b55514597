//! Stream watcher: follows the live streaming entry and intercepts its writes.
//!
//! The watcher polls the generation flag and the buffer length. While a
//! response is generating it keeps an [`InterceptedEntry`] installed over the
//! last buffer entry; the wrapper evaluates every written text against the
//! current rules and publishes non-empty results.
//!
//! ```text
//!            flag false -> true                 flag true -> false
//!   Idle  ---------------------->  Watching  ----------------------> Idle
//!                                   |    ^
//!                                   +----+  flag stays true, buffer grew:
//!                                           restore old entry, wrap new last
//! ```
//!
//! Install, uninstall and every intercepted evaluation run under one
//! [`WatchGuard`], so they never interleave.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::error::{StreamRegexError, StreamRegexResult};
use crate::service::RuleService;

use super::buffer::{same_entry, EntryRef, GenerationFlag, MessageBuffer};
use super::intercept::{InterceptedEntry, WriteObserver};
use super::matcher::evaluate;
use super::publisher::NotificationPublisher;

/// Serialises wrapper install/uninstall with intercepted evaluations.
#[derive(Debug, Clone, Default)]
pub struct WatchGuard(Arc<Mutex<()>>);

impl WatchGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the guard. A poisoned guard is recovered; it protects no data.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Evaluates intercepted writes against the rule service and publishes matches.
pub struct RuleObserver {
    rules: Arc<RuleService>,
    publisher: Arc<NotificationPublisher>,
    guard: WatchGuard,
}

impl RuleObserver {
    #[must_use]
    pub fn new(rules: Arc<RuleService>, publisher: Arc<NotificationPublisher>, guard: WatchGuard) -> Self {
        Self {
            rules,
            publisher,
            guard,
        }
    }
}

impl WriteObserver for RuleObserver {
    fn on_write(&self, text: &str) {
        let _serial = self.guard.lock();

        let rules = match self.rules.snapshot() {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "rule snapshot unavailable; write not evaluated");
                return;
            }
        };

        self.publisher.publish(evaluate(text, &rules));
    }
}

/// The transition taken by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Neither the flag nor the buffer length changed.
    Unchanged,
    /// Generation started. `index` is the wrapped slot, `None` if nothing
    /// could be wrapped (empty buffer or the slot changed underneath).
    Started { index: Option<usize> },
    /// The buffer grew while generating; the wrapper moved.
    Retargeted { from: Option<usize>, to: Option<usize> },
    /// Generation stopped. `restored` is the slot whose original entry was
    /// put back, `None` if the wrapper was no longer in the buffer.
    Stopped { restored: Option<usize> },
}

struct WatchSession {
    index: usize,
    original: EntryRef,
    wrapper: EntryRef,
}

#[derive(Debug)]
enum WatchState {
    Idle,
    Watching(WatchSession),
}

/// The polling state machine.
///
/// Drive it with [`StreamWatcher::poll_once`] or hand it to
/// [`StreamWatcher::spawn`] to poll on a background thread.
pub struct StreamWatcher {
    cfg: WatcherConfig,
    flag: Arc<dyn GenerationFlag>,
    buffer: Arc<dyn MessageBuffer>,
    observer: Arc<dyn WriteObserver>,
    guard: WatchGuard,
    state: WatchState,
    was_generating: bool,
    last_len: usize,
}

impl StreamWatcher {
    /// Creates an idle watcher.
    ///
    /// `guard` must be the same guard the observer serialises on.
    #[must_use]
    pub fn new(
        cfg: WatcherConfig,
        flag: Arc<dyn GenerationFlag>,
        buffer: Arc<dyn MessageBuffer>,
        observer: Arc<dyn WriteObserver>,
        guard: WatchGuard,
    ) -> Self {
        Self {
            cfg,
            flag,
            buffer,
            observer,
            guard,
            state: WatchState::Idle,
            was_generating: false,
            last_len: 0,
        }
    }

    /// Returns true while a wrapper is installed.
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        matches!(self.state, WatchState::Watching(_))
    }

    /// The slot currently wrapped, if any.
    #[must_use]
    pub fn watched_index(&self) -> Option<usize> {
        match &self.state {
            WatchState::Watching(session) => Some(session.index),
            WatchState::Idle => None,
        }
    }

    /// Reads the host inputs once and applies at most one transition.
    pub fn poll_once(&mut self) -> Transition {
        let generating = self.flag.is_generating();
        let len = self.buffer.len();
        let guard = self.guard.clone();
        let _serial = guard.lock();

        let transition = match (self.was_generating, generating) {
            (false, true) => {
                let index = self.capture(len);
                info!(index = ?index, "generation started");
                Transition::Started { index }
            }
            (true, false) => {
                let restored = self.release();
                info!(restored = ?restored, "generation stopped");
                Transition::Stopped { restored }
            }
            (true, true) if len > self.last_len => {
                let from = self.release();
                let to = self.capture(len);
                info!(from = ?from, to = ?to, "buffer grew while generating; retargeted");
                Transition::Retargeted { from, to }
            }
            (true, true) => {
                // Track shrinkage so a later append is still seen as growth.
                self.last_len = self.last_len.min(len);
                Transition::Unchanged
            }
            (false, false) => Transition::Unchanged,
        };

        self.was_generating = generating;
        transition
    }

    /// Removes any installed wrapper. Used on stop.
    pub fn shutdown(&mut self) {
        let guard = self.guard.clone();
        let _serial = guard.lock();
        if self.is_watching() {
            let restored = self.release();
            debug!(restored = ?restored, "watcher shut down");
        }
        self.was_generating = false;
    }

    /// Starts polling on a background thread.
    ///
    /// A panic inside one poll is logged and the loop carries on. The loop
    /// ends only through the returned handle.
    pub fn spawn(mut self) -> StreamRegexResult<WatcherHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let interval = self.cfg.poll_interval;

        let join = thread::Builder::new()
            .name("stream-regex-watcher".to_string())
            .spawn(move || {
                loop {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.poll_once())) {
                        let err = StreamRegexError::from_panic(payload.as_ref());
                        warn!(error = %err, "watcher poll discarded");
                    }

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.shutdown())) {
                    let err = StreamRegexError::from_panic(payload.as_ref());
                    warn!(error = %err, "watcher shutdown discarded");
                }
            })
            .map_err(|e| StreamRegexError::internal(format!("failed to spawn stream watcher: {e}")))?;

        Ok(WatcherHandle {
            stop_tx: Some(stop_tx),
            join: Some(join),
            poll_interval: interval,
        })
    }

    fn capture(&mut self, len: usize) -> Option<usize> {
        self.last_len = len;

        let index = len.checked_sub(1)?;
        let original = self.buffer.get(index)?;
        let wrapper: EntryRef = Arc::new(InterceptedEntry::new(
            Arc::clone(&original),
            Arc::clone(&self.observer),
        ));

        if !self.buffer.compare_and_swap(index, &original, Arc::clone(&wrapper)) {
            warn!(index, "buffer entry changed before the wrapper could be installed");
            return None;
        }

        debug!(index, "interception wrapper installed");
        self.state = WatchState::Watching(WatchSession {
            index,
            original,
            wrapper,
        });
        Some(index)
    }

    fn release(&mut self) -> Option<usize> {
        let WatchState::Watching(session) = std::mem::replace(&mut self.state, WatchState::Idle)
        else {
            return None;
        };

        let index = match self.buffer.get(session.index) {
            Some(current) if same_entry(&current, &session.wrapper) => Some(session.index),
            _ => self.buffer.position(&session.wrapper),
        };

        let Some(index) = index else {
            warn!(index = session.index, "wrapper no longer in buffer; nothing to restore");
            return None;
        };

        if self
            .buffer
            .compare_and_swap(index, &session.wrapper, session.original)
        {
            debug!(index, "original entry restored");
            Some(index)
        } else {
            warn!(index, "wrapper replaced during restore; nothing to restore");
            None
        }
    }
}

impl std::fmt::Debug for StreamWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWatcher")
            .field("cfg", &self.cfg)
            .field("state", &self.state)
            .field("was_generating", &self.was_generating)
            .field("last_len", &self.last_len)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Stop handle for a spawned watcher.
///
/// Dropping the handle stops the watcher too.
#[derive(Debug)]
pub struct WatcherHandle {
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
    poll_interval: Duration,
}

impl WatcherHandle {
    /// The poll interval the watcher runs with.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns true once the watcher thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the watcher, restores any wrapped entry and waits for the thread.
    ///
    /// # Errors
    /// `Internal` if the watcher thread died instead of exiting its loop.
    pub fn stop(mut self) -> StreamRegexResult<()> {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> StreamRegexResult<()> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        match self.join.take().map(JoinHandle::join) {
            Some(Err(payload)) => Err(StreamRegexError::internal(format!(
                "stream watcher thread panicked: {}",
                StreamRegexError::from_panic(payload.as_ref())
            ))),
            _ => Ok(()),
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop_inner() {
            warn!(error = %e, "stream watcher did not stop cleanly");
        }
    }
}
