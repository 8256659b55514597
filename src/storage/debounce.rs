//! Debounced settings writer.
//!
//! Mutating commands schedule a save and return immediately. A worker thread
//! waits for a quiet period and then writes only the newest record, so a
//! burst of edits costs one write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{ExecutionError, StreamRegexError, StreamRegexResult};
use crate::storage::traits::{SettingsStore, StorageError};

enum SaveMsg {
    Schedule(Settings),
    Flush(Sender<Result<(), StorageError>>),
}

#[derive(Debug, Default)]
struct SaverStats {
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Coalescing background writer for a [`SettingsStore`].
///
/// Dropping the saver writes any pending record before the worker exits.
pub struct DebouncedSaver {
    tx: Sender<SaveMsg>,
    stats: Arc<SaverStats>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl DebouncedSaver {
    /// Starts the saver worker.
    pub fn start(store: Arc<dyn SettingsStore>, debounce: Duration) -> StreamRegexResult<Self> {
        let (tx, rx) = unbounded::<SaveMsg>();
        let stats = Arc::new(SaverStats::default());

        let thread_stats = Arc::clone(&stats);
        let join = thread::Builder::new()
            .name("stream-regex-saver".to_string())
            .spawn(move || save_loop(store.as_ref(), debounce, &thread_stats, &rx))
            .map_err(|e| StreamRegexError::internal(format!("failed to spawn settings saver: {e}")))?;

        Ok(Self {
            tx,
            stats,
            join: Mutex::new(Some(join)),
        })
    }

    /// Schedules `settings` to be written after the debounce period.
    ///
    /// A later call before the write replaces the pending record.
    pub fn schedule(&self, settings: Settings) {
        if self.tx.send(SaveMsg::Schedule(settings)).is_err() {
            warn!("settings saver is gone; save dropped");
        }
    }

    /// Writes any pending record now and waits for the result.
    pub fn flush(&self) -> StreamRegexResult<()> {
        let disconnected = || {
            StreamRegexError::Execution(ExecutionError::Disconnected {
                path: "settings_saver".to_string(),
            })
        };

        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(SaveMsg::Flush(reply_tx))
            .map_err(|_| disconnected())?;
        reply_rx.recv().map_err(|_| disconnected())??;
        Ok(())
    }

    /// Number of successful writes.
    #[must_use]
    pub fn completed_saves(&self) -> u64 {
        self.stats.completed.load(Ordering::Relaxed)
    }

    /// Number of failed writes.
    #[must_use]
    pub fn failed_saves(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for DebouncedSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedSaver")
            .field("completed", &self.completed_saves())
            .field("failed", &self.failed_saves())
            .finish_non_exhaustive()
    }
}

impl Drop for DebouncedSaver {
    fn drop(&mut self) {
        // Disconnect so the worker writes what is pending and exits.
        let (dummy_tx, _) = bounded::<SaveMsg>(1);
        drop(std::mem::replace(&mut self.tx, dummy_tx));

        if let Ok(mut guard) = self.join.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}

fn write_pending(
    store: &dyn SettingsStore,
    pending: &mut Option<Settings>,
    stats: &SaverStats,
) -> Result<(), StorageError> {
    let Some(settings) = pending.take() else {
        return Ok(());
    };

    match store.save(&settings) {
        Ok(()) => {
            stats.completed.fetch_add(1, Ordering::Relaxed);
            debug!(rules = settings.regex_list.len(), "settings saved");
            Ok(())
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "settings save failed");
            Err(e)
        }
    }
}

fn save_loop(
    store: &dyn SettingsStore,
    debounce: Duration,
    stats: &SaverStats,
    rx: &Receiver<SaveMsg>,
) {
    let mut pending: Option<Settings> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let msg = match deadline {
            Some(at) => rx.recv_deadline(at),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match msg {
            Ok(SaveMsg::Schedule(settings)) => {
                pending = Some(settings);
                // A debounce past the clock's range waits for flush or drop.
                deadline = Instant::now().checked_add(debounce);
            }
            Ok(SaveMsg::Flush(reply)) => {
                deadline = None;
                let _ = reply.send(write_pending(store, &mut pending, stats));
            }
            Err(RecvTimeoutError::Timeout) => {
                deadline = None;
                let _ = write_pending(store, &mut pending, stats);
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = write_pending(store, &mut pending, stats);
                break;
            }
        }
    }
}
