//! Write interception wrapper.
//!
//! An [`InterceptedEntry`] stands in for a buffer entry. Reads pass straight
//! through; every text write is shown to the observer first and then stored
//! on the wrapped entry. The write always lands, even if the observer panics.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::error::StreamRegexError;

use super::buffer::{EntryRef, MessageEntry};

/// Receives every text written through an [`InterceptedEntry`].
pub trait WriteObserver: Send + Sync {
    /// Called with the new text before it is stored.
    fn on_write(&self, text: &str);
}

/// A buffer entry wrapped so that writes are observed.
pub struct InterceptedEntry {
    inner: EntryRef,
    observer: Arc<dyn WriteObserver>,
}

impl InterceptedEntry {
    #[must_use]
    pub fn new(inner: EntryRef, observer: Arc<dyn WriteObserver>) -> Self {
        Self { inner, observer }
    }

    /// The wrapped entry.
    #[must_use]
    pub const fn inner(&self) -> &EntryRef {
        &self.inner
    }
}

impl MessageEntry for InterceptedEntry {
    fn text(&self) -> String {
        self.inner.text()
    }

    fn set_text(&self, text: String) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.observer.on_write(&text))) {
            let err = StreamRegexError::from_panic(payload.as_ref());
            warn!(error = %err, "write evaluation discarded");
        }
        self.inner.set_text(text);
    }
}

impl fmt::Debug for InterceptedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedEntry").finish_non_exhaustive()
    }
}
