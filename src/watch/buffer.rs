//! Host-side boundary: the generation flag and the message buffer.
//!
//! The engine may only read the buffer, swap one entry for a wrapper and swap
//! it back. Reference implementations are provided for embedding and tests.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// One message in the host buffer.
pub trait MessageEntry: Send + Sync {
    /// Current text.
    fn text(&self) -> String;

    /// Replace the text.
    fn set_text(&self, text: String);
}

/// Shared handle to a buffer entry.
pub type EntryRef = Arc<dyn MessageEntry>;

/// Identity comparison of two entry handles (data pointer only).
#[must_use]
pub fn same_entry(a: &EntryRef, b: &EntryRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// The host's ordered message buffer.
///
/// Implementations must not hold their own lock while calling into an entry;
/// a wrapped entry's `set_text` takes the watcher's guard.
pub trait MessageBuffer: Send + Sync {
    /// Number of entries.
    fn len(&self) -> usize;

    /// Entry at `index`, if any.
    fn get(&self, index: usize) -> Option<EntryRef>;

    /// Replace the entry at `index` with `replacement` only if it is still
    /// `current`. Returns true when the swap happened.
    fn compare_and_swap(&self, index: usize, current: &EntryRef, replacement: EntryRef) -> bool;

    /// Returns true when the buffer has no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of `entry`, scanning from the end.
    fn position(&self, entry: &EntryRef) -> Option<usize> {
        (0..self.len())
            .rev()
            .find(|&i| self.get(i).is_some_and(|e| same_entry(&e, entry)))
    }
}

/// The host's "a response is being generated" flag.
pub trait GenerationFlag: Send + Sync {
    fn is_generating(&self) -> bool;
}

/// Atomic [`GenerationFlag`].
#[derive(Debug, Default)]
pub struct GenerationState {
    generating: AtomicBool,
}

impl GenerationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, generating: bool) {
        self.generating.store(generating, Ordering::Release);
    }

    pub fn start(&self) {
        self.set(true);
    }

    pub fn stop(&self) {
        self.set(false);
    }
}

impl GenerationFlag for GenerationState {
    fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }
}

/// A plain chat message with a mutable text field.
#[derive(Debug, Default)]
pub struct ChatMessage {
    text: Mutex<String>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
        }
    }
}

impl MessageEntry for ChatMessage {
    fn text(&self) -> String {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_text(&self, text: String) {
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = text;
    }
}

/// In-memory [`MessageBuffer`].
///
/// Writes go through [`ChatBuffer::set_text`], which looks up whatever entry
/// currently occupies the slot, so an installed wrapper sees them. The buffer
/// lock is released before the entry is called.
#[derive(Default)]
pub struct ChatBuffer {
    entries: RwLock<Vec<EntryRef>>,
}

impl ChatBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new message and returns its index.
    pub fn push(&self, text: impl Into<String>) -> usize {
        self.push_entry(Arc::new(ChatMessage::new(text)))
    }

    /// Appends an arbitrary entry and returns its index.
    pub fn push_entry(&self, entry: EntryRef) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push(entry);
        entries.len() - 1
    }

    /// Overwrites the slot at `index` unconditionally, as a host would when
    /// regenerating a message. Returns false if the index is out of range.
    pub fn replace(&self, index: usize, entry: EntryRef) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(index) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }

    /// Removes and returns the entry at `index`, shifting later entries down.
    pub fn remove(&self, index: usize) -> Option<EntryRef> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        (index < entries.len()).then(|| entries.remove(index))
    }

    /// Writes the text of the entry at `index`. Returns false if out of range.
    pub fn set_text(&self, index: usize, text: impl Into<String>) -> bool {
        let Some(entry) = self.get(index) else {
            return false;
        };
        entry.set_text(text.into());
        true
    }

    /// Reads the text of the entry at `index`.
    #[must_use]
    pub fn text(&self, index: usize) -> Option<String> {
        self.get(index).map(|e| e.text())
    }
}

impl fmt::Debug for ChatBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatBuffer")
            .field("len", &self.len())
            .finish()
    }
}

impl MessageBuffer for ChatBuffer {
    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn get(&self, index: usize) -> Option<EntryRef> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    fn compare_and_swap(&self, index: usize, current: &EntryRef, replacement: EntryRef) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(index) {
            Some(slot) if same_entry(slot, current) => {
                *slot = replacement;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_buffer_reads_and_writes() {
        let buf = ChatBuffer::new();
        assert!(buf.is_empty());

        let idx = buf.push("Hello");
        assert_eq!(idx, 0);
        assert!(buf.set_text(0, "Hello world"));
        assert_eq!(buf.text(0).as_deref(), Some("Hello world"));
        assert!(!buf.set_text(5, "nope"));
        assert_eq!(buf.text(5), None);
    }

    #[test]
    fn compare_and_swap_requires_current_entry() {
        let buf = ChatBuffer::new();
        buf.push("a");
        let original = buf.get(0).unwrap();
        let other: EntryRef = Arc::new(ChatMessage::new("b"));

        assert!(!buf.compare_and_swap(0, &other, Arc::clone(&other)));
        assert_eq!(buf.text(0).as_deref(), Some("a"));

        assert!(buf.compare_and_swap(0, &original, Arc::clone(&other)));
        assert_eq!(buf.text(0).as_deref(), Some("b"));
        assert!(!buf.compare_and_swap(3, &other, original));
    }

    #[test]
    fn position_finds_entry_by_identity() {
        let buf = ChatBuffer::new();
        buf.push("same");
        buf.push("same");
        let second = buf.get(1).unwrap();

        assert_eq!(buf.position(&second), Some(1));

        let stranger: EntryRef = Arc::new(ChatMessage::new("same"));
        assert_eq!(buf.position(&stranger), None);
    }

    #[test]
    fn generation_state_toggles() {
        let flag = GenerationState::new();
        assert!(!flag.is_generating());
        flag.start();
        assert!(flag.is_generating());
        flag.stop();
        assert!(!flag.is_generating());
    }
}
