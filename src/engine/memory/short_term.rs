// ── Memory: Short-Term Tier ────────────────────────────────────────────────
//
// Tier 0 of the three-tier memory:
//   Short-Term (this turn's window) → Working Memory (current turn) → Long-Term (session+)
//
// A bounded FIFO of raw messages: the immediate conversational window the
// context builder always sees.
//
// Key properties:
//   - Pure in-memory, per session
//   - Append then trim: overflow drops the oldest message(s)
//   - Chronological reads (oldest first)
//   - Character footprint tracked alongside push/evict

use crate::atoms::types::Message;
use crate::engine::memory::eviction::{BoundedStore, FifoPolicy};

/// Bounded, chronologically ordered message buffer.
pub struct ShortTermMemory {
    messages: BoundedStore<Message, FifoPolicy>,
    /// Running total of content characters (kept in sync with push/evict).
    total_chars: usize,
}

impl ShortTermMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: BoundedStore::new(capacity, FifoPolicy),
            total_chars: 0,
        }
    }

    /// Append a message. Returns the evicted messages (oldest first), if any.
    pub fn add_message(&mut self, message: Message) -> Vec<Message> {
        self.total_chars += message.content.chars().count();
        let mut evicted = self.messages.push(message);
        evicted.reverse();
        for e in &evicted {
            self.total_chars = self.total_chars.saturating_sub(e.content.chars().count());
        }
        evicted
    }

    /// The last `limit` messages (or all of them) in chronological order.
    pub fn recent_messages(&self, limit: Option<usize>) -> Vec<Message> {
        let items = self.messages.items();
        let skip = match limit {
            Some(n) => items.len().saturating_sub(n),
            None => 0,
        };
        items[skip..].to_vec()
    }

    /// Borrowing iterator over all messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Messages whose content contains `needle` (case-insensitive).
    pub fn search(&self, needle: &str) -> Vec<&Message> {
        let needle = needle.to_lowercase();
        self.messages
            .iter()
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.messages.capacity()
    }

    pub fn total_chars(&self) -> usize {
        self.total_chars
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.total_chars = 0;
    }

    /// Change capacity; shrinking drops the oldest messages.
    pub fn resize(&mut self, capacity: usize) {
        for e in self.messages.resize(capacity) {
            self.total_chars = self.total_chars.saturating_sub(e.content.chars().count());
        }
    }
}
