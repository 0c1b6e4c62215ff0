use std::collections::VecDeque;

use serde::{Serialize, Serializer};

/// One question/answer exchange.
///
/// Serializes as a two-element array `[query, answer]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub query: String,
    pub answer: String,
}

impl MemoryEntry {
    pub fn new(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
        }
    }
}

impl Serialize for MemoryEntry {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        (&self.query, &self.answer).serialize(serializer)
    }
}

/// Bounded, insertion-ordered log of recent exchanges.
///
/// Once `capacity` entries are stored, each push evicts the oldest one.
/// Readers only ever look at the most recent few entries, so nothing past
/// the largest read window needs to be kept.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    entries: VecDeque<MemoryEntry>,
    capacity: usize,
}

impl ConversationMemory {
    /// Create an empty log. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: MemoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<MemoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Render the last `n` entries as QA context.
    ///
    /// Each exchange becomes `Q: <query>\nA: <answer>`; exchanges are
    /// separated by a newline. Returns an empty string when there is no
    /// history.
    ///
    /// # Examples
    ///
    /// ```
    /// use docqa::memory::{ConversationMemory, MemoryEntry};
    ///
    /// let mut memory = ConversationMemory::new(5);
    /// memory.push(MemoryEntry::new("q1", "a1"));
    /// memory.push(MemoryEntry::new("q2", "a2"));
    /// assert_eq!(memory.format_context(3), "Q: q1\nA: a1\nQ: q2\nA: a2");
    /// ```
    pub fn format_context(&self, n: usize) -> String {
        let skip = self.entries.len().saturating_sub(n);
        self.entries
            .iter()
            .skip(skip)
            .map(|e| format!("Q: {}\nA: {}", e.query, e.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, n: usize) -> ConversationMemory {
        let mut memory = ConversationMemory::new(capacity);
        for i in 0..n {
            memory.push(MemoryEntry::new(format!("q{i}"), format!("a{i}")));
        }
        memory
    }

    #[test]
    fn recent_returns_tail_oldest_first() {
        let memory = filled(5, 4);
        let recent = memory.recent(2);
        assert_eq!(
            recent,
            vec![MemoryEntry::new("q2", "a2"), MemoryEntry::new("q3", "a3")]
        );
    }

    #[test]
    fn recent_with_large_window_returns_everything() {
        let memory = filled(5, 2);
        assert_eq!(memory.recent(5).len(), 2);
        assert!(memory.recent(0).is_empty());
    }

    #[test]
    fn push_evicts_oldest_when_full() {
        let memory = filled(5, 8);
        assert_eq!(memory.len(), 5);
        assert_eq!(memory.recent(5)[0], MemoryEntry::new("q3", "a3"));
        assert_eq!(memory.recent(1)[0], MemoryEntry::new("q7", "a7"));
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let memory = filled(0, 3);
        assert_eq!(memory.capacity(), 1);
        assert_eq!(memory.recent(5), vec![MemoryEntry::new("q2", "a2")]);
    }

    #[test]
    fn empty_memory_formats_to_empty_string() {
        let memory = ConversationMemory::new(5);
        assert!(memory.is_empty());
        assert_eq!(memory.format_context(3), "");
    }

    #[test]
    fn format_context_uses_only_last_window() {
        let memory = filled(5, 5);
        assert_eq!(
            memory.format_context(3),
            "Q: q2\nA: a2\nQ: q3\nA: a3\nQ: q4\nA: a4"
        );
    }

    #[test]
    fn entry_serializes_as_pair() {
        let entry = MemoryEntry::new("What is X?", "X");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!(["What is X?", "X"]));
    }
}
