//! Bounded feature table.
//!
//! A node advertises small integer-keyed capability values to its bus peers.
//! The table is a fixed array with update-in-place semantics: overwriting an
//! existing id keeps its position, and writes past capacity vanish silently.
//! Silent drop is deliberate - a bus node must not fall over because a peer
//! pushed one feature too many.

use tracing::debug;

/// Maximum number of feature entries.
pub const MAX_FEATURES: usize = 16;

/// One `(feature_id, value)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feature {
    /// Feature id.
    pub id: u8,
    /// Current value.
    pub value: u8,
}

/// Insertion-ordered key-value store with a fixed capacity.
#[derive(Debug)]
pub struct FeatureTable {
    entries: [Feature; MAX_FEATURES],
    count: usize,
    cursor: usize,
}

impl FeatureTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: [Feature { id: 0, value: 0 }; MAX_FEATURES],
            count: 0,
            cursor: 0,
        }
    }

    /// Store a value. Overwrites in place, appends when new, and silently
    /// drops the write when the table is full.
    pub fn set(&mut self, id: u8, value: u8) {
        for entry in &mut self.entries[..self.count] {
            if entry.id == id {
                entry.value = value;
                return;
            }
        }
        if self.count < MAX_FEATURES {
            self.entries[self.count] = Feature { id, value };
            self.count += 1;
        } else {
            debug!(id, value, "feature table full, dropping set");
        }
    }

    /// Value for `id`, or 0 when absent.
    ///
    /// 0 doubles as the "unknown feature" sentinel; a present feature with
    /// value 0 is indistinguishable by design. Use [`FeatureTable::lookup`]
    /// where the distinction matters.
    #[must_use]
    pub fn get(&self, id: u8) -> u8 {
        self.lookup(id).unwrap_or(0)
    }

    /// Value for `id`, `None` when the feature is not present.
    #[must_use]
    pub fn lookup(&self, id: u8) -> Option<u8> {
        self.entries[..self.count]
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.value)
    }

    /// Number of stored features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Restart GETALL/GETNEXT iteration.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Next feature during iteration, `None` at the end of the table.
    /// Reaching the end also rewinds for the next iteration round.
    pub fn next_entry(&mut self) -> Option<Feature> {
        if self.cursor < self.count {
            let entry = self.entries[self.cursor];
            self.cursor += 1;
            Some(entry)
        } else {
            self.cursor = 0;
            None
        }
    }
}

impl Default for FeatureTable {
    fn default() -> Self {
        Self::new()
    }
}
