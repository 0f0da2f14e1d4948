//! Bounded registry of bus participants.
//!
//! Index 0 is always the local node. When this engine plays the host role it
//! assigns table slots to nodes that log on; as a plain node it only tracks
//! its own logon state and rebuilds its view after a logon acknowledgement.

use tracing::debug;

use crate::protocol::UNIQUE_ID_LEN;

/// Hard upper bound on the node table size.
pub const MAX_NODES: usize = 32;

/// Outcome of registering a unique id in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The id was already present; nothing changed.
    Duplicate,
    /// The table is full; the id was dropped.
    Full,
    /// The id was appended at this index.
    Added(u8),
}

/// Fixed-capacity table of 7-byte node identities.
#[derive(Debug)]
pub struct NodeTable {
    entries: [[u8; UNIQUE_ID_LEN]; MAX_NODES],
    count: usize,
    capacity: usize,
    version: u8,
}

impl NodeTable {
    /// Create a table seeded with the local node at index 0.
    ///
    /// `capacity` is clamped to `1..=MAX_NODES`.
    #[must_use]
    pub fn new(local_id: [u8; UNIQUE_ID_LEN], capacity: usize) -> Self {
        let mut entries = [[0u8; UNIQUE_ID_LEN]; MAX_NODES];
        entries[0] = local_id;
        Self {
            entries,
            count: 1,
            capacity: capacity.clamp(1, MAX_NODES),
            version: 0,
        }
    }

    /// Table version byte sent with membership messages.
    ///
    /// Deliberately never advanced on membership changes: deployed bus
    /// partners rely on the constant value, so the known gap is preserved
    /// rather than silently fixed.
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Number of registered nodes, local node included.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Index of a unique id, if present.
    #[must_use]
    pub fn find(&self, unique_id: &[u8; UNIQUE_ID_LEN]) -> Option<usize> {
        self.entries[..self.count].iter().position(|e| e == unique_id)
    }

    /// Entry at `index`, if in range.
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<&[u8; UNIQUE_ID_LEN]> {
        self.entries[..self.count].get(index)
    }

    /// Register a unique id, appending it at the next free index.
    ///
    /// Duplicates and capacity overflow are reported but never error: logon
    /// is idempotent and a full table is backpressure without protocol-level
    /// signaling.
    pub fn register(&mut self, unique_id: [u8; UNIQUE_ID_LEN]) -> Registration {
        if self.find(&unique_id).is_some() {
            return Registration::Duplicate;
        }
        if self.count >= self.capacity {
            debug!(?unique_id, "node table full, ignoring logon");
            return Registration::Full;
        }
        let index = self.count;
        self.entries[index] = unique_id;
        self.count += 1;
        Registration::Added(index as u8)
    }

    /// Drop every entry except the local node.
    ///
    /// Called after a logon acknowledgement; the table is rebuilt by
    /// subsequent query/response exchanges.
    pub fn reset_to_self(&mut self) {
        self.count = 1;
    }
}
