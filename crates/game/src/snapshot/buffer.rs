use std::collections::BTreeMap;
use std::sync::Arc;

use super::state::StateSnapshot;

/// Tick-ordered store of shared snapshots with an upper bound on size.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    snapshots: BTreeMap<u32, Arc<StateSnapshot>>,
    capacity: usize,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Stores the snapshot, replacing any entry for the same tick. Returns
    /// the number of oldest entries evicted to stay within capacity.
    pub fn insert(&mut self, snapshot: Arc<StateSnapshot>) -> usize {
        self.snapshots.insert(snapshot.tick, snapshot);

        let mut evicted = 0;
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_first();
            evicted += 1;
        }
        evicted
    }

    pub fn get(&self, tick: u32) -> Option<&Arc<StateSnapshot>> {
        self.snapshots.get(&tick)
    }

    pub fn contains(&self, tick: u32) -> bool {
        self.snapshots.contains_key(&tick)
    }

    pub fn latest(&self) -> Option<&Arc<StateSnapshot>> {
        self.snapshots.last_key_value().map(|(_, snapshot)| snapshot)
    }

    pub fn oldest_tick(&self) -> Option<u32> {
        self.snapshots.first_key_value().map(|(tick, _)| *tick)
    }

    /// Drops every snapshot strictly older than `tick`.
    pub fn retain_from(&mut self, tick: u32) {
        self.snapshots = self.snapshots.split_off(&tick);
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
