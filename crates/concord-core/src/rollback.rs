//! Bounded belief snapshot buffer.
//!
//! Snapshots are taken before risky transitions (arbitration resolutions,
//! operator-requested restore points). The buffer keeps the newest 64;
//! rolling back pops the most recent and hands it to the belief store.

use std::collections::VecDeque;

use crate::belief::BeliefSnapshot;

/// Newest snapshots kept.
pub const SNAPSHOT_CAP: usize = 64;

/// One stored restore point.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    /// The belief state.
    pub snapshot: BeliefSnapshot,
    /// When it was taken.
    pub taken_at: u64,
    /// Why it was taken.
    pub label: String,
}

/// Ring of restore points, newest last.
#[derive(Debug, Default)]
pub struct RollbackBuffer {
    snapshots: VecDeque<StoredSnapshot>,
}

impl RollbackBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a snapshot, evicting the oldest past the cap.
    pub fn push(&mut self, snapshot: BeliefSnapshot, label: impl Into<String>, now: u64) {
        self.snapshots.push_back(StoredSnapshot {
            snapshot,
            taken_at: now,
            label: label.into(),
        });
        while self.snapshots.len() > SNAPSHOT_CAP {
            self.snapshots.pop_front();
        }
    }

    /// Removes and returns the newest snapshot.
    pub fn pop_latest(&mut self) -> Option<StoredSnapshot> {
        self.snapshots.pop_back()
    }

    /// Newest snapshot without removing it.
    #[must_use]
    pub fn latest(&self) -> Option<&StoredSnapshot> {
        self.snapshots.back()
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no snapshots are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::BeliefStore;
    use crate::identity::Keypair;
    use crate::signal::{Direction, SignalBuilder, Stance};

    #[test]
    fn cap_evicts_oldest() {
        let store = BeliefStore::new();
        let mut buffer = RollbackBuffer::new();
        for i in 0..(SNAPSHOT_CAP as u64 + 10) {
            buffer.push(store.snapshot(), format!("point-{i}"), i);
        }
        assert_eq!(buffer.len(), SNAPSHOT_CAP);
        assert_eq!(buffer.latest().unwrap().taken_at, SNAPSHOT_CAP as u64 + 9);
    }

    #[test]
    fn rollback_restores_the_snapshotted_beliefs() {
        let keypair = Keypair::generate();
        let mut store = BeliefStore::new();
        let mut buffer = RollbackBuffer::new();

        store.apply(
            &SignalBuilder::new("claim:x", Direction::Strengthen, 0.8).sign(&keypair, 1, 100),
        );
        buffer.push(store.snapshot(), "before arbitration", 150);
        store.apply(&SignalBuilder::new("claim:x", Direction::Retract, 0.9).sign(&keypair, 2, 200));
        assert_eq!(store.get("claim:x").unwrap().stance, Stance::Retract);

        let point = buffer.pop_latest().expect("snapshot stored");
        store.restore(&point.snapshot);
        // updated_at jumped backward; that is what rollback is for.
        assert_eq!(store.get("claim:x").unwrap().stance, Stance::Strengthen);
        assert_eq!(store.get("claim:x").unwrap().updated_at, 100);
        assert!(buffer.is_empty());
    }
}
