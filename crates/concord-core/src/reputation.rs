//! Progressive trust scoring.
//!
//! Reputation accrues slowly (small accuracy and consistency increments)
//! and is lost fast (failures cost twice what successes earn, violations
//! cost four times that again). Influence maps score into
//! `[new_peer_influence, 1]`, so a fresh identity can never vote with more
//! than the floor — the anti-Sybil property arbitration leans on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::PeerId;

const ACCURACY_SUCCESS_STEP: f64 = 0.05;
const ACCURACY_FAILURE_STEP: f64 = 0.10;
const CONSISTENCY_STEP: f64 = 0.02;
const VIOLATION_PENALTY: f64 = 0.20;
const AGE_SATURATION: f64 = 100.0;

/// Tracked trust state for one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    /// Fraction of verifiable interactions that checked out, in `[0, 1]`.
    pub accuracy: f64,

    /// Steady-participation component, in `[0, 1]`.
    pub consistency: f64,

    /// Heartbeats observed; saturates in the score at 100.
    pub age: u64,

    /// Violations recorded against this peer.
    pub violations: u32,

    /// Derived score in `[0, 1]`.
    pub score: f64,

    /// Timestamp of the last update.
    pub last_updated: u64,
}

impl ReputationRecord {
    #[expect(
        clippy::cast_precision_loss,
        reason = "age saturates at 100 in the score; precision is irrelevant"
    )]
    fn recompute(&mut self) {
        let base = 0.4 * self.accuracy
            + 0.3 * self.consistency
            + 0.2 * (self.age as f64 / AGE_SATURATION).min(1.0);
        self.score = (base - 0.1 * f64::from(self.violations)).clamp(0.0, 1.0);
    }
}

/// Reputation scores for every tracked peer.
#[derive(Debug)]
pub struct ReputationLedger {
    records: HashMap<PeerId, ReputationRecord>,
    new_peer_influence: f64,
    min_vote_score: f64,
}

impl ReputationLedger {
    /// Creates a ledger with the given influence floor and voting gate.
    #[must_use]
    pub fn new(new_peer_influence: f64, min_vote_score: f64) -> Self {
        Self {
            records: HashMap::new(),
            new_peer_influence: new_peer_influence.clamp(0.0, 1.0),
            min_vote_score: min_vote_score.clamp(0.0, 1.0),
        }
    }

    /// Starts tracking a peer if it is not already tracked.
    ///
    /// A new record starts at the influence floor; the formula takes over
    /// from the first update.
    pub fn track(&mut self, peer: &PeerId, now: u64) {
        self.records.entry(peer.clone()).or_insert(ReputationRecord {
            accuracy: 0.5,
            consistency: 0.5,
            age: 0,
            violations: 0,
            score: self.new_peer_influence,
            last_updated: now,
        });
    }

    /// Record for a peer, if tracked.
    #[must_use]
    pub fn get(&self, peer: &PeerId) -> Option<&ReputationRecord> {
        self.records.get(peer)
    }

    /// Score for a peer; untracked peers sit at the influence floor.
    #[must_use]
    pub fn get_score(&self, peer: &PeerId) -> f64 {
        self.records
            .get(peer)
            .map_or(self.new_peer_influence, |r| r.score)
    }

    /// A verifiable interaction checked out (signature verified, forward
    /// accepted).
    pub fn record_success(&mut self, peer: &PeerId, now: u64) {
        self.track(peer, now);
        let record = self.records.get_mut(peer).expect("tracked above");
        record.accuracy = (record.accuracy + ACCURACY_SUCCESS_STEP).min(1.0);
        record.last_updated = now;
        record.recompute();
    }

    /// A verifiable interaction failed (bad signature, replay).
    pub fn record_failure(&mut self, peer: &PeerId, now: u64) {
        self.track(peer, now);
        let record = self.records.get_mut(peer).expect("tracked above");
        record.accuracy = (record.accuracy - ACCURACY_FAILURE_STEP).max(0.0);
        record.last_updated = now;
        record.recompute();
    }

    /// The peer showed up on schedule; consistency credit plus one age
    /// tick.
    pub fn record_consistency(&mut self, peer: &PeerId, now: u64) {
        self.track(peer, now);
        let record = self.records.get_mut(peer).expect("tracked above");
        record.consistency = (record.consistency + CONSISTENCY_STEP).min(1.0);
        record.age += 1;
        record.last_updated = now;
        record.recompute();
    }

    /// Records a violation. The flat penalty applies immediately; the
    /// violation also drags every future recompute down.
    pub fn record_violation(&mut self, peer: &PeerId, reason: &str, now: u64) {
        self.track(peer, now);
        let record = self.records.get_mut(peer).expect("tracked above");
        record.violations += 1;
        record.score = (record.score - VIOLATION_PENALTY).max(0.0);
        record.last_updated = now;
        tracing::warn!(
            peer = %peer,
            reason,
            violations = record.violations,
            score = record.score,
            "reputation violation recorded"
        );
    }

    /// Effective vote weight in `[new_peer_influence, 1]`.
    ///
    /// Quarantine zeroing is applied by the caller; this is the raw
    /// influence.
    #[must_use]
    pub fn get_influence(&self, peer: &PeerId) -> f64 {
        self.new_peer_influence + (1.0 - self.new_peer_influence) * self.get_score(peer)
    }

    /// Whether the peer clears the arbitration voting gate.
    #[must_use]
    pub fn can_vote(&self, peer: &PeerId) -> bool {
        self.get_score(peer) >= self.min_vote_score
    }

    /// Violations recorded against a peer (0 if untracked).
    #[must_use]
    pub fn violations(&self, peer: &PeerId) -> u32 {
        self.records.get(peer).map_or(0, |r| r.violations)
    }

    /// Number of tracked peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no peers are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
