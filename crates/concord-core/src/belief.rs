//! Per-claim belief state with bounded history.
//!
//! The resolution rule is the convergence anchor of the whole system: a
//! belief is replaced iff the incoming signal is strictly newer, or equally
//! new with at-least-equal confidence. The decision is a function only of
//! `(timestamp, confidence)`, so peers that saw the same signals in any
//! order converge to the same belief.

use std::collections::HashMap;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::identity::PeerId;
use crate::signal::{Signal, Stance};

/// Newest history entries kept per claim.
pub const HISTORY_CAP: usize = 100;

/// A node's current state on one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    /// The claim this belief is about.
    pub claim_hash: String,

    /// Current stance.
    pub stance: Stance,

    /// Confidence in `[0, 1]`.
    pub confidence: f64,

    /// Timestamp of the winning signal. Non-decreasing under normal
    /// updates; may jump backward after a rollback.
    pub updated_at: u64,

    /// Signal id of the winning signal.
    pub last_signal_id: u64,

    /// Author of the winning signal.
    pub last_source_id: PeerId,
}

/// One accepted update, as recorded in the per-claim history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Signal timestamp.
    pub timestamp: u64,
    /// Stance adopted.
    pub stance: Stance,
    /// Confidence adopted.
    pub confidence: f64,
    /// Signal id.
    pub signal_id: u64,
    /// Author.
    pub source_id: PeerId,
}

/// Point-in-time copy of the belief map, used by rollback.
///
/// History is an append-only record and is deliberately not captured: a
/// rollback rewinds beliefs, not the memory of how they got there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefSnapshot {
    beliefs: HashMap<String, Belief>,
}

impl BeliefSnapshot {
    /// Number of claims in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.beliefs.len()
    }

    /// Whether the snapshot holds no claims.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beliefs.is_empty()
    }
}

/// Store of one belief per claim plus bounded history.
#[derive(Debug, Default)]
pub struct BeliefStore {
    beliefs: HashMap<String, Belief>,
    history: HashMap<String, VecDeque<HistoryEntry>>,
}

impl BeliefStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current belief for a claim, if any.
    #[must_use]
    pub fn get(&self, claim_hash: &str) -> Option<&Belief> {
        self.beliefs.get(claim_hash)
    }

    /// All current beliefs.
    pub fn all(&self) -> impl Iterator<Item = &Belief> {
        self.beliefs.values()
    }

    /// Number of claims with a belief.
    #[must_use]
    pub fn len(&self) -> usize {
        self.beliefs.len()
    }

    /// Whether the store holds no beliefs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beliefs.is_empty()
    }

    /// Applies a signal under the resolution rule.
    ///
    /// Returns `true` iff the belief was replaced. A history entry is
    /// recorded only on acceptance; losers leave no trace.
    pub fn apply(&mut self, signal: &Signal) -> bool {
        let claim = &signal.payload.claim_hash;
        let incoming_ts = signal.timestamp;
        let incoming_conf = signal.payload.confidence;

        let accept = match self.beliefs.get(claim) {
            None => true,
            Some(prev) => {
                incoming_ts > prev.updated_at
                    || (incoming_ts == prev.updated_at && incoming_conf >= prev.confidence)
            },
        };
        if !accept {
            return false;
        }

        self.beliefs.insert(
            claim.clone(),
            Belief {
                claim_hash: claim.clone(),
                stance: signal.payload.direction.stance(),
                confidence: incoming_conf,
                updated_at: incoming_ts,
                last_signal_id: signal.signal_id,
                last_source_id: signal.source_id.clone(),
            },
        );

        let entries = self.history.entry(claim.clone()).or_default();
        entries.push_back(HistoryEntry {
            timestamp: incoming_ts,
            stance: signal.payload.direction.stance(),
            confidence: incoming_conf,
            signal_id: signal.signal_id,
            source_id: signal.source_id.clone(),
        });
        while entries.len() > HISTORY_CAP {
            entries.pop_front();
        }

        true
    }

    /// Accepted updates for a claim, oldest first, capped at
    /// [`HISTORY_CAP`].
    #[must_use]
    pub fn get_history(&self, claim_hash: &str) -> Vec<&HistoryEntry> {
        self.history
            .get(claim_hash)
            .map(|entries| entries.iter().collect())
            .unwrap_or_default()
    }

    /// Copies the current belief map.
    #[must_use]
    pub fn snapshot(&self) -> BeliefSnapshot {
        BeliefSnapshot {
            beliefs: self.beliefs.clone(),
        }
    }

    /// Replaces the belief map with a snapshot. `updated_at` values may
    /// jump backward; that is the point.
    pub fn restore(&mut self, snapshot: &BeliefSnapshot) {
        self.beliefs = snapshot.beliefs.clone();
    }

    /// Stance and confidence per claim, for drift comparison and
    /// checkpoint replies.
    #[must_use]
    pub fn get_consensus(&self) -> HashMap<String, (Stance, f64)> {
        self.beliefs
            .iter()
            .map(|(claim, belief)| (claim.clone(), (belief.stance, belief.confidence)))
            .collect()
    }
}
