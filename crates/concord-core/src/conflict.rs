//! Conflict detection over peer stance distributions.
//!
//! Every observed stance (from accepted signals and checkpoint responses)
//! lands in a per-claim map. The conflict score is the Shannon entropy of
//! the non-unknown stance distribution, normalized by `log2(max(2,
//! unique))` so it stays in `[0, 1]`. Crossing the divergence threshold
//! from below is reported exactly once per ascent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::PeerId;
use crate::signal::Stance;

/// One peer's recorded stance on a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StanceObservation {
    /// The stance held.
    pub stance: Stance,
    /// Confidence attached to it.
    pub confidence: f64,
    /// When it was observed.
    pub timestamp: u64,
}

/// Accumulated disagreement state for one claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Optional application meaning string attached to the claim.
    pub meaning: Option<String>,

    /// Latest stance per peer.
    pub stances: HashMap<PeerId, StanceObservation>,

    /// Stance histogram rebuilt on every observation.
    pub counts: HashMap<Stance, usize>,

    /// Normalized entropy in `[0, 1]`.
    pub score: f64,

    /// Last observation time, for pruning.
    pub last_observed: u64,
}

impl ConflictRecord {
    fn rebuild(&mut self) {
        self.counts.clear();
        for obs in self.stances.values() {
            *self.counts.entry(obs.stance).or_insert(0) += 1;
        }
        self.score = self.entropy_score();
    }

    /// Normalized entropy of the non-unknown stance distribution.
    #[expect(
        clippy::cast_precision_loss,
        reason = "stance counts stay far below 2^52"
    )]
    fn entropy_score(&self) -> f64 {
        let total = self.stances.len();
        let unique = self
            .counts
            .keys()
            .filter(|s| **s != Stance::Unknown)
            .count();
        if total <= 1 || unique <= 1 {
            return 0.0;
        }

        let total_f = total as f64;
        let mut entropy = 0.0;
        for (stance, count) in &self.counts {
            if *stance == Stance::Unknown || *count == 0 {
                continue;
            }
            let p = *count as f64 / total_f;
            entropy -= p * p.log2();
        }

        let norm = (unique.max(2) as f64).log2();
        (entropy / norm).min(1.0)
    }
}

/// What an observation did to a claim's conflict state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationOutcome {
    /// Score after the observation.
    pub score: f64,
    /// `true` iff the score crossed the threshold upward just now.
    pub newly_contested: bool,
}

/// Per-claim conflict accumulator.
#[derive(Debug)]
pub struct ConflictAccumulator {
    records: HashMap<String, ConflictRecord>,
    threshold: f64,
}

impl ConflictAccumulator {
    /// Creates an accumulator with the given divergence threshold.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            records: HashMap::new(),
            threshold,
        }
    }

    /// Records a peer's stance on a claim and recomputes the score.
    pub fn observe_belief(
        &mut self,
        peer: &PeerId,
        claim_hash: &str,
        stance: Stance,
        confidence: f64,
        timestamp: u64,
        meaning: Option<&str>,
    ) -> ObservationOutcome {
        let record = self.records.entry(claim_hash.to_owned()).or_default();
        if let Some(meaning) = meaning {
            record.meaning = Some(meaning.to_owned());
        }
        let before = record.score;
        record.stances.insert(
            peer.clone(),
            StanceObservation {
                stance,
                confidence: confidence.clamp(0.0, 1.0),
                timestamp,
            },
        );
        record.last_observed = timestamp;
        record.rebuild();

        let newly_contested = before < self.threshold && record.score >= self.threshold;
        if newly_contested {
            tracing::info!(
                claim = claim_hash,
                score = record.score,
                peers = record.stances.len(),
                "conflict detected"
            );
        }
        ObservationOutcome {
            score: record.score,
            newly_contested,
        }
    }

    /// Clears a claim's stances and zeroes its score.
    ///
    /// Returns `false` if the claim was never observed.
    pub fn resolve(&mut self, claim_hash: &str) -> bool {
        match self.records.get_mut(claim_hash) {
            None => false,
            Some(record) => {
                record.stances.clear();
                record.counts.clear();
                record.score = 0.0;
                true
            },
        }
    }

    /// Current score for a claim (0 when untracked).
    #[must_use]
    pub fn score(&self, claim_hash: &str) -> f64 {
        self.records.get(claim_hash).map_or(0.0, |r| r.score)
    }

    /// Record for a claim, if tracked.
    #[must_use]
    pub fn get(&self, claim_hash: &str) -> Option<&ConflictRecord> {
        self.records.get(claim_hash)
    }

    /// Claims whose score currently sits at or above the threshold.
    #[must_use]
    pub fn contested(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|(_, r)| r.score >= self.threshold)
            .map(|(claim, _)| claim.as_str())
            .collect()
    }

    /// Drops records not observed within the horizon.
    pub fn prune(&mut self, horizon_ms: u64, now: u64) {
        self.records
            .retain(|_, r| now.saturating_sub(r.last_observed) <= horizon_ms);
    }

    /// Number of tracked claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no claims are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
