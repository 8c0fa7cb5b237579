//! Learning pattern bundles.
//!
//! Claims that keep resolving the same way become shareable patterns. A
//! bundle is emitted once a claim has enough observations and a high
//! enough success rate; the T-state learning gate (checked by the node)
//! decides whether emission actually goes out. Received bundles are
//! recorded for the application but confer no trust.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::signal::Stance;

/// Lifecycle of a tracked pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    /// Still collecting outcomes.
    Accumulating,
    /// Bundle emitted; further outcomes keep accumulating silently.
    Emitted,
}

/// A shareable resolution pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternBundle {
    /// Claim the pattern is about.
    pub claim_hash: String,
    /// Stance the claim keeps resolving to.
    pub stance: Stance,
    /// Observations behind the pattern.
    pub observations: u32,
    /// Success rate over those observations.
    pub success_rate: f64,
    /// When the bundle was built.
    pub created_at: u64,
}

#[derive(Debug, Clone, Default)]
struct PatternStats {
    successes: u32,
    failures: u32,
    stance: Option<Stance>,
    status: Option<PatternStatus>,
}

impl PatternStats {
    fn observations(&self) -> u32 {
        self.successes + self.failures
    }

    fn success_rate(&self) -> f64 {
        let total = self.observations();
        if total == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(total)
        }
    }
}

/// Tracks per-claim outcome statistics and builds bundles.
#[derive(Debug)]
pub struct PatternTracker {
    stats: HashMap<String, PatternStats>,
    absorbed: Vec<PatternBundle>,
    threshold: u32,
    min_success_rate: f64,
}

impl PatternTracker {
    /// Creates a tracker with the emission threshold and quality gate.
    #[must_use]
    pub fn new(threshold: u32, min_success_rate: f64) -> Self {
        Self {
            stats: HashMap::new(),
            absorbed: Vec::new(),
            threshold: threshold.max(1),
            min_success_rate: min_success_rate.clamp(0.0, 1.0),
        }
    }

    /// Records one resolution outcome for a claim.
    pub fn record_outcome(&mut self, claim_hash: &str, stance: Stance, success: bool) {
        let stats = self.stats.entry(claim_hash.to_owned()).or_default();
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.stance = Some(stance);
        stats.status.get_or_insert(PatternStatus::Accumulating);
    }

    /// Builds bundles for every claim that newly clears both gates.
    ///
    /// Each claim emits at most once; the caller checks the T-state
    /// learning gate before broadcasting.
    pub fn ready_bundles(&mut self, now: u64) -> Vec<PatternBundle> {
        let mut bundles = Vec::new();
        let mut claims: Vec<&String> = self.stats.keys().collect();
        claims.sort();
        let claims: Vec<String> = claims.into_iter().cloned().collect();

        for claim in claims {
            let stats = self.stats.get_mut(&claim).expect("known key");
            if stats.status == Some(PatternStatus::Emitted) {
                continue;
            }
            let Some(stance) = stats.stance else { continue };
            if stats.observations() >= self.threshold
                && stats.success_rate() >= self.min_success_rate
            {
                stats.status = Some(PatternStatus::Emitted);
                bundles.push(PatternBundle {
                    claim_hash: claim,
                    stance,
                    observations: stats.observations(),
                    success_rate: stats.success_rate(),
                    created_at: now,
                });
            }
        }
        bundles
    }

    /// Records a bundle received from a peer. No trust is conferred.
    pub fn absorb(&mut self, bundle: PatternBundle) {
        self.absorbed.push(bundle);
    }

    /// Bundles received from peers, in arrival order.
    #[must_use]
    pub fn absorbed(&self) -> &[PatternBundle] {
        &self.absorbed
    }

    /// Current status for a claim.
    #[must_use]
    pub fn status(&self, claim_hash: &str) -> Option<PatternStatus> {
        self.stats.get(claim_hash).and_then(|s| s.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_emits_once_past_threshold_and_rate() {
        let mut tracker = PatternTracker::new(5, 0.6);
        for _ in 0..4 {
            tracker.record_outcome("claim:x", Stance::Strengthen, true);
        }
        assert!(tracker.ready_bundles(100).is_empty());

        tracker.record_outcome("claim:x", Stance::Strengthen, true);
        let bundles = tracker.ready_bundles(200);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].observations, 5);
        assert!((bundles[0].success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(tracker.status("claim:x"), Some(PatternStatus::Emitted));

        // No re-emission.
        tracker.record_outcome("claim:x", Stance::Strengthen, true);
        assert!(tracker.ready_bundles(300).is_empty());
    }

    #[test]
    fn low_success_rate_blocks_emission() {
        let mut tracker = PatternTracker::new(5, 0.6);
        for i in 0..10 {
            tracker.record_outcome("claim:x", Stance::Weaken, i % 2 == 0);
        }
        // 50% success rate sits below the 0.6 gate.
        assert!(tracker.ready_bundles(100).is_empty());
        assert_eq!(tracker.status("claim:x"), Some(PatternStatus::Accumulating));
    }

    #[test]
    fn absorbed_bundles_are_kept_for_the_application() {
        let mut tracker = PatternTracker::new(5, 0.6);
        tracker.absorb(PatternBundle {
            claim_hash: String::from("claim:remote"),
            stance: Stance::Strengthen,
            observations: 9,
            success_rate: 0.89,
            created_at: 1_000,
        });
        assert_eq!(tracker.absorbed().len(), 1);
        // Absorption does not touch local stats.
        assert!(tracker.status("claim:remote").is_none());
    }
}
