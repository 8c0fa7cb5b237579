//! Configuration surface for the governance core.
//!
//! All tunables recognized by the core live on [`CoreConfig`]. Every field
//! has a production default; tests and operators override individual fields
//! or start from one of the named presets.

use serde::{Deserialize, Serialize};

/// Configuration for a governance node.
///
/// Durations are wall-clock milliseconds to match signal timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Authority window length granted at T0, before multipliers.
    pub base_authority_duration_ms: u64,

    /// How long a peer may sit in a hold before HOLD_TOO_LONG drift fires.
    pub hold_drift_threshold_ms: u64,

    /// Conflict score (and belief divergence) above which a claim is
    /// considered contested.
    pub belief_divergence_threshold: f64,

    /// Peer confidence below which CONFIDENCE_DECAY drift fires.
    pub confidence_drift_threshold: f64,

    /// Silence window for STALE_COMMS drift; also the unit of the T-state
    /// degradation ladder.
    pub stale_comms_threshold_ms: u64,

    /// Heartbeat broadcast cadence.
    pub heartbeat_interval_ms: u64,

    /// A peer silent for longer than this is marked not alive.
    pub peer_timeout_ms: u64,

    /// Peer set cap; oldest last-seen peers are evicted past this.
    pub max_peers: usize,

    /// Initial TTL stamped on locally built signals.
    pub default_ttl: u32,

    /// Dedup set cap; the most recent 90% are retained on overflow.
    pub max_seen_signals: usize,

    /// Minimum reputation score required to vote in arbitration.
    pub min_reputation_for_vote: f64,

    /// Influence floor for freshly admitted peers.
    pub new_peer_influence: f64,

    /// Observations required before a pattern bundle may be emitted.
    pub pattern_bundle_threshold: u32,

    /// Minimum success rate for a pattern bundle to be emitted.
    pub min_success_rate_for_bundle: f64,

    /// Base quarantine duration; doubles with each violation.
    pub quarantine_base_ms: u64,

    /// Pending checkpoint requests older than this are pruned.
    pub checkpoint_max_age_ms: u64,

    /// Open arbitration proposals older than this are pruned.
    pub proposal_max_age_ms: u64,

    /// Conflict records untouched for longer than this may be pruned.
    pub conflict_prune_horizon_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            base_authority_duration_ms: 60_000,
            hold_drift_threshold_ms: 3_000,
            belief_divergence_threshold: 0.6,
            confidence_drift_threshold: 0.3,
            stale_comms_threshold_ms: 5_000,
            heartbeat_interval_ms: 1_000,
            peer_timeout_ms: 4_000,
            max_peers: 32,
            default_ttl: 8,
            max_seen_signals: 50_000,
            min_reputation_for_vote: 0.2,
            new_peer_influence: 0.1,
            pattern_bundle_threshold: 5,
            min_success_rate_for_bundle: 0.6,
            quarantine_base_ms: 30_000,
            checkpoint_max_age_ms: 30_000,
            proposal_max_age_ms: 120_000,
            conflict_prune_horizon_ms: 600_000,
        }
    }
}

impl CoreConfig {
    /// Preset tuned for unit and scenario tests: short windows so clock
    /// advances stay small.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            base_authority_duration_ms: 60_000,
            quarantine_base_ms: 1_000,
            checkpoint_max_age_ms: 5_000,
            proposal_max_age_ms: 10_000,
            ..Self::default()
        }
    }

    /// Preset for high-latency deployments: wider liveness and staleness
    /// windows, larger peer set.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            stale_comms_threshold_ms: 15_000,
            heartbeat_interval_ms: 3_000,
            peer_timeout_ms: 12_000,
            max_peers: 64,
            ..Self::default()
        }
    }
}
