//! Drift detection.
//!
//! Four independent triggers, evaluated per peer in a fixed order so the
//! reported reason is deterministic:
//!
//! 1. HOLD_TOO_LONG — the peer has sat in a hold past the threshold;
//! 2. STALE_COMMS — nothing heard within the staleness window;
//! 3. CONFIDENCE_DECAY — reported confidence fell below the floor;
//! 4. BELIEF_DIVERGENCE — the peer's stances drifted from local consensus.
//!
//! A peer triggers at most once until explicitly reset; the authority
//! manager subscribes to the resulting events and revokes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::PeerId;
use crate::signal::Stance;

/// Which trigger fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftReason {
    /// Hold exceeded the hold threshold.
    HoldTooLong,
    /// Communications exceeded the staleness threshold.
    StaleComms,
    /// Confidence fell below the decay floor.
    ConfidenceDecay,
    /// Beliefs diverged from local consensus past the threshold.
    BeliefDivergence,
}

impl DriftReason {
    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HoldTooLong => "HOLD_TOO_LONG",
            Self::StaleComms => "STALE_COMMS",
            Self::ConfidenceDecay => "CONFIDENCE_DECAY",
            Self::BeliefDivergence => "BELIEF_DIVERGENCE",
        }
    }
}

/// A drift trigger firing for one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftEvent {
    /// The drifting peer.
    pub peer: PeerId,
    /// Which trigger fired.
    pub reason: DriftReason,
    /// Human-readable detail (measured value vs threshold).
    pub detail: String,
    /// When detection ran.
    pub detected_at: u64,
}

/// Thresholds for the four triggers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftThresholds {
    /// HOLD_TOO_LONG limit.
    pub hold_ms: u64,
    /// STALE_COMMS limit.
    pub stale_comms_ms: u64,
    /// CONFIDENCE_DECAY floor.
    pub confidence_floor: f64,
    /// BELIEF_DIVERGENCE limit.
    pub divergence: f64,
}

#[derive(Debug, Clone)]
struct PeerDriftState {
    hold_start: Option<u64>,
    last_comms: u64,
    confidence: f64,
    beliefs: HashMap<String, (Stance, f64)>,
    drift_score: f64,
    triggered: bool,
}

impl Default for PeerDriftState {
    fn default() -> Self {
        Self {
            hold_start: None,
            last_comms: 0,
            // Optimistic until the peer reports one; a zero start would
            // trip CONFIDENCE_DECAY before the first heartbeat lands.
            confidence: 1.0,
            beliefs: HashMap::new(),
            drift_score: 0.0,
            triggered: false,
        }
    }
}

/// Tracks per-peer drift state and evaluates the triggers.
#[derive(Debug)]
pub struct DriftDetector {
    peers: HashMap<PeerId, PeerDriftState>,
    thresholds: DriftThresholds,
}

impl DriftDetector {
    /// Creates a detector with the given thresholds.
    #[must_use]
    pub fn new(thresholds: DriftThresholds) -> Self {
        Self {
            peers: HashMap::new(),
            thresholds,
        }
    }

    /// Records that a peer was heard from, with an optional self-reported
    /// confidence.
    pub fn note_comms(&mut self, peer: &PeerId, confidence: Option<f64>, now: u64) {
        let state = self.state_mut(peer);
        state.last_comms = state.last_comms.max(now);
        if let Some(confidence) = confidence {
            state.confidence = confidence.clamp(0.0, 1.0);
        }
    }

    /// Marks the start of a hold for a peer.
    pub fn begin_hold(&mut self, peer: &PeerId, now: u64) {
        let state = self.state_mut(peer);
        if state.hold_start.is_none() {
            state.hold_start = Some(now);
        }
    }

    /// Clears a peer's hold.
    pub fn end_hold(&mut self, peer: &PeerId) {
        self.state_mut(peer).hold_start = None;
    }

    /// Records a peer's stance on a claim.
    pub fn observe_belief(&mut self, peer: &PeerId, claim_hash: &str, stance: Stance, confidence: f64) {
        self.state_mut(peer)
            .beliefs
            .insert(claim_hash.to_owned(), (stance, confidence.clamp(0.0, 1.0)));
    }

    /// Rearms a peer so it can trigger again.
    pub fn reset(&mut self, peer: &PeerId) {
        if let Some(state) = self.peers.get_mut(peer) {
            state.triggered = false;
        }
    }

    /// Forgets a peer entirely.
    pub fn forget(&mut self, peer: &PeerId) {
        self.peers.remove(peer);
    }

    /// Last computed divergence score for a peer.
    #[must_use]
    pub fn drift_score(&self, peer: &PeerId) -> f64 {
        self.peers.get(peer).map_or(0.0, |s| s.drift_score)
    }

    /// Evaluates every non-triggered peer against local consensus.
    ///
    /// At most one event per peer per call: the first condition in the
    /// fixed order wins and the peer stays triggered until [`Self::reset`].
    pub fn check(
        &mut self,
        consensus: &HashMap<String, (Stance, f64)>,
        now: u64,
    ) -> Vec<DriftEvent> {
        let thresholds = self.thresholds;
        let mut events = Vec::new();

        let mut peer_ids: Vec<PeerId> = self.peers.keys().cloned().collect();
        peer_ids.sort();

        for peer in peer_ids {
            let state = self.peers.get_mut(&peer).expect("known key");
            if state.triggered {
                continue;
            }

            let fired = hold_trigger(state, thresholds.hold_ms, now)
                .or_else(|| stale_trigger(state, thresholds.stale_comms_ms, now))
                .or_else(|| confidence_trigger(state, thresholds.confidence_floor))
                .or_else(|| divergence_trigger(state, consensus, thresholds.divergence));

            if let Some((reason, detail)) = fired {
                state.triggered = true;
                tracing::warn!(peer = %peer, reason = reason.as_str(), detail = %detail, "drift detected");
                events.push(DriftEvent {
                    peer: peer.clone(),
                    reason,
                    detail,
                    detected_at: now,
                });
            }
        }
        events
    }

    fn state_mut(&mut self, peer: &PeerId) -> &mut PeerDriftState {
        self.peers.entry(peer.clone()).or_default()
    }
}

fn hold_trigger(
    state: &PeerDriftState,
    hold_ms: u64,
    now: u64,
) -> Option<(DriftReason, String)> {
    let start = state.hold_start?;
    let held = now.saturating_sub(start);
    (held > hold_ms).then(|| {
        (
            DriftReason::HoldTooLong,
            format!("held {held}ms > {hold_ms}ms"),
        )
    })
}

fn stale_trigger(
    state: &PeerDriftState,
    stale_ms: u64,
    now: u64,
) -> Option<(DriftReason, String)> {
    let silent = now.saturating_sub(state.last_comms);
    (silent > stale_ms).then(|| {
        (
            DriftReason::StaleComms,
            format!("silent {silent}ms > {stale_ms}ms"),
        )
    })
}

fn confidence_trigger(state: &PeerDriftState, floor: f64) -> Option<(DriftReason, String)> {
    (state.confidence < floor).then(|| {
        (
            DriftReason::ConfidenceDecay,
            format!("confidence {:.3} < {floor:.3}", state.confidence),
        )
    })
}

/// Mean divergence over claims shared with consensus: 1.0 per opposed
/// stance pair, `|Δconfidence|` otherwise.
fn divergence_trigger(
    state: &mut PeerDriftState,
    consensus: &HashMap<String, (Stance, f64)>,
    threshold: f64,
) -> Option<(DriftReason, String)> {
    let mut total = 0.0;
    let mut shared = 0_u32;
    for (claim, (local_stance, local_conf)) in consensus {
        let Some((peer_stance, peer_conf)) = state.beliefs.get(claim) else {
            continue;
        };
        shared += 1;
        let opposed = peer_stance != local_stance
            && *peer_stance != Stance::Unknown
            && *local_stance != Stance::Unknown;
        if opposed {
            total += 1.0;
        } else {
            total += (peer_conf - local_conf).abs();
        }
    }
    if shared == 0 {
        state.drift_score = 0.0;
        return None;
    }

    let score = total / f64::from(shared);
    state.drift_score = score;
    (score > threshold).then(|| {
        (
            DriftReason::BeliefDivergence,
            format!("divergence {score:.3} > {threshold:.3} over {shared} claims"),
        )
    })
}
