//! Swarm degradation ladder.
//!
//! The T-state is a node-wide singleton describing how degraded the node's
//! view of its peers is. It climbs with communication staleness, dips on
//! low peer confidence, and gates how much authority the node is willing
//! to hand out:
//!
//! ```text
//! T0  nominal            multiplier 1.0   grants allowed
//! T1  degraded           multiplier 0.7   grants allowed
//! T2  impaired           multiplier 0.4   grants blocked
//! T3  isolated           multiplier 0.1   grants blocked
//! T4  recontact          multiplier 1.0   grants allowed
//! ```
//!
//! T4 is entered deliberately (recontact protocol) from T2/T3 and exits to
//! T0; the staleness ladder never preempts it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::PeerId;

/// Node-wide degradation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TState {
    /// Nominal operation.
    T0,
    /// Mild degradation: stale or low-confidence observations.
    T1,
    /// Significant degradation; no new authority.
    T2,
    /// Near-total communication loss; no new authority.
    T3,
    /// Recontact in progress after T2/T3.
    T4,
}

impl TState {
    /// Authority duration multiplier for this state.
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::T0 | Self::T4 => 1.0,
            Self::T1 => 0.7,
            Self::T2 => 0.4,
            Self::T3 => 0.1,
        }
    }

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::T0 => "T0",
            Self::T1 => "T1",
            Self::T2 => "T2",
            Self::T3 => "T3",
            Self::T4 => "T4",
        }
    }
}

/// A completed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TStateChange {
    /// State before.
    pub from: TState,
    /// State after.
    pub to: TState,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    ts: u64,
    confidence: f64,
}

/// Holds the singleton state plus the peer observation map that drives it.
#[derive(Debug)]
pub struct TStateManager {
    state: TState,
    observations: HashMap<PeerId, Observation>,
    stale_threshold_ms: u64,
}

impl TStateManager {
    /// Creates a manager at T0.
    #[must_use]
    pub fn new(stale_threshold_ms: u64) -> Self {
        Self {
            state: TState::T0,
            observations: HashMap::new(),
            stale_threshold_ms,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TState {
        self.state
    }

    /// Records a peer observation.
    pub fn observe(&mut self, peer: &PeerId, ts: u64, confidence: f64) {
        self.observations.insert(
            peer.clone(),
            Observation {
                ts,
                confidence: confidence.clamp(0.0, 1.0),
            },
        );
    }

    /// Forgets a peer (evicted from membership).
    pub fn forget(&mut self, peer: &PeerId) {
        self.observations.remove(peer);
    }

    /// Recomputes the state from the staleness/confidence ladder.
    ///
    /// Returns the transition if the state changed. A node with no
    /// observations keeps its current state, and an in-progress recontact
    /// (T4) is never preempted.
    pub fn update(&mut self, now: u64) -> Option<TStateChange> {
        if self.state == TState::T4 || self.observations.is_empty() {
            return None;
        }

        let max_stale = self
            .observations
            .values()
            .map(|o| now.saturating_sub(o.ts))
            .max()
            .unwrap_or(0);
        let min_conf = self
            .observations
            .values()
            .map(|o| o.confidence)
            .fold(f64::INFINITY, f64::min);

        let next = if max_stale > 3 * self.stale_threshold_ms {
            TState::T3
        } else if max_stale > 2 * self.stale_threshold_ms {
            TState::T2
        } else if max_stale > self.stale_threshold_ms || min_conf < 0.5 {
            TState::T1
        } else {
            TState::T0
        };

        self.transition(next)
    }

    /// Forces a state, bypassing the ladder (tests and recontact paths).
    pub fn force(&mut self, state: TState) -> Option<TStateChange> {
        self.transition(state)
    }

    /// Begins recontact: T2/T3 → T4.
    ///
    /// Returns `None` when the current state does not allow recontact.
    pub fn initiate_recontact(&mut self) -> Option<TStateChange> {
        match self.state {
            TState::T2 | TState::T3 => self.transition(TState::T4),
            _ => None,
        }
    }

    /// Completes recontact: T4 → T0.
    pub fn complete_recontact(&mut self) -> Option<TStateChange> {
        match self.state {
            TState::T4 => self.transition(TState::T0),
            _ => None,
        }
    }

    /// Whether new authority windows may be granted in the current state.
    #[must_use]
    pub const fn can_grant_new_authority(&self) -> bool {
        matches!(self.state, TState::T0 | TState::T1 | TState::T4)
    }

    /// Whether pattern bundles may be propagated in the current state.
    #[must_use]
    pub const fn can_propagate_learning(&self) -> bool {
        matches!(self.state, TState::T0 | TState::T4)
    }

    fn transition(&mut self, next: TState) -> Option<TStateChange> {
        if next == self.state {
            return None;
        }
        let change = TStateChange {
            from: self.state,
            to: next,
        };
        self.state = next;
        tracing::info!(from = change.from.as_str(), to = change.to.as_str(), "t-state changed");
        Some(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    fn peer() -> PeerId {
        Keypair::generate().peer_id().clone()
    }

    fn manager() -> TStateManager {
        TStateManager::new(5_000)
    }

    #[test]
    fn fresh_confident_observations_hold_t0() {
        let mut m = manager();
        m.observe(&peer(), 1_000, 0.9);
        assert!(m.update(2_000).is_none());
        assert_eq!(m.state(), TState::T0);
    }

    #[test]
    fn staleness_ladder_climbs() {
        let mut m = manager();
        let p = peer();
        m.observe(&p, 0, 0.9);

        let change = m.update(5_001).expect("T0 -> T1");
        assert_eq!(change.to, TState::T1);

        let change = m.update(10_001).expect("T1 -> T2");
        assert_eq!(change.to, TState::T2);

        let change = m.update(15_001).expect("T2 -> T3");
        assert_eq!(change.to, TState::T3);
    }

    #[test]
    fn low_confidence_alone_degrades_to_t1() {
        let mut m = manager();
        m.observe(&peer(), 1_000, 0.3);

        let change = m.update(1_001).expect("confidence dip");
        assert_eq!(change.to, TState::T1);
    }

    #[test]
    fn recovery_descends_the_ladder() {
        let mut m = manager();
        let p = peer();
        m.observe(&p, 0, 0.9);
        m.update(15_001);
        assert_eq!(m.state(), TState::T3);

        m.observe(&p, 15_500, 0.9);
        let change = m.update(15_600).expect("recovery");
        assert_eq!(change.to, TState::T0);
    }

    #[test]
    fn recontact_flow() {
        let mut m = manager();
        let p = peer();
        m.observe(&p, 0, 0.9);
        m.update(11_000);
        assert_eq!(m.state(), TState::T2);

        assert!(m.initiate_recontact().is_some());
        assert_eq!(m.state(), TState::T4);
        // The ladder does not preempt recontact even while stale.
        assert!(m.update(60_000).is_none());
        assert_eq!(m.state(), TState::T4);

        assert!(m.complete_recontact().is_some());
        assert_eq!(m.state(), TState::T0);
    }

    #[test]
    fn recontact_requires_t2_or_t3() {
        let mut m = manager();
        assert!(m.initiate_recontact().is_none());
        assert!(m.complete_recontact().is_none());
        assert_eq!(m.state(), TState::T0);
    }

    #[test]
    fn gates_follow_the_table() {
        let mut m = manager();
        assert!(m.can_grant_new_authority());
        assert!(m.can_propagate_learning());

        m.force(TState::T1);
        assert!(m.can_grant_new_authority());
        assert!(!m.can_propagate_learning());

        m.force(TState::T2);
        assert!(!m.can_grant_new_authority());

        m.force(TState::T3);
        assert!(!m.can_grant_new_authority());

        m.force(TState::T4);
        assert!(m.can_grant_new_authority());
        assert!(m.can_propagate_learning());
    }

    #[test]
    fn multipliers_match_the_table() {
        assert!((TState::T0.multiplier() - 1.0).abs() < f64::EPSILON);
        assert!((TState::T1.multiplier() - 0.7).abs() < f64::EPSILON);
        assert!((TState::T2.multiplier() - 0.4).abs() < f64::EPSILON);
        assert!((TState::T3.multiplier() - 0.1).abs() < f64::EPSILON);
        assert!((TState::T4.multiplier() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_observation_set_keeps_current_state() {
        let mut m = manager();
        assert!(m.update(1_000_000).is_none());
        assert_eq!(m.state(), TState::T0);
    }
}
