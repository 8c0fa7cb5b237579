//! Peer membership and liveness.
//!
//! Tracks who is around, how fresh they are, and what they last advertised.
//! The manager is transport-free: `tick` returns a description of what the
//! node should send and who fell off, and the node composition does the
//! sending. PEER_LIST contents are a liveness hint only — listing a peer
//! never confers trust.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::PeerId;
use crate::tstate::TState;

/// Liveness state for one known peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerState {
    /// Last time anything was heard from or about this peer.
    pub last_seen: u64,

    /// Within the liveness window as of the last tick.
    pub alive: bool,

    /// Last self-reported confidence, 1.0 until the peer reports one.
    pub confidence: f64,

    /// Last advertised degradation state, if any.
    pub t_state: Option<TState>,
}

/// What a membership tick asks the node to do.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickEffects {
    /// Broadcast a HEARTBEAT now.
    pub send_heartbeat: bool,

    /// Broadcast a PEER_LIST with these alive peers now.
    pub peer_list: Option<Vec<PeerId>>,

    /// Peers evicted to honor the peer cap.
    pub evicted: Vec<PeerId>,

    /// `(peer, last_seen, confidence)` observations for the T-state
    /// manager.
    pub observations: Vec<(PeerId, u64, f64)>,
}

/// Bounded peer set with heartbeat/peer-list cadence.
#[derive(Debug)]
pub struct MembershipManager {
    peers: HashMap<PeerId, PeerState>,
    heartbeat_interval_ms: u64,
    peer_timeout_ms: u64,
    max_peers: usize,
    last_heartbeat_at: Option<u64>,
    last_peer_list_at: Option<u64>,
}

impl MembershipManager {
    /// Creates an empty membership manager.
    #[must_use]
    pub fn new(heartbeat_interval_ms: u64, peer_timeout_ms: u64, max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            heartbeat_interval_ms,
            peer_timeout_ms,
            max_peers,
            last_heartbeat_at: None,
            last_peer_list_at: None,
        }
    }

    /// Records that a peer was heard from (or about).
    ///
    /// `confidence` updates only when the peer reported one; a listing in
    /// somebody's PEER_LIST refreshes `last_seen` and nothing else.
    pub fn observe(&mut self, peer: &PeerId, confidence: Option<f64>, now: u64) {
        let state = self.peers.entry(peer.clone()).or_insert(PeerState {
            last_seen: now,
            alive: true,
            confidence: 1.0,
            t_state: None,
        });
        state.last_seen = state.last_seen.max(now);
        state.alive = true;
        if let Some(confidence) = confidence {
            state.confidence = confidence.clamp(0.0, 1.0);
        }
    }

    /// Records a peer's advertised degradation state.
    pub fn observe_t_state(&mut self, peer: &PeerId, t_state: TState, now: u64) {
        self.observe(peer, None, now);
        if let Some(state) = self.peers.get_mut(peer) {
            state.t_state = Some(t_state);
        }
    }

    /// Runs one membership tick.
    pub fn tick(&mut self, now: u64) -> TickEffects {
        let mut effects = TickEffects::default();

        if self
            .last_heartbeat_at
            .is_none_or(|last| now.saturating_sub(last) >= self.heartbeat_interval_ms)
        {
            self.last_heartbeat_at = Some(now);
            effects.send_heartbeat = true;
        }

        // Liveness before the peer list so the list only names live peers.
        for state in self.peers.values_mut() {
            state.alive = now.saturating_sub(state.last_seen) <= self.peer_timeout_ms;
        }

        if self
            .last_peer_list_at
            .is_none_or(|last| now.saturating_sub(last) >= 2 * self.heartbeat_interval_ms)
        {
            self.last_peer_list_at = Some(now);
            effects.peer_list = Some(self.alive_peers());
        }

        effects.observations = self
            .peers
            .iter()
            .map(|(peer, state)| (peer.clone(), state.last_seen, state.confidence))
            .collect();
        effects.observations.sort_by(|a, b| a.0.cmp(&b.0));

        while self.peers.len() > self.max_peers {
            let oldest = self
                .peers
                .iter()
                .min_by_key(|(peer, state)| (state.last_seen, (*peer).clone()))
                .map(|(peer, _)| peer.clone());
            let Some(peer) = oldest else { break };
            self.peers.remove(&peer);
            tracing::debug!(peer = %peer, "peer evicted to honor max_peers");
            effects.evicted.push(peer);
        }

        effects
    }

    /// Peers inside the liveness window as of the last tick, sorted for
    /// deterministic wire output.
    #[must_use]
    pub fn alive_peers(&self) -> Vec<PeerId> {
        let mut alive: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, state)| state.alive)
            .map(|(peer, _)| peer.clone())
            .collect();
        alive.sort();
        alive
    }

    /// State for a peer, if known.
    #[must_use]
    pub fn get(&self, peer: &PeerId) -> Option<&PeerState> {
        self.peers.get(peer)
    }

    /// Number of known peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peers are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
