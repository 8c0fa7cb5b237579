//! Stance checkpoints.
//!
//! When a claim looks contested, a node asks the swarm where everyone
//! stands. Requests are tracked per claim; responses accumulate until the
//! request ages out of the pending set.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::PeerId;
use crate::signal::Stance;

/// One peer's answer to a checkpoint request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointResponse {
    /// Responding peer.
    pub peer: PeerId,
    /// Its current stance, `unknown` when it holds no belief.
    pub stance: Stance,
    /// Its confidence, 0 when it holds no belief.
    pub confidence: f64,
    /// Optional application meaning string.
    pub meaning: String,
}

/// An outstanding checkpoint request.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCheckpoint {
    /// Request id carried on the wire.
    pub id: String,
    /// Claim being polled.
    pub claim_hash: String,
    /// When the request was broadcast.
    pub requested_at: u64,
    /// Responses received so far, in arrival order.
    pub responses: Vec<CheckpointResponse>,
}

/// Tracks pending checkpoint requests, one per claim.
#[derive(Debug)]
pub struct CheckpointTracker {
    pending: HashMap<String, PendingCheckpoint>,
    max_age_ms: u64,
}

impl CheckpointTracker {
    /// Creates a tracker with the given prune horizon.
    #[must_use]
    pub fn new(max_age_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            max_age_ms,
        }
    }

    /// Opens (or reopens) a request for a claim, returning its id.
    ///
    /// A re-request replaces the prior pending entry and drops its
    /// responses.
    pub fn request(&mut self, claim_hash: &str, now: u64) -> String {
        let id = Uuid::new_v4().to_string();
        self.pending.insert(
            claim_hash.to_owned(),
            PendingCheckpoint {
                id: id.clone(),
                claim_hash: claim_hash.to_owned(),
                requested_at: now,
                responses: Vec::new(),
            },
        );
        id
    }

    /// Records a response if a request for the claim is still pending.
    ///
    /// Returns `true` when the response was attached. Unsolicited
    /// responses return `false`; the caller may still feed them to the
    /// conflict accumulator as plain observations.
    pub fn on_response(&mut self, claim_hash: &str, response: CheckpointResponse) -> bool {
        match self.pending.get_mut(claim_hash) {
            None => false,
            Some(pending) => {
                pending.responses.push(response);
                true
            },
        }
    }

    /// Pending request for a claim, if any.
    #[must_use]
    pub fn get(&self, claim_hash: &str) -> Option<&PendingCheckpoint> {
        self.pending.get(claim_hash)
    }

    /// Drops requests older than the horizon, returning the pruned claims.
    pub fn prune(&mut self, now: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .pending
            .values()
            .filter(|p| now.saturating_sub(p.requested_at) > self.max_age_ms)
            .map(|p| p.claim_hash.clone())
            .collect();
        for claim in &expired {
            self.pending.remove(claim);
        }
        expired
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no requests are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    fn response(stance: Stance, confidence: f64) -> CheckpointResponse {
        CheckpointResponse {
            peer: Keypair::generate().peer_id().clone(),
            stance,
            confidence,
            meaning: String::new(),
        }
    }

    #[test]
    fn responses_accumulate_on_the_pending_request() {
        let mut tracker = CheckpointTracker::new(30_000);
        tracker.request("claim:x", 1_000);

        assert!(tracker.on_response("claim:x", response(Stance::Strengthen, 0.8)));
        assert!(tracker.on_response("claim:x", response(Stance::Weaken, 0.5)));
        assert_eq!(tracker.get("claim:x").unwrap().responses.len(), 2);
    }

    #[test]
    fn unsolicited_responses_are_not_attached() {
        let mut tracker = CheckpointTracker::new(30_000);
        assert!(!tracker.on_response("claim:x", response(Stance::Unknown, 0.0)));
    }

    #[test]
    fn rerequest_replaces_and_clears_responses() {
        let mut tracker = CheckpointTracker::new(30_000);
        let first = tracker.request("claim:x", 1_000);
        tracker.on_response("claim:x", response(Stance::Strengthen, 0.8));

        let second = tracker.request("claim:x", 2_000);
        assert_ne!(first, second);
        assert!(tracker.get("claim:x").unwrap().responses.is_empty());
    }

    #[test]
    fn prune_drops_aged_requests() {
        let mut tracker = CheckpointTracker::new(30_000);
        tracker.request("claim:old", 0);
        tracker.request("claim:new", 25_000);

        let pruned = tracker.prune(31_000);
        assert_eq!(pruned, vec![String::from("claim:old")]);
        assert!(tracker.get("claim:old").is_none());
        assert!(tracker.get("claim:new").is_some());
    }
}
