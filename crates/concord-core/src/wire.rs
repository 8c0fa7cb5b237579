//! Wire protocol.
//!
//! Every message is a flat JSON object carrying the envelope fields
//! (`type`, `from`, `ts`) alongside the payload for its type. Parsing is
//! forward-compatible: unknown fields are ignored, and a whole message of
//! unknown type is dropped rather than erroring — the mesh must survive
//! talking to newer versions of itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::PeerId;
use crate::pattern::PatternBundle;
use crate::signal::{Signal, Stance};
use crate::tstate::TState;

/// A complete wire message: envelope plus typed body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender.
    pub from: PeerId,

    /// Sender wall-clock milliseconds.
    pub ts: u64,

    /// Typed payload; the `type` tag lives inside the same JSON object.
    #[serde(flatten)]
    pub body: WireBody,
}

impl Envelope {
    /// Parses a raw JSON value, dropping unknown message types.
    #[must_use]
    pub fn parse(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Serializes to a raw JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("wire messages serialize")
    }
}

/// Message payloads, tagged by the wire `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireBody {
    /// Join announcement.
    #[serde(rename = "HELLO")]
    Hello {
        /// Peers the sender already knows. Liveness hint only.
        #[serde(rename = "knownPeers", default)]
        known_peers: Vec<PeerId>,
        /// Sender's degradation state, if it shares one.
        #[serde(rename = "tState", default)]
        t_state: Option<TState>,
    },

    /// Periodic liveness beacon.
    #[serde(rename = "HEARTBEAT")]
    Heartbeat {
        /// Sender's degradation state.
        #[serde(rename = "tState", default)]
        t_state: Option<TState>,
        /// Sender's self-reported confidence.
        #[serde(default)]
        confidence: Option<f64>,
    },

    /// Gossiped alive-peer list. Liveness hint only; no transitive trust.
    #[serde(rename = "PEER_LIST")]
    PeerList {
        /// Alive peers as the sender sees them.
        peers: Vec<PeerId>,
    },

    /// A belief signal in flight.
    #[serde(rename = "LEARNING_SIGNAL")]
    LearningSignal {
        /// The signed signal.
        signal: Signal,
    },

    /// Request for stance snapshots on a claim.
    #[serde(rename = "CHECKPOINT_REQ")]
    CheckpointReq {
        /// The polled claim.
        #[serde(rename = "claimHash")]
        claim_hash: String,
    },

    /// Point-to-point answer to a checkpoint request.
    #[serde(rename = "CHECKPOINT_RESP")]
    CheckpointResp {
        /// The polled claim.
        #[serde(rename = "claimHash")]
        claim_hash: String,
        /// Responder's stance (`unknown` when it holds no belief).
        stance: Stance,
        /// Responder's confidence (0 when it holds no belief).
        confidence: f64,
        /// Optional application meaning string.
        #[serde(default)]
        meaning: Option<String>,
    },

    /// Arbitration proposal announcement.
    #[serde(rename = "ARBITRATION_PROPOSAL")]
    ArbitrationProposal {
        /// Proposal id.
        #[serde(rename = "proposalId")]
        proposal_id: String,
        /// Claim under arbitration.
        #[serde(rename = "claimHash")]
        claim_hash: String,
        /// Options in proposal order.
        options: Vec<String>,
    },

    /// A vote on an open proposal.
    #[serde(rename = "ARBITRATION_VOTE")]
    ArbitrationVote {
        /// Proposal id.
        #[serde(rename = "proposalId")]
        proposal_id: String,
        /// Chosen option.
        option: String,
        /// Claimed weight; receivers cap it at the voter's influence.
        weight: f64,
    },

    /// Request for an authority window.
    #[serde(rename = "AUTHORITY_REQUEST")]
    AuthorityRequest {
        /// Request id, minted by the requester.
        #[serde(rename = "requestId")]
        request_id: String,
        /// Requested scope.
        scope: String,
        /// Stated reason.
        reason: String,
    },

    /// Grant answering an authority request.
    #[serde(rename = "AUTHORITY_GRANT")]
    AuthorityGrant {
        /// The answered request.
        #[serde(rename = "requestId")]
        request_id: String,
        /// Holder of the new window.
        peer: PeerId,
        /// Window expiry.
        #[serde(rename = "expiresAt")]
        expires_at: u64,
    },

    /// Denial answering an authority request.
    #[serde(rename = "AUTHORITY_DENY")]
    AuthorityDeny {
        /// The answered request.
        #[serde(rename = "requestId")]
        request_id: String,
        /// Denial code.
        reason: String,
    },

    /// Revocation notice for a peer's authority.
    #[serde(rename = "AUTHORITY_REVOKE")]
    AuthorityRevoke {
        /// Former holder.
        peer: PeerId,
        /// Why.
        reason: String,
    },

    /// A learning pattern bundle.
    #[serde(rename = "PATTERN_BUNDLE")]
    PatternBundle {
        /// The bundle.
        bundle: PatternBundle,
    },

    /// Notice that the sender quarantined a peer. Informational only.
    #[serde(rename = "QUARANTINE_NOTICE")]
    QuarantineNotice {
        /// The quarantined peer.
        #[serde(rename = "targetPeer")]
        target_peer: PeerId,
        /// Reported reason.
        reason: String,
    },
}
