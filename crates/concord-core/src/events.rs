//! Typed event stream.
//!
//! The components never call back into each other; everything observable
//! surfaces as a [`CoreEvent`] queued by the node reducer and drained by
//! the application. This keeps the revocation cascade (drift → revoke →
//! quarantine → violation) a straight line instead of a re-entrant web.

use crate::admission::AdmissionDenial;
use crate::authority::AuthorityWindow;
use crate::checkpoint::CheckpointResponse;
use crate::drift::DriftEvent;
use crate::identity::PeerId;
use crate::pattern::PatternBundle;
use crate::propagation::RejectReason;
use crate::signal::Signal;
use crate::tstate::TStateChange;

/// Everything a node can tell the application about.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CoreEvent {
    /// A signal passed the ingest pipeline.
    SignalAccepted {
        /// The accepted signal.
        signal: Signal,
        /// The peer that relayed it.
        from: PeerId,
    },
    /// A signal was rejected for cause (duplicates stay silent).
    SignalRejected {
        /// The relaying peer.
        from: PeerId,
        /// Why it was dropped.
        reason: RejectReason,
    },
    /// A claim's conflict score crossed the divergence threshold.
    ConflictDetected {
        /// The contested claim.
        claim_hash: String,
        /// Score at detection.
        score: f64,
    },
    /// A claim's conflict record was cleared.
    ConflictResolved {
        /// The claim.
        claim_hash: String,
    },
    /// A checkpoint response arrived.
    CheckpointResponse {
        /// The polled claim.
        claim_hash: String,
        /// The response.
        response: CheckpointResponse,
    },
    /// An arbitration proposal is open.
    ProposalOpened {
        /// Proposal id.
        proposal_id: String,
        /// Claim under arbitration.
        claim_hash: String,
    },
    /// An arbitration proposal resolved.
    ProposalResolved {
        /// Proposal id.
        proposal_id: String,
        /// Claim under arbitration.
        claim_hash: String,
        /// Winning option.
        winner: String,
    },
    /// A vote was refused by a gate.
    VoteIgnored {
        /// Proposal id.
        proposal_id: String,
        /// The refused voter.
        voter: PeerId,
        /// Gate code (see `VoteRejection::as_code`).
        reason: &'static str,
    },
    /// An authority window was granted by this node.
    AuthorityGranted {
        /// The granted window.
        window: AuthorityWindow,
    },
    /// An authority request was denied.
    AuthorityDenied {
        /// The requesting peer, when known.
        peer: Option<PeerId>,
        /// Denial code.
        reason: &'static str,
    },
    /// An authority window expired.
    AuthorityExpired {
        /// The expired window.
        window: AuthorityWindow,
    },
    /// An authority window was revoked.
    AuthorityRevoked {
        /// The former holder.
        peer: PeerId,
        /// Why.
        reason: String,
    },
    /// Another node granted authority to this node.
    GrantReceived {
        /// The request this grant answers.
        request_id: String,
        /// When the granted window expires.
        expires_at: u64,
    },
    /// A drift trigger fired.
    DriftTriggered(DriftEvent),
    /// The node's T-state changed.
    TStateChanged(TStateChange),
    /// A peer was quarantined by this node.
    PeerQuarantined {
        /// The isolated peer.
        peer: PeerId,
        /// Why.
        reason: String,
        /// When the isolation ends.
        expires_at: u64,
    },
    /// A quarantine ran out.
    QuarantineReleased {
        /// The released peer.
        peer: PeerId,
    },
    /// Another node reported quarantining someone. Liveness hint only.
    QuarantineNotice {
        /// The reported target.
        target: PeerId,
        /// Reported reason.
        reason: String,
        /// Who reported it.
        from: PeerId,
    },
    /// A peer was refused admission.
    AdmissionDenied {
        /// The refused peer.
        peer: PeerId,
        /// Denial reason.
        reason: AdmissionDenial,
    },
    /// A peer fell out of the bounded peer set.
    PeerEvicted {
        /// The evicted peer.
        peer: PeerId,
    },
    /// A local pattern bundle went out.
    PatternEmitted {
        /// The bundle.
        bundle: PatternBundle,
    },
    /// A pattern bundle arrived from a peer.
    PatternAbsorbed {
        /// The bundle.
        bundle: PatternBundle,
        /// Who sent it.
        from: PeerId,
    },
    /// Beliefs were rolled back to a snapshot.
    RolledBack {
        /// Label of the restored snapshot.
        label: String,
    },
}
