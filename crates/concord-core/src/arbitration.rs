//! Reputation-weighted arbitration.
//!
//! A contested claim gets a proposal with a fixed option list; peers vote
//! their stance and the tally weighs each vote by the voter's influence.
//! Two properties make this resistant to gaming:
//!
//! - **anti-inflation**: a vote's effective weight is
//!   `min(claimed_weight, current_influence)` — claiming more than you
//!   have does nothing, and influence lost *after* voting caps the vote
//!   retroactively at tally time;
//! - **quarantine zeroing**: votes from peers quarantined at tally time
//!   count for nothing, even though they were recorded.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::PeerId;
use crate::quarantine::QuarantineList;
use crate::reputation::ReputationLedger;

/// Proposal lifecycle. `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    /// Accepting votes.
    Open,
    /// Tallied; winner recorded.
    Resolved,
}

/// One recorded vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Who voted.
    pub voter: PeerId,
    /// Chosen option.
    pub option: String,
    /// Weight as recorded (already capped at record time).
    pub weight: f64,
    /// When the vote landed.
    pub cast_at: u64,
}

/// An arbitration proposal over a contested claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique id carried on the wire.
    pub id: String,
    /// Claim under arbitration.
    pub claim_hash: String,
    /// Options in proposal order; index order breaks ties.
    pub options: Vec<String>,
    /// Who opened the proposal.
    pub proposer: PeerId,
    /// When it was opened.
    pub opened_at: u64,
    /// Lifecycle status.
    pub status: ProposalStatus,
    /// Winning option once resolved.
    pub winner: Option<String>,
    /// Latest vote per voter; a re-vote overwrites.
    pub votes: HashMap<PeerId, Vote>,
}

/// Why a vote was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteRejection {
    /// No proposal with that id.
    UnknownProposal,
    /// Proposal already resolved.
    ProposalResolved,
    /// Option not in the proposal's list.
    UnknownOption,
    /// Voter is quarantined.
    VoterQuarantined,
    /// Voter below the reputation gate.
    InsufficientReputation,
}

impl VoteRejection {
    /// Short code for logs and audit entries.
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::UnknownProposal => "UNKNOWN_PROPOSAL",
            Self::ProposalResolved => "PROPOSAL_RESOLVED",
            Self::UnknownOption => "UNKNOWN_OPTION",
            Self::VoterQuarantined => "VOTER_QUARANTINED",
            Self::InsufficientReputation => "INSUFFICIENT_REPUTATION",
        }
    }
}

/// Result of a tally.
#[derive(Debug, Clone, PartialEq)]
pub struct TallyResult {
    /// Winning option.
    pub winner: String,
    /// Final weight per option, in proposal option order.
    pub scores: Vec<(String, f64)>,
    /// Claim the proposal was about.
    pub claim_hash: String,
}

/// Holds open and resolved proposals.
#[derive(Debug)]
pub struct ArbitrationManager {
    proposals: HashMap<String, Proposal>,
    max_age_ms: u64,
}

impl ArbitrationManager {
    /// Creates a manager; open proposals older than `max_age_ms` are
    /// pruned.
    #[must_use]
    pub fn new(max_age_ms: u64) -> Self {
        Self {
            proposals: HashMap::new(),
            max_age_ms,
        }
    }

    /// Opens a proposal and returns its id.
    pub fn propose(
        &mut self,
        claim_hash: &str,
        options: Vec<String>,
        proposer: &PeerId,
        now: u64,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        self.register(&id, claim_hash, options, proposer, now);
        id
    }

    /// Registers a proposal announced by another node under its wire id.
    ///
    /// Re-announcements of a known id are ignored.
    pub fn register(
        &mut self,
        id: &str,
        claim_hash: &str,
        options: Vec<String>,
        proposer: &PeerId,
        now: u64,
    ) {
        self.proposals
            .entry(id.to_owned())
            .or_insert_with(|| Proposal {
                id: id.to_owned(),
                claim_hash: claim_hash.to_owned(),
                options,
                proposer: proposer.clone(),
                opened_at: now,
                status: ProposalStatus::Open,
                winner: None,
                votes: HashMap::new(),
            });
    }

    /// Records a vote, capping the claimed weight at the voter's current
    /// influence.
    ///
    /// A repeat vote from the same peer overwrites its prior vote.
    ///
    /// # Errors
    ///
    /// Returns the gate that stopped the vote; the proposal is unchanged.
    pub fn record_vote(
        &mut self,
        proposal_id: &str,
        voter: &PeerId,
        option: &str,
        claimed_weight: f64,
        reputation: &ReputationLedger,
        quarantine: &QuarantineList,
        now: u64,
    ) -> Result<f64, VoteRejection> {
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or(VoteRejection::UnknownProposal)?;
        if proposal.status == ProposalStatus::Resolved {
            return Err(VoteRejection::ProposalResolved);
        }
        if !proposal.options.iter().any(|o| o == option) {
            return Err(VoteRejection::UnknownOption);
        }
        if quarantine.is_quarantined(voter, now) {
            return Err(VoteRejection::VoterQuarantined);
        }
        if !reputation.can_vote(voter) {
            return Err(VoteRejection::InsufficientReputation);
        }

        let weight = claimed_weight.min(reputation.get_influence(voter)).max(0.0);
        proposal.votes.insert(
            voter.clone(),
            Vote {
                voter: voter.clone(),
                option: option.to_owned(),
                weight,
                cast_at: now,
            },
        );
        Ok(weight)
    }

    /// Tallies a proposal and marks it resolved.
    ///
    /// Returns `None` for unknown or already-resolved proposals. The
    /// caller is responsible for resolving the claim's conflict record
    /// and announcing the outcome.
    pub fn tally(
        &mut self,
        proposal_id: &str,
        reputation: &ReputationLedger,
        quarantine: &QuarantineList,
        now: u64,
    ) -> Option<TallyResult> {
        let proposal = self.proposals.get_mut(proposal_id)?;
        if proposal.status == ProposalStatus::Resolved {
            return None;
        }

        let mut scores: Vec<(String, f64)> = proposal
            .options
            .iter()
            .map(|o| (o.clone(), 0.0))
            .collect();
        for vote in proposal.votes.values() {
            if quarantine.is_quarantined(&vote.voter, now) {
                tracing::debug!(voter = %vote.voter, "vote ignored: voter quarantined at tally");
                continue;
            }
            let effective = vote.weight.min(reputation.get_influence(&vote.voter));
            if let Some(entry) = scores.iter_mut().find(|(o, _)| o == &vote.option) {
                entry.1 += effective;
            }
        }

        // Argmax with ties going to the earliest option index: strict
        // greater-than while scanning in proposal order.
        let mut winner_index = 0;
        for (i, (_, score)) in scores.iter().enumerate() {
            if *score > scores[winner_index].1 {
                winner_index = i;
            }
        }
        let winner = scores[winner_index].0.clone();

        proposal.status = ProposalStatus::Resolved;
        proposal.winner = Some(winner.clone());
        tracing::info!(
            proposal = proposal_id,
            claim = %proposal.claim_hash,
            winner = %winner,
            "arbitration resolved"
        );

        Some(TallyResult {
            winner,
            scores,
            claim_hash: proposal.claim_hash.clone(),
        })
    }

    /// Proposal by id, if known.
    #[must_use]
    pub fn get(&self, proposal_id: &str) -> Option<&Proposal> {
        self.proposals.get(proposal_id)
    }

    /// Drops open proposals older than the horizon; resolved proposals
    /// are kept as a record.
    pub fn prune(&mut self, now: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .proposals
            .values()
            .filter(|p| {
                p.status == ProposalStatus::Open
                    && now.saturating_sub(p.opened_at) > self.max_age_ms
            })
            .map(|p| p.id.clone())
            .collect();
        for id in &expired {
            self.proposals.remove(id);
        }
        expired
    }

    /// Number of tracked proposals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    /// Whether no proposals are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    struct Fixture {
        arbitration: ArbitrationManager,
        reputation: ReputationLedger,
        quarantine: QuarantineList,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                arbitration: ArbitrationManager::new(120_000),
                reputation: ReputationLedger::new(0.1, 0.2),
                quarantine: QuarantineList::new(60_000),
            }
        }

        fn voter_with_score(&mut self, consistency_ticks: u32) -> PeerId {
            let peer = Keypair::generate().peer_id().clone();
            for tick in 0..consistency_ticks {
                self.reputation.record_consistency(&peer, u64::from(tick));
            }
            peer
        }

        fn options() -> Vec<String> {
            vec![
                String::from("strengthen"),
                String::from("weaken"),
                String::from("retract"),
            ]
        }
    }

    #[test]
    fn vote_weight_is_capped_at_current_influence() {
        let mut fx = Fixture::new();
        let proposer = Keypair::generate().peer_id().clone();
        let id = fx
            .arbitration
            .propose("claim:x", Fixture::options(), &proposer, 0);
        let voter = fx.voter_with_score(40);

        let influence = fx.reputation.get_influence(&voter);
        let recorded = fx
            .arbitration
            .record_vote(&id, &voter, "strengthen", 99.0, &fx.reputation, &fx.quarantine, 10)
            .expect("vote records");
        assert!((recorded - influence).abs() < 1e-9);
    }

    #[test]
    fn low_reputation_and_quarantined_voters_are_refused() {
        let mut fx = Fixture::new();
        let proposer = Keypair::generate().peer_id().clone();
        let id = fx
            .arbitration
            .propose("claim:x", Fixture::options(), &proposer, 0);

        let fresh = Keypair::generate().peer_id().clone();
        assert_eq!(
            fx.arbitration.record_vote(
                &id, &fresh, "weaken", 0.1, &fx.reputation, &fx.quarantine, 10
            ),
            Err(VoteRejection::InsufficientReputation)
        );

        let jailed = fx.voter_with_score(40);
        fx.quarantine.quarantine(&jailed, "test", 0);
        assert_eq!(
            fx.arbitration.record_vote(
                &id, &jailed, "weaken", 0.1, &fx.reputation, &fx.quarantine, 10
            ),
            Err(VoteRejection::VoterQuarantined)
        );
    }

    #[test]
    fn revote_overwrites_prior_vote() {
        let mut fx = Fixture::new();
        let proposer = Keypair::generate().peer_id().clone();
        let id = fx
            .arbitration
            .propose("claim:x", Fixture::options(), &proposer, 0);
        let voter = fx.voter_with_score(40);

        fx.arbitration
            .record_vote(&id, &voter, "strengthen", 1.0, &fx.reputation, &fx.quarantine, 10)
            .unwrap();
        fx.arbitration
            .record_vote(&id, &voter, "weaken", 1.0, &fx.reputation, &fx.quarantine, 20)
            .unwrap();

        let result = fx
            .arbitration
            .tally(&id, &fx.reputation, &fx.quarantine, 30)
            .expect("tallies");
        assert_eq!(result.winner, "weaken");
        let strengthen_score = result.scores.iter().find(|(o, _)| o == "strengthen").unwrap().1;
        assert!((strengthen_score - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn quarantine_after_voting_zeroes_the_vote_at_tally() {
        let mut fx = Fixture::new();
        let proposer = Keypair::generate().peer_id().clone();
        let id = fx
            .arbitration
            .propose("claim:x", Fixture::options(), &proposer, 0);
        let voter = fx.voter_with_score(40);

        fx.arbitration
            .record_vote(&id, &voter, "weaken", 1.0, &fx.reputation, &fx.quarantine, 10)
            .unwrap();
        fx.quarantine.quarantine(&voter, "post-vote offense", 20);

        let result = fx
            .arbitration
            .tally(&id, &fx.reputation, &fx.quarantine, 30)
            .expect("tallies");
        for (_, score) in &result.scores {
            assert!((score - 0.0).abs() < f64::EPSILON);
        }
        // All-zero scores: earliest option index wins deterministically.
        assert_eq!(result.winner, "strengthen");
    }

    #[test]
    fn ties_break_toward_the_earliest_option() {
        let mut fx = Fixture::new();
        let proposer = Keypair::generate().peer_id().clone();
        let id = fx
            .arbitration
            .propose("claim:x", Fixture::options(), &proposer, 0);

        let a = fx.voter_with_score(40);
        let b = fx.voter_with_score(40);
        fx.arbitration
            .record_vote(&id, &a, "weaken", 1.0, &fx.reputation, &fx.quarantine, 10)
            .unwrap();
        fx.arbitration
            .record_vote(&id, &b, "retract", 1.0, &fx.reputation, &fx.quarantine, 10)
            .unwrap();

        let result = fx
            .arbitration
            .tally(&id, &fx.reputation, &fx.quarantine, 30)
            .expect("tallies");
        // weaken and retract tie; weaken sits at the earlier index.
        assert_eq!(result.winner, "weaken");
    }

    #[test]
    fn resolved_proposals_refuse_votes_and_retallies() {
        let mut fx = Fixture::new();
        let proposer = Keypair::generate().peer_id().clone();
        let id = fx
            .arbitration
            .propose("claim:x", Fixture::options(), &proposer, 0);
        fx.arbitration
            .tally(&id, &fx.reputation, &fx.quarantine, 10)
            .expect("first tally");

        let voter = fx.voter_with_score(40);
        assert_eq!(
            fx.arbitration.record_vote(
                &id, &voter, "weaken", 1.0, &fx.reputation, &fx.quarantine, 20
            ),
            Err(VoteRejection::ProposalResolved)
        );
        assert!(fx
            .arbitration
            .tally(&id, &fx.reputation, &fx.quarantine, 20)
            .is_none());
    }

    #[test]
    fn unknown_lookups_are_no_ops() {
        let mut fx = Fixture::new();
        let voter = fx.voter_with_score(40);
        assert_eq!(
            fx.arbitration.record_vote(
                "missing", &voter, "weaken", 1.0, &fx.reputation, &fx.quarantine, 0
            ),
            Err(VoteRejection::UnknownProposal)
        );
        assert!(fx
            .arbitration
            .tally("missing", &fx.reputation, &fx.quarantine, 0)
            .is_none());
    }

    #[test]
    fn prune_drops_only_stale_open_proposals() {
        let mut fx = Fixture::new();
        let proposer = Keypair::generate().peer_id().clone();
        let stale = fx
            .arbitration
            .propose("claim:a", Fixture::options(), &proposer, 0);
        let resolved = fx
            .arbitration
            .propose("claim:b", Fixture::options(), &proposer, 0);
        fx.arbitration
            .tally(&resolved, &fx.reputation, &fx.quarantine, 10)
            .unwrap();

        let pruned = fx.arbitration.prune(200_000);
        assert_eq!(pruned, vec![stale]);
        assert!(fx.arbitration.get(&resolved).is_some());
    }
}
