//! Per-node composition.
//!
//! A [`Node`] owns one instance of every subsystem and is the only thing
//! that touches the transport. All mutation happens on two entry points —
//! [`Node::handle_envelope`] for incoming messages and [`Node::tick`] for
//! time — so each node is logically single-threaded: one message or one
//! tick at a time, applied atomically across propagation, beliefs,
//! conflict, and audit.
//!
//! Cross-component reactions run as straight-line code here rather than
//! callbacks. The revocation cascade in particular is explicit: a drift
//! trigger revokes authority, the revocation quarantines, and the
//! quarantine records a reputation violation — in that order, once.

use std::collections::VecDeque;

use serde_json::json;

use crate::admission::AdmissionController;
use crate::arbitration::{ArbitrationManager, TallyResult, VoteRejection};
use crate::audit::{AuditLog, LogKind};
use crate::authority::{AuthorityDenial, AuthorityManager, AuthorityWindow};
use crate::belief::BeliefStore;
use crate::checkpoint::{CheckpointResponse, CheckpointTracker};
use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::conflict::ConflictAccumulator;
use crate::drift::{DriftDetector, DriftThresholds};
use crate::events::CoreEvent;
use crate::identity::{Keypair, PeerId};
use crate::membership::MembershipManager;
use crate::pattern::PatternTracker;
use crate::propagation::{Disposition, Propagator, PublishError};
use crate::quarantine::QuarantineList;
use crate::reputation::ReputationLedger;
use crate::rollback::RollbackBuffer;
use crate::signal::{Direction, Signal, SignalBuilder, Stance};
use crate::transport::Transport;
use crate::tstate::{TState, TStateChange, TStateManager};
use crate::wire::{Envelope, WireBody};

/// One governance node: the composition of all subsystems over a
/// transport and a clock.
pub struct Node<T: Transport, C: Clock> {
    config: CoreConfig,
    keypair: Keypair,
    transport: T,
    clock: C,
    next_signal_id: u64,
    self_confidence: f64,

    membership: MembershipManager,
    propagation: Propagator,
    beliefs: BeliefStore,
    conflicts: ConflictAccumulator,
    checkpoints: CheckpointTracker,
    arbitration: ArbitrationManager,
    reputation: ReputationLedger,
    quarantine: QuarantineList,
    tstate: TStateManager,
    authority: AuthorityManager,
    drift: DriftDetector,
    patterns: PatternTracker,
    rollback: RollbackBuffer,
    admission: AdmissionController,
    audit: AuditLog,
    events: VecDeque<CoreEvent>,
}

impl<T: Transport, C: Clock> Node<T, C> {
    /// Builds a node from its collaborators.
    #[must_use]
    pub fn new(config: CoreConfig, keypair: Keypair, transport: T, clock: C) -> Self {
        let drift_thresholds = DriftThresholds {
            hold_ms: config.hold_drift_threshold_ms,
            stale_comms_ms: config.stale_comms_threshold_ms,
            confidence_floor: config.confidence_drift_threshold,
            divergence: config.belief_divergence_threshold,
        };
        Self {
            membership: MembershipManager::new(
                config.heartbeat_interval_ms,
                config.peer_timeout_ms,
                config.max_peers,
            ),
            propagation: Propagator::new(config.max_seen_signals),
            beliefs: BeliefStore::new(),
            conflicts: ConflictAccumulator::new(config.belief_divergence_threshold),
            checkpoints: CheckpointTracker::new(config.checkpoint_max_age_ms),
            arbitration: ArbitrationManager::new(config.proposal_max_age_ms),
            reputation: ReputationLedger::new(
                config.new_peer_influence,
                config.min_reputation_for_vote,
            ),
            quarantine: QuarantineList::new(config.quarantine_base_ms),
            tstate: TStateManager::new(config.stale_comms_threshold_ms),
            authority: AuthorityManager::new(config.base_authority_duration_ms),
            drift: DriftDetector::new(drift_thresholds),
            patterns: PatternTracker::new(
                config.pattern_bundle_threshold,
                config.min_success_rate_for_bundle,
            ),
            rollback: RollbackBuffer::new(),
            admission: AdmissionController,
            audit: AuditLog::new(),
            events: VecDeque::new(),
            next_signal_id: 0,
            self_confidence: 1.0,
            config,
            keypair,
            transport,
            clock,
        }
    }

    /// This node's identity.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        self.keypair.peer_id()
    }

    /// Sets the confidence advertised in heartbeats.
    pub fn set_self_confidence(&mut self, confidence: f64) {
        self.self_confidence = confidence.clamp(0.0, 1.0);
    }

    // =========================================================================
    // Outbound operations
    // =========================================================================

    /// Announces this node to the mesh.
    pub fn announce(&mut self) {
        let body = WireBody::Hello {
            known_peers: self.membership.alive_peers(),
            t_state: Some(self.tstate.state()),
        };
        let envelope = self.envelope(body);
        self.transport.broadcast(&envelope);
    }

    /// Builds, signs, applies, and broadcasts a delta signal for a claim.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the freshly signed signal fails its own
    /// verification; that is a programmer error, not a wire condition.
    pub fn publish_claim(
        &mut self,
        claim_hash: &str,
        direction: Direction,
        confidence: f64,
    ) -> Result<Signal, PublishError> {
        let builder =
            SignalBuilder::new(claim_hash, direction, confidence).ttl(self.config.default_ttl);
        self.publish(builder)
    }

    /// Signs and broadcasts a prepared signal, applying it locally first.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the signal fails verification.
    pub fn publish(&mut self, builder: SignalBuilder) -> Result<Signal, PublishError> {
        let now = self.clock.now_ms();
        self.next_signal_id += 1;
        let signal = builder.sign(&self.keypair, self.next_signal_id, now);

        self.propagation.publish(&signal)?;
        self.beliefs.apply(&signal);
        let outcome = self.conflicts.observe_belief(
            &signal.source_id,
            &signal.payload.claim_hash,
            signal.payload.direction.stance(),
            signal.payload.confidence,
            signal.timestamp,
            None,
        );

        self.audit.append(
            LogKind::OutBroadcast,
            json!({ "signal": serde_json::to_value(&signal).expect("signals serialize") }),
            None,
            now,
        );
        let envelope = self.envelope(WireBody::LearningSignal {
            signal: signal.clone(),
        });
        self.transport.broadcast(&envelope);

        if outcome.newly_contested {
            self.on_conflict_crossing(&signal.payload.claim_hash.clone(), outcome.score, now, true);
        }
        Ok(signal)
    }

    /// Opens an arbitration proposal for a claim and announces it.
    pub fn propose(&mut self, claim_hash: &str, options: Vec<String>) -> String {
        let now = self.clock.now_ms();
        let proposer = self.keypair.peer_id().clone();
        let proposal_id = self
            .arbitration
            .propose(claim_hash, options.clone(), &proposer, now);

        self.audit.append(
            LogKind::ProposalOpened,
            json!({ "proposalId": &proposal_id, "claimHash": claim_hash, "options": &options }),
            None,
            now,
        );
        self.events.push_back(CoreEvent::ProposalOpened {
            proposal_id: proposal_id.clone(),
            claim_hash: claim_hash.to_owned(),
        });

        let envelope = self.envelope(WireBody::ArbitrationProposal {
            proposal_id: proposal_id.clone(),
            claim_hash: claim_hash.to_owned(),
            options,
        });
        self.transport.broadcast(&envelope);
        proposal_id
    }

    /// Votes this node's own weight on a proposal and announces the vote.
    ///
    /// # Errors
    ///
    /// Returns the gate that refused the vote (quarantine, reputation,
    /// unknown proposal).
    pub fn vote(&mut self, proposal_id: &str, option: &str) -> Result<f64, VoteRejection> {
        let now = self.clock.now_ms();
        let voter = self.keypair.peer_id().clone();
        let claimed = self.reputation.get_influence(&voter);

        let weight = self.arbitration.record_vote(
            proposal_id,
            &voter,
            option,
            claimed,
            &self.reputation,
            &self.quarantine,
            now,
        )?;

        self.audit.append(
            LogKind::VoteRecorded,
            json!({ "proposalId": proposal_id, "option": option, "weight": weight }),
            None,
            now,
        );
        let envelope = self.envelope(WireBody::ArbitrationVote {
            proposal_id: proposal_id.to_owned(),
            option: option.to_owned(),
            weight: claimed,
        });
        self.transport.broadcast(&envelope);
        Ok(weight)
    }

    /// Tallies a proposal, resolves its conflict, and records the outcome.
    ///
    /// A belief snapshot is pushed to the rollback buffer before the
    /// resolution takes effect.
    pub fn tally(&mut self, proposal_id: &str) -> Option<TallyResult> {
        let now = self.clock.now_ms();
        self.rollback
            .push(self.beliefs.snapshot(), "before arbitration resolution", now);

        let result =
            self.arbitration
                .tally(proposal_id, &self.reputation, &self.quarantine, now)?;

        if self.conflicts.resolve(&result.claim_hash) {
            self.audit.append(
                LogKind::ConflictResolved,
                json!({ "claim_hash": result.claim_hash }),
                None,
                now,
            );
            self.events.push_back(CoreEvent::ConflictResolved {
                claim_hash: result.claim_hash.clone(),
            });
        }

        self.audit.append(
            LogKind::Resolution,
            json!({
                "proposalId": proposal_id,
                "claimHash": &result.claim_hash,
                "winner": &result.winner,
                "scores": result.scores.iter().map(|(o, w)| json!([o, w])).collect::<Vec<_>>(),
            }),
            None,
            now,
        );
        self.events.push_back(CoreEvent::ProposalResolved {
            proposal_id: proposal_id.to_owned(),
            claim_hash: result.claim_hash.clone(),
            winner: result.winner.clone(),
        });

        // A resolution that matches our own stance counts as a successful
        // pattern observation for the claim.
        if let Some(stance) = stance_from_option(&result.winner) {
            let matched = self
                .beliefs
                .get(&result.claim_hash)
                .is_some_and(|b| b.stance == stance);
            self.patterns
                .record_outcome(&result.claim_hash, stance, matched);
        }
        Some(result)
    }

    /// Requests an authority window for a peer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityDenial::NotAuthorizedState`] when the T-state
    /// forbids new grants.
    pub fn request_authority(
        &mut self,
        peer: &PeerId,
        scope: &str,
        reason: &str,
    ) -> Result<String, AuthorityDenial> {
        let now = self.clock.now_ms();
        match self.authority.request(peer, scope, reason, &self.tstate, now) {
            Ok(request_id) => {
                self.audit.append(
                    LogKind::AuthorityRequest,
                    json!({ "requestId": &request_id, "scope": scope, "reason": reason }),
                    Some(peer),
                    now,
                );
                Ok(request_id)
            },
            Err(denial) => {
                self.record_authority_denial(None, Some(peer.clone()), denial, now);
                Err(denial)
            },
        }
    }

    /// Grants a pending authority request and announces the grant.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityDenial::UnknownRequest`] for stale ids and
    /// [`AuthorityDenial::NotAuthorizedState`] if the T-state degraded in
    /// the meantime.
    pub fn grant_authority(&mut self, request_id: &str) -> Result<AuthorityWindow, AuthorityDenial> {
        let now = self.clock.now_ms();
        let window = self.authority.grant(request_id, &self.tstate, now)?;

        self.audit.append(
            LogKind::Grant,
            json!({
                "requestId": request_id,
                "scope": &window.scope,
                "expiresAt": window.expires_at,
                "tState": window.t_state_at_grant.as_str(),
            }),
            Some(&window.peer),
            now,
        );
        let envelope = self.envelope(WireBody::AuthorityGrant {
            request_id: request_id.to_owned(),
            peer: window.peer.clone(),
            expires_at: window.expires_at,
        });
        self.transport.send(&window.peer, &envelope);
        self.events.push_back(CoreEvent::AuthorityGranted {
            window: window.clone(),
        });
        Ok(window)
    }

    /// Denies a pending authority request and notifies the requester.
    ///
    /// Returns `false` for unknown request ids.
    pub fn deny_authority(&mut self, request_id: &str, reason: &str) -> bool {
        let now = self.clock.now_ms();
        let Some(request) = self.authority.deny(request_id) else {
            return false;
        };
        self.audit.append(
            LogKind::Deny,
            json!({ "requestId": request_id, "reason": reason }),
            Some(&request.peer),
            now,
        );
        let envelope = self.envelope(WireBody::AuthorityDeny {
            request_id: request_id.to_owned(),
            reason: reason.to_owned(),
        });
        self.transport.send(&request.peer, &envelope);
        self.events.push_back(CoreEvent::AuthorityDenied {
            peer: Some(request.peer),
            reason: "DENIED",
        });
        true
    }

    /// Revokes a peer's authority for cause, with the full cascade.
    pub fn revoke_authority(&mut self, peer: &PeerId, reason: &str) -> bool {
        let now = self.clock.now_ms();
        self.revoke_cascade(peer, reason, now)
    }

    /// Rolls beliefs back to the newest snapshot.
    ///
    /// Returns `false` when no snapshot is stored.
    pub fn rollback(&mut self) -> bool {
        let now = self.clock.now_ms();
        let Some(point) = self.rollback.pop_latest() else {
            return false;
        };
        self.beliefs.restore(&point.snapshot);
        self.audit.append(
            LogKind::Rollback,
            json!({ "label": &point.label, "taken_at": point.taken_at }),
            None,
            now,
        );
        self.events.push_back(CoreEvent::RolledBack { label: point.label });
        true
    }

    /// Marks a peer as holding (drift HOLD_TOO_LONG arming).
    pub fn begin_hold(&mut self, peer: &PeerId) {
        let now = self.clock.now_ms();
        self.drift.begin_hold(peer, now);
    }

    /// Clears a peer's hold.
    pub fn end_hold(&mut self, peer: &PeerId) {
        self.drift.end_hold(peer);
    }

    /// Forces a T-state transition, bypassing the staleness ladder.
    ///
    /// External transitions are part of the contract (operator tooling and
    /// recontact drills); window shrinking and auditing run exactly as for
    /// ladder-driven transitions.
    pub fn force_t_state(&mut self, state: TState) {
        let now = self.clock.now_ms();
        if let Some(change) = self.tstate.force(state) {
            self.on_tstate_change(change, now);
        }
    }

    /// Begins the recontact protocol (T2/T3 → T4).
    pub fn initiate_recontact(&mut self) -> bool {
        let now = self.clock.now_ms();
        if let Some(change) = self.tstate.initiate_recontact() {
            self.on_tstate_change(change, now);
            true
        } else {
            false
        }
    }

    /// Completes the recontact protocol (T4 → T0).
    pub fn complete_recontact(&mut self) -> bool {
        let now = self.clock.now_ms();
        if let Some(change) = self.tstate.complete_recontact() {
            self.on_tstate_change(change, now);
            true
        } else {
            false
        }
    }

    // =========================================================================
    // Inbound dispatch
    // =========================================================================

    /// Parses and handles a raw wire value. Unknown message types are
    /// dropped.
    pub fn handle_value(&mut self, value: &serde_json::Value) {
        if let Some(envelope) = Envelope::parse(value) {
            self.handle_envelope(envelope);
        }
    }

    /// Handles one incoming message. This is one of the node's two
    /// serialized entry points.
    pub fn handle_envelope(&mut self, envelope: Envelope) {
        let now = self.clock.now_ms();
        let from = envelope.from.clone();

        match envelope.body {
            WireBody::Hello { known_peers, t_state } => {
                self.on_hello(&from, &known_peers, t_state, now);
            },
            WireBody::Heartbeat { t_state, confidence } => {
                self.on_heartbeat(&from, t_state, confidence, now);
            },
            WireBody::PeerList { peers } => {
                self.membership.observe(&from, None, now);
                for peer in &peers {
                    if peer != self.keypair.peer_id() {
                        self.membership.observe(peer, None, now);
                    }
                }
            },
            WireBody::LearningSignal { signal } => {
                self.on_signal(signal, &from, now);
            },
            WireBody::CheckpointReq { claim_hash } => {
                self.on_checkpoint_req(&from, &claim_hash, now);
            },
            WireBody::CheckpointResp { claim_hash, stance, confidence, meaning } => {
                self.on_checkpoint_resp(&from, &claim_hash, stance, confidence, meaning, now);
            },
            WireBody::ArbitrationProposal { proposal_id, claim_hash, options } => {
                self.arbitration
                    .register(&proposal_id, &claim_hash, options, &from, now);
                self.audit.append(
                    LogKind::ProposalOpened,
                    json!({ "proposalId": &proposal_id, "claimHash": &claim_hash }),
                    Some(&from),
                    now,
                );
                self.events
                    .push_back(CoreEvent::ProposalOpened { proposal_id, claim_hash });
            },
            WireBody::ArbitrationVote { proposal_id, option, weight } => {
                self.on_vote(&from, &proposal_id, &option, weight, now);
            },
            WireBody::AuthorityRequest { request_id, scope, reason } => {
                self.on_authority_request(&from, &request_id, &scope, &reason, now);
            },
            WireBody::AuthorityGrant { request_id, expires_at, .. } => {
                self.events
                    .push_back(CoreEvent::GrantReceived { request_id, expires_at });
            },
            WireBody::AuthorityDeny { request_id, reason } => {
                tracing::debug!(%request_id, %reason, "authority request denied remotely");
                self.events.push_back(CoreEvent::AuthorityDenied {
                    peer: None,
                    reason: "REMOTE_DENY",
                });
            },
            WireBody::AuthorityRevoke { peer, reason } => {
                // Informational: another node revoked. No transitive
                // punishment from hearsay.
                self.events
                    .push_back(CoreEvent::AuthorityRevoked { peer, reason });
            },
            WireBody::PatternBundle { bundle } => {
                self.audit.append(
                    LogKind::PatternBundle,
                    json!({ "claim_hash": &bundle.claim_hash, "direction": "in" }),
                    Some(&from),
                    now,
                );
                self.patterns.absorb(bundle.clone());
                self.events
                    .push_back(CoreEvent::PatternAbsorbed { bundle, from });
            },
            WireBody::QuarantineNotice { target_peer, reason } => {
                self.events.push_back(CoreEvent::QuarantineNotice {
                    target: target_peer,
                    reason,
                    from,
                });
            },
        }
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Runs one periodic tick: cadenced broadcasts, liveness, T-state,
    /// expirations, drift, pruning, pattern emission. The node's second
    /// serialized entry point.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();

        // Membership cadence and liveness.
        let effects = self.membership.tick(now);
        for peer in &effects.evicted {
            self.tstate.forget(peer);
            self.drift.forget(peer);
            self.events.push_back(CoreEvent::PeerEvicted { peer: peer.clone() });
        }
        if effects.send_heartbeat {
            // The node shows up for itself too; its self-influence grows
            // on the same schedule its peers observe.
            let self_id = self.keypair.peer_id().clone();
            self.reputation.record_consistency(&self_id, now);
            let envelope = self.envelope(WireBody::Heartbeat {
                t_state: Some(self.tstate.state()),
                confidence: Some(self.self_confidence),
            });
            self.transport.broadcast(&envelope);
        }
        if let Some(peers) = effects.peer_list {
            let envelope = self.envelope(WireBody::PeerList { peers });
            self.transport.broadcast(&envelope);
        }
        for (peer, last_seen, confidence) in &effects.observations {
            self.tstate.observe(peer, *last_seen, *confidence);
        }

        // Degradation ladder, then authority bookkeeping against the new
        // state.
        if let Some(change) = self.tstate.update(now) {
            self.on_tstate_change(change, now);
        }
        for window in self.authority.check_expirations(now) {
            self.audit.append(
                LogKind::Expire,
                json!({ "scope": window.scope, "expiresAt": window.expires_at }),
                Some(&window.peer),
                now,
            );
            self.events.push_back(CoreEvent::AuthorityExpired { window });
        }
        for peer in self.quarantine.sweep(now) {
            self.audit
                .append(LogKind::QuarantineRelease, json!({}), Some(&peer), now);
            self.events.push_back(CoreEvent::QuarantineReleased { peer });
        }

        // Drift detection and the revocation cascade.
        let consensus = self.beliefs.get_consensus();
        let drift_events = self.drift.check(&consensus, now);
        for event in drift_events {
            self.audit.append(
                LogKind::Drift,
                json!({ "reason": event.reason.as_str(), "detail": event.detail }),
                Some(&event.peer),
                now,
            );
            self.events.push_back(CoreEvent::DriftTriggered(event.clone()));
            self.revoke_cascade(&event.peer, event.reason.as_str(), now);
        }

        // Housekeeping.
        self.checkpoints.prune(now);
        self.arbitration.prune(now);
        self.conflicts.prune(self.config.conflict_prune_horizon_ms, now);

        // Learning propagation, gated by T-state.
        if self.tstate.can_propagate_learning() {
            for bundle in self.patterns.ready_bundles(now) {
                self.audit.append(
                    LogKind::PatternBundle,
                    json!({ "claim_hash": &bundle.claim_hash, "direction": "out" }),
                    None,
                    now,
                );
                let envelope = self.envelope(WireBody::PatternBundle {
                    bundle: bundle.clone(),
                });
                self.transport.broadcast(&envelope);
                self.events.push_back(CoreEvent::PatternEmitted { bundle });
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Drains all queued events.
    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        self.events.drain(..).collect()
    }

    /// Whether a peer holds unexpired authority.
    #[must_use]
    pub fn has_authority(&self, peer: &PeerId) -> bool {
        self.authority.has_authority(peer, self.clock.now_ms())
    }

    /// Whether a peer is currently quarantined.
    #[must_use]
    pub fn is_quarantined(&self, peer: &PeerId) -> bool {
        self.quarantine.is_quarantined(peer, self.clock.now_ms())
    }

    /// A peer's active authority window, if any.
    #[must_use]
    pub fn authority_window(&self, peer: &PeerId) -> Option<&AuthorityWindow> {
        self.authority.window(peer)
    }

    /// A peer's reputation score as this node sees it.
    #[must_use]
    pub fn get_score(&self, peer: &PeerId) -> f64 {
        self.reputation.get_score(peer)
    }

    /// Current degradation state.
    #[must_use]
    pub fn t_state(&self) -> TState {
        self.tstate.state()
    }

    /// The belief store.
    #[must_use]
    pub fn beliefs(&self) -> &BeliefStore {
        &self.beliefs
    }

    /// The conflict accumulator.
    #[must_use]
    pub fn conflicts(&self) -> &ConflictAccumulator {
        &self.conflicts
    }

    /// The reputation ledger.
    #[must_use]
    pub fn reputation(&self) -> &ReputationLedger {
        &self.reputation
    }

    /// The audit journal.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The membership view.
    #[must_use]
    pub fn membership(&self) -> &MembershipManager {
        &self.membership
    }

    /// The arbitration state.
    #[must_use]
    pub fn arbitration(&self) -> &ArbitrationManager {
        &self.arbitration
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    fn on_hello(
        &mut self,
        from: &PeerId,
        known_peers: &[PeerId],
        t_state: Option<TState>,
        now: u64,
    ) {
        if let Err(denial) =
            self.admission
                .admit(from, &self.reputation, &self.quarantine, now)
        {
            self.audit.append(
                LogKind::PeerDenied,
                json!({ "reason": denial.as_code() }),
                Some(from),
                now,
            );
            self.events.push_back(CoreEvent::AdmissionDenied {
                peer: from.clone(),
                reason: denial,
            });
            return;
        }

        self.membership.observe(from, None, now);
        if let Some(state) = t_state {
            self.membership.observe_t_state(from, state, now);
        }
        for peer in known_peers {
            if peer != self.keypair.peer_id() {
                self.membership.observe(peer, None, now);
            }
        }
        self.reputation.track(from, now);
        self.drift.note_comms(from, None, now);

        let envelope = self.envelope(WireBody::PeerList {
            peers: self.membership.alive_peers(),
        });
        self.transport.send(from, &envelope);
    }

    fn on_heartbeat(
        &mut self,
        from: &PeerId,
        t_state: Option<TState>,
        confidence: Option<f64>,
        now: u64,
    ) {
        self.membership.observe(from, confidence, now);
        if let Some(state) = t_state {
            self.membership.observe_t_state(from, state, now);
        }
        self.reputation.record_consistency(from, now);
        self.tstate.observe(from, now, confidence.unwrap_or(1.0));
        self.drift.note_comms(from, confidence, now);
    }

    fn on_signal(&mut self, signal: Signal, from: &PeerId, now: u64) {
        let self_quarantined = self
            .quarantine
            .is_quarantined(self.keypair.peer_id(), now);
        let disposition = self.propagation.on_incoming(
            &signal,
            from,
            &self.quarantine,
            &mut self.reputation,
            self_quarantined,
            now,
        );

        match disposition {
            Disposition::Accepted { forward } => {
                self.membership.observe(from, None, now);
                self.drift.note_comms(from, None, now);

                self.audit.append(
                    LogKind::In,
                    json!({ "signal": serde_json::to_value(&signal).expect("signals serialize") }),
                    Some(from),
                    now,
                );
                self.beliefs.apply(&signal);

                let stance = signal.payload.direction.stance();
                let outcome = self.conflicts.observe_belief(
                    &signal.source_id,
                    &signal.payload.claim_hash,
                    stance,
                    signal.payload.confidence,
                    signal.timestamp,
                    None,
                );
                self.drift.observe_belief(
                    &signal.source_id,
                    &signal.payload.claim_hash,
                    stance,
                    signal.payload.confidence,
                );

                if let Some(forward) = forward {
                    let envelope = self.envelope(WireBody::LearningSignal { signal: forward });
                    self.transport.broadcast(&envelope);
                }
                if outcome.newly_contested {
                    self.on_conflict_crossing(
                        &signal.payload.claim_hash.clone(),
                        outcome.score,
                        now,
                        true,
                    );
                }
                self.events.push_back(CoreEvent::SignalAccepted {
                    signal,
                    from: from.clone(),
                });
            },
            Disposition::Duplicate => {
                // Silent by contract: no audit entry, no event.
            },
            Disposition::Rejected(reason) => {
                self.audit.append(
                    LogKind::SignalRejected,
                    json!({
                        "reason": reason.as_code(),
                        "source": signal.source_id.as_str(),
                        "signal_id": signal.signal_id,
                    }),
                    Some(from),
                    now,
                );
                self.events.push_back(CoreEvent::SignalRejected {
                    from: from.clone(),
                    reason,
                });
            },
        }
    }

    fn on_checkpoint_req(&mut self, from: &PeerId, claim_hash: &str, now: u64) {
        self.membership.observe(from, None, now);
        let (stance, confidence) = self
            .beliefs
            .get(claim_hash)
            .map_or((Stance::Unknown, 0.0), |b| (b.stance, b.confidence));

        let envelope = self.envelope(WireBody::CheckpointResp {
            claim_hash: claim_hash.to_owned(),
            stance,
            confidence,
            meaning: Some(String::new()),
        });
        self.transport.send(from, &envelope);
    }

    fn on_checkpoint_resp(
        &mut self,
        from: &PeerId,
        claim_hash: &str,
        stance: Stance,
        confidence: f64,
        meaning: Option<String>,
        now: u64,
    ) {
        let response = CheckpointResponse {
            peer: from.clone(),
            stance,
            confidence,
            meaning: meaning.unwrap_or_default(),
        };
        self.checkpoints.on_response(claim_hash, response.clone());

        let outcome = self.conflicts.observe_belief(
            from,
            claim_hash,
            stance,
            confidence,
            now,
            Some(&response.meaning),
        );
        self.drift.observe_belief(from, claim_hash, stance, confidence);

        self.audit.append(
            LogKind::CheckpointResp,
            json!({ "claimHash": claim_hash, "stance": stance.as_str(), "confidence": confidence }),
            Some(from),
            now,
        );
        self.events.push_back(CoreEvent::CheckpointResponse {
            claim_hash: claim_hash.to_owned(),
            response,
        });

        // A crossing discovered *by* a checkpoint does not open another
        // checkpoint; the poll is already running.
        if outcome.newly_contested {
            self.on_conflict_crossing(claim_hash, outcome.score, now, false);
        }
    }

    fn on_vote(
        &mut self,
        from: &PeerId,
        proposal_id: &str,
        option: &str,
        claimed_weight: f64,
        now: u64,
    ) {
        match self.arbitration.record_vote(
            proposal_id,
            from,
            option,
            claimed_weight,
            &self.reputation,
            &self.quarantine,
            now,
        ) {
            Ok(weight) => {
                self.audit.append(
                    LogKind::VoteRecorded,
                    json!({ "proposalId": proposal_id, "option": option, "weight": weight }),
                    Some(from),
                    now,
                );
            },
            Err(rejection) => {
                self.audit.append(
                    LogKind::VoteIgnored,
                    json!({
                        "proposalId": proposal_id,
                        "option": option,
                        "claimedWeight": claimed_weight,
                        "reason": rejection.as_code(),
                    }),
                    Some(from),
                    now,
                );
                self.events.push_back(CoreEvent::VoteIgnored {
                    proposal_id: proposal_id.to_owned(),
                    voter: from.clone(),
                    reason: rejection.as_code(),
                });
            },
        }
    }

    fn on_authority_request(
        &mut self,
        from: &PeerId,
        request_id: &str,
        scope: &str,
        reason: &str,
        now: u64,
    ) {
        match self
            .authority
            .register_request(request_id, from, scope, reason, &self.tstate, now)
        {
            Ok(()) => {
                self.audit.append(
                    LogKind::AuthorityRequest,
                    json!({ "requestId": request_id, "scope": scope, "reason": reason }),
                    Some(from),
                    now,
                );
            },
            Err(denial) => {
                self.record_authority_denial(Some(request_id), Some(from.clone()), denial, now);
                let envelope = self.envelope(WireBody::AuthorityDeny {
                    request_id: request_id.to_owned(),
                    reason: denial.as_code().to_owned(),
                });
                self.transport.send(from, &envelope);
            },
        }
    }

    fn on_conflict_crossing(
        &mut self,
        claim_hash: &str,
        score: f64,
        now: u64,
        open_checkpoint: bool,
    ) {
        self.audit.append(
            LogKind::ConflictDetected,
            json!({ "claim_hash": claim_hash, "score": score }),
            None,
            now,
        );
        self.events.push_back(CoreEvent::ConflictDetected {
            claim_hash: claim_hash.to_owned(),
            score,
        });

        if open_checkpoint {
            let request_id = self.checkpoints.request(claim_hash, now);
            self.audit.append(
                LogKind::CheckpointReq,
                json!({ "claimHash": claim_hash, "requestId": request_id }),
                None,
                now,
            );
            let envelope = self.envelope(WireBody::CheckpointReq {
                claim_hash: claim_hash.to_owned(),
            });
            self.transport.broadcast(&envelope);
        }
    }

    fn on_tstate_change(&mut self, change: TStateChange, now: u64) {
        self.audit.append(
            LogKind::TstateChange,
            json!({ "from": change.from.as_str(), "to": change.to.as_str() }),
            None,
            now,
        );
        self.authority.shrink_windows(change.to, now);
        self.events.push_back(CoreEvent::TStateChanged(change));
    }

    /// Revoke → quarantine → violation, in that order. Only peers that
    /// actually held a window cascade; for the rest this is a no-op.
    fn revoke_cascade(&mut self, peer: &PeerId, reason: &str, now: u64) -> bool {
        let Some(window) = self.authority.revoke(peer, reason) else {
            return false;
        };

        self.audit.append(
            LogKind::Revoke,
            json!({ "scope": window.scope, "reason": reason }),
            Some(peer),
            now,
        );
        let envelope = self.envelope(WireBody::AuthorityRevoke {
            peer: peer.clone(),
            reason: reason.to_owned(),
        });
        self.transport.broadcast(&envelope);
        self.events.push_back(CoreEvent::AuthorityRevoked {
            peer: peer.clone(),
            reason: reason.to_owned(),
        });

        let entry = self.quarantine.quarantine(peer, reason, now);
        let expires_at = entry.expires_at;
        self.audit.append(
            LogKind::Quarantine,
            json!({ "reason": reason, "expiresAt": expires_at }),
            Some(peer),
            now,
        );
        let envelope = self.envelope(WireBody::QuarantineNotice {
            target_peer: peer.clone(),
            reason: reason.to_owned(),
        });
        self.transport.broadcast(&envelope);
        self.events.push_back(CoreEvent::PeerQuarantined {
            peer: peer.clone(),
            reason: reason.to_owned(),
            expires_at,
        });

        self.reputation.record_violation(peer, reason, now);
        true
    }

    fn record_authority_denial(
        &mut self,
        request_id: Option<&str>,
        peer: Option<PeerId>,
        denial: AuthorityDenial,
        now: u64,
    ) {
        self.audit.append(
            LogKind::Deny,
            json!({ "requestId": request_id, "reason": denial.as_code() }),
            peer.as_ref(),
            now,
        );
        self.events.push_back(CoreEvent::AuthorityDenied {
            peer,
            reason: denial.as_code(),
        });
    }

    fn envelope(&self, body: WireBody) -> Envelope {
        Envelope {
            from: self.keypair.peer_id().clone(),
            ts: self.clock.now_ms(),
            body,
        }
    }
}

fn stance_from_option(option: &str) -> Option<Stance> {
    match option {
        "strengthen" => Some(Stance::Strengthen),
        "weaken" => Some(Stance::Weaken),
        "retract" => Some(Stance::Retract),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::{MemoryHub, MemoryTransport};

    fn node(hub: &MemoryHub, clock: &ManualClock) -> Node<MemoryTransport, ManualClock> {
        let keypair = Keypair::generate();
        let transport = hub.endpoint(keypair.peer_id());
        Node::new(CoreConfig::fast(), keypair, transport, clock.clone())
    }

    fn pump(hub: &MemoryHub, nodes: &mut [Node<MemoryTransport, ManualClock>]) {
        loop {
            let mut delivered = false;
            for node in nodes.iter_mut() {
                for envelope in hub.drain(&node.peer_id().clone()) {
                    delivered = true;
                    node.handle_envelope(envelope);
                }
            }
            if !delivered {
                break;
            }
        }
    }

    #[test]
    fn hello_gets_a_peer_list_reply() {
        let hub = MemoryHub::new();
        let clock = ManualClock::at(1_000);
        let mut nodes = vec![node(&hub, &clock), node(&hub, &clock)];

        nodes[0].announce();
        pump(&hub, &mut nodes);

        // Node 1 saw the HELLO and replied point-to-point; node 0 learned
        // about node 1 from the reply envelope.
        let id0 = nodes[0].peer_id().clone();
        let id1 = nodes[1].peer_id().clone();
        assert!(nodes[1].membership().get(&id0).is_some());
        assert!(nodes[0].membership().get(&id1).is_some());
    }

    #[test]
    fn published_signal_reaches_and_updates_peers() {
        let hub = MemoryHub::new();
        let clock = ManualClock::at(1_000);
        let mut nodes = vec![node(&hub, &clock), node(&hub, &clock), node(&hub, &clock)];

        nodes[0]
            .publish_claim("claim:x", Direction::Strengthen, 0.8)
            .expect("publishes");
        pump(&hub, &mut nodes);

        for n in &nodes {
            let belief = n.beliefs().get("claim:x").expect("belief spread");
            assert_eq!(belief.stance, Stance::Strengthen);
        }
        // Receivers audited the acceptance; the publisher audited the send.
        assert!(nodes[1].audit().entries().iter().any(|e| e.kind == LogKind::In));
        assert!(nodes[0]
            .audit()
            .entries()
            .iter()
            .any(|e| e.kind == LogKind::OutBroadcast));
    }

    #[test]
    fn conflicting_stances_open_a_checkpoint_poll() {
        let hub = MemoryHub::new();
        let clock = ManualClock::at(1_000);
        let mut nodes: Vec<_> = (0..4).map(|_| node(&hub, &clock)).collect();

        nodes[0]
            .publish_claim("claim:x", Direction::Strengthen, 0.8)
            .unwrap();
        pump(&hub, &mut nodes);
        clock.advance(10);
        nodes[1].publish_claim("claim:x", Direction::Weaken, 0.8).unwrap();
        pump(&hub, &mut nodes);

        // Some node saw both stances and crossed the threshold.
        let detected = nodes.iter_mut().any(|n| {
            n.drain_events()
                .iter()
                .any(|e| matches!(e, CoreEvent::ConflictDetected { .. }))
        });
        assert!(detected);
    }

    #[test]
    fn self_vote_respects_the_reputation_gate() {
        let hub = MemoryHub::new();
        let clock = ManualClock::at(1_000);
        let mut nodes = vec![node(&hub, &clock)];

        let id = nodes[0].propose("claim:x", vec![String::from("strengthen")]);
        // Fresh node: own score sits at the floor, below the voting gate.
        assert_eq!(
            nodes[0].vote(&id, "strengthen"),
            Err(VoteRejection::InsufficientReputation)
        );

        // Enough heartbeat ticks to earn the right to vote.
        for _ in 0..40 {
            nodes[0].tick();
            clock.advance(1_000);
        }
        let id = nodes[0].propose("claim:x", vec![String::from("strengthen")]);
        assert!(nodes[0].vote(&id, "strengthen").is_ok());
    }
}
