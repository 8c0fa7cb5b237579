//! Deterministic state reconstruction from the audit journal.
//!
//! Replay folds log entries in index order: every carried signal
//! (OUT_SEND, OUT_BROADCAST, IN) goes through the belief store's
//! resolution rule, and every `peer` field lands in the peer set. Because
//! the resolution rule is a pure function of `(timestamp, confidence)`,
//! two replays of the same journal always land on the same state.

use std::collections::BTreeSet;

use crate::audit::{AuditLog, LogKind};
use crate::belief::BeliefStore;
use crate::identity::PeerId;
use crate::signal::Signal;

/// State rebuilt by a replay pass.
#[derive(Debug, Default)]
pub struct ReplayState {
    /// Beliefs reconstructed through the resolution rule.
    pub beliefs: BeliefStore,
    /// Every peer named by a journal entry.
    pub peers: BTreeSet<PeerId>,
    /// Signals applied.
    pub signals_applied: usize,
    /// Carried signals that failed to parse (foreign or corrupt journal).
    pub signals_skipped: usize,
    /// ROLLBACK entries noted along the way.
    pub rollbacks_seen: usize,
}

impl ReplayState {
    /// Deterministic fingerprint of the rebuilt state, for comparing two
    /// replays cheaply.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut claims: Vec<String> = self
            .beliefs
            .all()
            .map(|b| {
                format!(
                    "{}={}:{}:{}",
                    b.claim_hash,
                    b.stance.as_str(),
                    b.confidence,
                    b.updated_at
                )
            })
            .collect();
        claims.sort();
        let peers: Vec<&str> = self.peers.iter().map(PeerId::as_str).collect();
        format!("beliefs[{}] peers[{}]", claims.join(","), peers.join(","))
    }
}

/// Replays an audit journal into a fresh [`ReplayState`].
#[must_use]
pub fn replay(log: &AuditLog) -> ReplayState {
    let mut state = ReplayState::default();

    for entry in log.entries() {
        if let Some(peer) = &entry.peer {
            state.peers.insert(peer.clone());
        }

        match entry.kind {
            LogKind::OutSend | LogKind::OutBroadcast | LogKind::In => {
                let Some(raw) = entry.data.get("signal") else {
                    state.signals_skipped += 1;
                    continue;
                };
                match serde_json::from_value::<Signal>(raw.clone()) {
                    Ok(signal) => {
                        state.peers.insert(signal.source_id.clone());
                        state.beliefs.apply(&signal);
                        state.signals_applied += 1;
                    },
                    Err(err) => {
                        tracing::debug!(i = entry.i, error = %err, "skipping unparseable signal");
                        state.signals_skipped += 1;
                    },
                }
            },
            LogKind::Rollback => {
                // Snapshots are not journaled; rollbacks are noted only.
                state.rollbacks_seen += 1;
            },
            _ => {},
        }
    }
    state
}
