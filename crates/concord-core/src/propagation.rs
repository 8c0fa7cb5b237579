//! Signal ingest and forwarding.
//!
//! Every incoming signal runs the same gauntlet, in order: sender
//! quarantine, signature, TTL, dedup, replay guard. Duplicates drop
//! silently — a gossiping mesh redelivers constantly and that is not
//! misbehavior — while everything else is a reportable rejection. Accepted
//! signals earn the relayer a reputation success and are re-broadcast with
//! the TTL decremented, unless this node is itself quarantined.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::identity::PeerId;
use crate::quarantine::QuarantineList;
use crate::reputation::ReputationLedger;
use crate::signal::Signal;

/// Publishing an unsigned or mis-signed signal is a programmer error, not
/// a wire condition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The signal does not verify against its own `source_id`.
    #[error("signal does not verify; refusing to publish")]
    InvalidSignature,
}

/// Why an incoming signal was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The relaying peer is quarantined.
    SenderQuarantined,
    /// Signature verification failed.
    InvalidSignature,
    /// TTL exhausted.
    TtlExpired,
    /// `signal_id` at or below the source's high-water mark: replay.
    StaleSignalId,
}

impl RejectReason {
    /// Short code for logs and audit entries.
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::SenderQuarantined => "SENDER_QUARANTINED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::TtlExpired => "TTL_EXPIRED",
            Self::StaleSignalId => "STALE_SIGNAL_ID",
        }
    }
}

/// Outcome of presenting a signal to [`Propagator::on_incoming`].
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Signal accepted; `forward` carries the TTL-decremented copy to
    /// broadcast, absent when this node is quarantined.
    Accepted {
        /// Copy to re-broadcast, if forwarding is allowed.
        forward: Option<Signal>,
    },
    /// Signal rejected for cause.
    Rejected(RejectReason),
    /// Already seen; dropped silently.
    Duplicate,
}

/// Bounded set of seen dedup keys with approximate-FIFO eviction.
#[derive(Debug)]
struct SeenSet {
    keys: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl SeenSet {
    fn new(cap: usize) -> Self {
        Self {
            keys: HashSet::new(),
            order: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Inserts a key; on overflow the oldest 10% are evicted so the most
    /// recent 90% survive.
    fn insert(&mut self, key: String) {
        if !self.keys.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        if self.order.len() > self.cap {
            let evict = (self.cap / 10).max(1);
            for _ in 0..evict {
                if let Some(old) = self.order.pop_front() {
                    self.keys.remove(&old);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Signal ingest pipeline state: dedup set plus per-source replay guard.
#[derive(Debug)]
pub struct Propagator {
    seen: SeenSet,
    high_water: HashMap<PeerId, u64>,
}

impl Propagator {
    /// Creates a propagator with the given dedup capacity.
    #[must_use]
    pub fn new(max_seen_signals: usize) -> Self {
        Self {
            seen: SeenSet::new(max_seen_signals),
            high_water: HashMap::new(),
        }
    }

    /// Registers a locally published signal.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::InvalidSignature`] when the signal does not
    /// verify; a node must never push bytes it would itself reject.
    pub fn publish(&mut self, signal: &Signal) -> Result<(), PublishError> {
        if !signal.verify() {
            return Err(PublishError::InvalidSignature);
        }
        self.seen.insert(signal.dedup_key());
        self.note_signal_id(&signal.source_id, signal.signal_id);
        Ok(())
    }

    /// Runs the ingest pipeline for a signal relayed by `from`.
    ///
    /// Reputation effects: an invalid signature or a replayed `signal_id`
    /// costs the *relayer* a failure; an accepted signal earns it a
    /// success. Duplicates move nothing.
    pub fn on_incoming(
        &mut self,
        signal: &Signal,
        from: &PeerId,
        quarantine: &QuarantineList,
        reputation: &mut ReputationLedger,
        self_quarantined: bool,
        now: u64,
    ) -> Disposition {
        if quarantine.is_quarantined(from, now) {
            tracing::debug!(from = %from, "dropping signal from quarantined sender");
            return Disposition::Rejected(RejectReason::SenderQuarantined);
        }

        if !signal.verify() {
            reputation.record_failure(from, now);
            tracing::debug!(from = %from, source = %signal.source_id, "signature rejected");
            return Disposition::Rejected(RejectReason::InvalidSignature);
        }

        if signal.ttl == 0 {
            return Disposition::Rejected(RejectReason::TtlExpired);
        }

        let key = signal.dedup_key();
        if self.seen.contains(&key) {
            return Disposition::Duplicate;
        }

        if self
            .high_water
            .get(&signal.source_id)
            .is_some_and(|max| signal.signal_id <= *max)
        {
            reputation.record_failure(from, now);
            tracing::debug!(
                from = %from,
                source = %signal.source_id,
                signal_id = signal.signal_id,
                "non-monotonic signal_id rejected"
            );
            return Disposition::Rejected(RejectReason::StaleSignalId);
        }

        self.seen.insert(key);
        self.note_signal_id(&signal.source_id, signal.signal_id);
        reputation.record_success(from, now);

        let forward = if self_quarantined {
            None
        } else {
            Some(signal.forwarded())
        };
        Disposition::Accepted { forward }
    }

    /// Number of dedup keys currently held.
    #[must_use]
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    fn note_signal_id(&mut self, source: &PeerId, signal_id: u64) {
        let entry = self.high_water.entry(source.clone()).or_insert(0);
        *entry = (*entry).max(signal_id);
    }
}
