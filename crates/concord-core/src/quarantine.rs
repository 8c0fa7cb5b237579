//! Peer isolation with exponential backoff.
//!
//! A quarantined peer can still be heard from (receipt is never blocked)
//! but nothing it says propagates and its influence multiplier is zero.
//! Each repeat offense doubles the duration: `base · 2^(violations − 1)`.
//!
//! Expired entries are kept around in a released state so the violation
//! count survives across releases; a repeat offender resumes the doubling
//! where it left off.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::PeerId;

/// One isolation entry, active or released.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    /// The isolated peer.
    pub peer: PeerId,

    /// Why it was isolated.
    pub reason: String,

    /// When isolation began.
    pub quarantined_at: u64,

    /// When isolation ends.
    pub expires_at: u64,

    /// How many times this peer has been quarantined, counting this one.
    pub violations: u32,

    /// Set once the entry has expired and the release has been reported.
    #[serde(default)]
    pub released: bool,
}

impl QuarantineEntry {
    /// Whether this entry has expired at `now`.
    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// All quarantine entries for one node.
#[derive(Debug)]
pub struct QuarantineList {
    entries: HashMap<PeerId, QuarantineEntry>,
    base_duration_ms: u64,
}

impl QuarantineList {
    /// Creates an empty list with the given base duration.
    #[must_use]
    pub fn new(base_duration_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            base_duration_ms,
        }
    }

    /// Quarantines a peer, replacing any prior entry.
    ///
    /// The violation count carries across releases, so repeat offenders
    /// sit out exponentially longer.
    pub fn quarantine(
        &mut self,
        peer: &PeerId,
        reason: impl Into<String>,
        now: u64,
    ) -> &QuarantineEntry {
        let violations = self.entries.get(peer).map_or(0, |e| e.violations) + 1;
        let duration = self
            .base_duration_ms
            .saturating_mul(1_u64.checked_shl(violations - 1).unwrap_or(u64::MAX));
        let reason = reason.into();

        tracing::warn!(
            peer = %peer,
            reason = %reason,
            violations,
            duration_ms = duration,
            "peer quarantined"
        );

        self.entries.insert(
            peer.clone(),
            QuarantineEntry {
                peer: peer.clone(),
                reason,
                quarantined_at: now,
                expires_at: now.saturating_add(duration),
                violations,
                released: false,
            },
        );
        self.entries.get(peer).expect("inserted above")
    }

    /// Whether a peer is currently quarantined.
    #[must_use]
    pub fn is_quarantined(&self, peer: &PeerId, now: u64) -> bool {
        self.entries
            .get(peer)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Zero while quarantined, one otherwise.
    #[must_use]
    pub fn get_influence_multiplier(&self, peer: &PeerId, now: u64) -> f64 {
        if self.is_quarantined(peer, now) {
            0.0
        } else {
            1.0
        }
    }

    /// Entry for a peer, if any — possibly already released.
    #[must_use]
    pub fn get(&self, peer: &PeerId) -> Option<&QuarantineEntry> {
        self.entries.get(peer)
    }

    /// Reports newly expired entries, marking each release exactly once.
    pub fn sweep(&mut self, now: u64) -> Vec<PeerId> {
        let mut released = Vec::new();
        for entry in self.entries.values_mut() {
            if !entry.released && entry.is_expired(now) {
                entry.released = true;
                released.push(entry.peer.clone());
                tracing::info!(peer = %entry.peer, "quarantine released");
            }
        }
        released.sort();
        released
    }

    /// Peers currently quarantined.
    #[must_use]
    pub fn active(&self, now: u64) -> Vec<&QuarantineEntry> {
        self.entries
            .values()
            .filter(|e| !e.is_expired(now))
            .collect()
    }

    /// Number of entries, released ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
