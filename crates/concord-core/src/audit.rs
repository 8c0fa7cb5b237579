//! Hash-chained audit journal.
//!
//! Every governance decision lands here as a [`LogEntry`] whose hash
//! covers its content plus the previous entry's hash. Tampering with any
//! historical entry breaks the chain at that index, and [`AuditLog::verify`]
//! reports the first break. The journal round-trips through JSONL with the
//! chain intact, byte for byte.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::canonical::{CanonicalObject, canonical_value};
use crate::crypto::sha256_hex;
use crate::identity::PeerId;

/// What kind of event a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogKind {
    /// Signal sent point-to-point by this node.
    OutSend,
    /// Signal broadcast by this node.
    OutBroadcast,
    /// Signal accepted from a peer.
    In,
    /// Signal rejected at ingest.
    SignalRejected,
    /// Conflict score crossed the divergence threshold.
    ConflictDetected,
    /// Conflict record cleared.
    ConflictResolved,
    /// Checkpoint request broadcast.
    CheckpointReq,
    /// Checkpoint response received.
    CheckpointResp,
    /// Arbitration proposal opened.
    ProposalOpened,
    /// Vote recorded on a proposal.
    VoteRecorded,
    /// Vote received but refused by a gate.
    VoteIgnored,
    /// Arbitration tallied and resolved.
    Resolution,
    /// Authority request opened.
    AuthorityRequest,
    /// Authority window granted.
    Grant,
    /// Authority request denied.
    Deny,
    /// Authority window revoked.
    Revoke,
    /// Authority window expired.
    Expire,
    /// Drift trigger fired.
    Drift,
    /// Peer quarantined.
    Quarantine,
    /// Quarantine released.
    QuarantineRelease,
    /// T-state transition.
    TstateChange,
    /// Beliefs rolled back to a snapshot.
    Rollback,
    /// Pattern bundle emitted or absorbed.
    PatternBundle,
    /// Peer admission refused.
    PeerDenied,
}

impl LogKind {
    /// Canonical name, identical to the serde form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OutSend => "OUT_SEND",
            Self::OutBroadcast => "OUT_BROADCAST",
            Self::In => "IN",
            Self::SignalRejected => "SIGNAL_REJECTED",
            Self::ConflictDetected => "CONFLICT_DETECTED",
            Self::ConflictResolved => "CONFLICT_RESOLVED",
            Self::CheckpointReq => "CHECKPOINT_REQ",
            Self::CheckpointResp => "CHECKPOINT_RESP",
            Self::ProposalOpened => "PROPOSAL_OPENED",
            Self::VoteRecorded => "VOTE_RECORDED",
            Self::VoteIgnored => "VOTE_IGNORED",
            Self::Resolution => "RESOLUTION",
            Self::AuthorityRequest => "AUTHORITY_REQUEST",
            Self::Grant => "GRANT",
            Self::Deny => "DENY",
            Self::Revoke => "REVOKE",
            Self::Expire => "EXPIRE",
            Self::Drift => "DRIFT",
            Self::Quarantine => "QUARANTINE",
            Self::QuarantineRelease => "QUARANTINE_RELEASE",
            Self::TstateChange => "TSTATE_CHANGE",
            Self::Rollback => "ROLLBACK",
            Self::PatternBundle => "PATTERN_BUNDLE",
            Self::PeerDenied => "PEER_DENIED",
        }
    }
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Index, strictly increasing from 0.
    pub i: u64,
    /// Wall-clock milliseconds at append time.
    pub ts: u64,
    /// Event kind.
    pub kind: LogKind,
    /// Peer the event concerns, if any.
    #[serde(default)]
    pub peer: Option<PeerId>,
    /// Event payload.
    pub data: Value,
    /// Hash of entry `i − 1`; `None` iff `i == 0`.
    #[serde(default)]
    pub prev: Option<String>,
    /// SHA-256 over the canonical form of everything above.
    pub hash: String,
}

impl LogEntry {
    /// Canonical fixed-order form of the hashed fields.
    #[must_use]
    pub fn canonical_form(&self) -> String {
        CanonicalObject::new()
            .u64_field("i", self.i)
            .u64_field("ts", self.ts)
            .str_field("kind", self.kind.as_str())
            .opt_str_field("peer", self.peer.as_ref().map(PeerId::as_str))
            .raw_field("data", &canonical_value(&self.data))
            .opt_str_field("prev", self.prev.as_deref())
            .finish()
    }

    /// Recomputes the hash from the canonical form.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        sha256_hex(self.canonical_form().as_bytes())
    }
}

/// Outcome of a chain verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReport {
    /// Whether the whole chain checked out.
    pub valid: bool,
    /// Index of the first broken entry, when invalid.
    pub broken_at: Option<u64>,
}

/// Errors importing a journal from JSONL.
#[derive(Debug, Error)]
pub enum AuditImportError {
    /// A line failed to parse as a log entry.
    #[error("malformed journal line {line}: {source}")]
    MalformedLine {
        /// 1-based line number.
        line: usize,
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

/// Append-only, hash-chained event journal.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Vec<LogEntry>,
    last_hash: Option<String>,
    counter: u64,
}

impl AuditLog {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and links it into the chain.
    pub fn append(
        &mut self,
        kind: LogKind,
        data: Value,
        peer: Option<&PeerId>,
        now: u64,
    ) -> &LogEntry {
        let mut entry = LogEntry {
            i: self.counter,
            ts: now,
            kind,
            peer: peer.cloned(),
            data,
            prev: self.last_hash.clone(),
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();

        self.counter += 1;
        self.last_hash = Some(entry.hash.clone());
        self.entries.push(entry);
        self.entries.last().expect("pushed above")
    }

    /// Verifies the whole chain, reporting the first break.
    #[must_use]
    pub fn verify(&self) -> ChainReport {
        let mut prev_hash: Option<&str> = None;
        for entry in &self.entries {
            let linked = match (&entry.prev, prev_hash) {
                (None, None) => entry.i == 0,
                (Some(stored), Some(actual)) => stored == actual,
                _ => false,
            };
            if !linked || entry.compute_hash() != entry.hash {
                return ChainReport {
                    valid: false,
                    broken_at: Some(entry.i),
                };
            }
            prev_hash = Some(&entry.hash);
        }
        ChainReport {
            valid: true,
            broken_at: None,
        }
    }

    /// Entries whose payload references a claim, in journal order.
    ///
    /// Matches a top-level `claim_hash`/`claimHash` or a carried signal's
    /// `payload.claim_hash`.
    #[must_use]
    pub fn trace_provenance(&self, claim_hash: &str) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|entry| {
                let data = &entry.data;
                let top = data
                    .get("claim_hash")
                    .or_else(|| data.get("claimHash"))
                    .and_then(Value::as_str);
                let nested = data
                    .get("signal")
                    .and_then(|s| s.get("payload"))
                    .and_then(|p| p.get("claim_hash"))
                    .and_then(Value::as_str);
                top == Some(claim_hash) || nested == Some(claim_hash)
            })
            .collect()
    }

    /// Serializes the journal, one entry per line.
    #[must_use]
    pub fn export_jsonl(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry).expect("log entries serialize"));
            out.push('\n');
        }
        out
    }

    /// Restores a journal from JSONL, recovering the counter and chain
    /// head from the last entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditImportError`] on the first malformed line. Chain
    /// integrity is *not* checked here; call [`Self::verify`].
    pub fn from_jsonl(input: &str) -> Result<Self, AuditImportError> {
        let mut entries = Vec::new();
        for (idx, line) in input.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry =
                serde_json::from_str(line).map_err(|source| AuditImportError::MalformedLine {
                    line: idx + 1,
                    source,
                })?;
            entries.push(entry);
        }
        let last_hash = entries.last().map(|e| e.hash.clone());
        let counter = entries.last().map_or(0, |e| e.i + 1);
        Ok(Self {
            entries,
            last_hash,
            counter,
        })
    }

    /// All entries in order.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the journal is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn entry_mut(&mut self, index: usize) -> &mut LogEntry {
        &mut self.entries[index]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::identity::Keypair;

    fn filled(n: u64) -> AuditLog {
        let mut log = AuditLog::new();
        for i in 0..n {
            log.append(LogKind::In, json!({"seq": i, "claim_hash": "claim:x"}), None, 1_000 + i);
        }
        log
    }

    #[test]
    fn chain_links_and_verifies() {
        let log = filled(10);
        assert_eq!(log.len(), 10);
        assert!(log.entries()[0].prev.is_none());
        for pair in log.entries().windows(2) {
            assert_eq!(pair[1].prev.as_deref(), Some(pair[0].hash.as_str()));
        }
        assert_eq!(log.verify(), ChainReport { valid: true, broken_at: None });
    }

    #[test]
    fn data_tamper_breaks_the_chain_at_that_index() {
        let mut log = filled(1_000);
        log.entry_mut(500).data = json!({"seq": 500, "claim_hash": "claim:forged"});

        let report = log.verify();
        assert!(!report.valid);
        assert_eq!(report.broken_at, Some(500));
    }

    #[test]
    fn hash_tamper_is_caught_even_with_matching_prev() {
        let mut log = filled(5);
        let original = log.entries()[3].hash.clone();
        let flipped = if original.starts_with('0') { "1" } else { "0" };
        log.entry_mut(3).hash = format!("{flipped}{}", &original[1..]);

        let report = log.verify();
        assert!(!report.valid);
        // Entry 3's own hash no longer matches, or entry 4's prev link
        // fails; the first break wins.
        assert_eq!(report.broken_at, Some(3));
    }

    #[test]
    fn jsonl_round_trip_preserves_the_chain() {
        let keypair = Keypair::generate();
        let mut log = AuditLog::new();
        log.append(
            LogKind::Quarantine,
            json!({"reason": "drift", "violations": 2}),
            Some(keypair.peer_id()),
            1_000,
        );
        log.append(LogKind::TstateChange, json!({"from": "T0", "to": "T1"}), None, 2_000);

        let exported = log.export_jsonl();
        let imported = AuditLog::from_jsonl(&exported).expect("imports");
        assert_eq!(imported.len(), 2);
        assert!(imported.verify().valid);
        assert_eq!(imported.export_jsonl(), exported);

        // Appending after import continues the chain.
        let mut imported = imported;
        imported.append(LogKind::Drift, json!({"reason": "STALE_COMMS"}), None, 3_000);
        assert!(imported.verify().valid);
        assert_eq!(imported.entries().last().unwrap().i, 2);
    }

    #[test]
    fn malformed_jsonl_reports_the_line() {
        let err = AuditLog::from_jsonl("not json\n").expect_err("rejects");
        let AuditImportError::MalformedLine { line, .. } = err;
        assert_eq!(line, 1);
    }

    #[test]
    fn provenance_matches_top_level_and_carried_claims() {
        let mut log = AuditLog::new();
        log.append(LogKind::ConflictDetected, json!({"claim_hash": "claim:x", "score": 0.97}), None, 1);
        log.append(
            LogKind::In,
            json!({"signal": {"payload": {"claim_hash": "claim:x"}}}),
            None,
            2,
        );
        log.append(LogKind::ConflictDetected, json!({"claimHash": "claim:x"}), None, 3);
        log.append(LogKind::ConflictDetected, json!({"claim_hash": "claim:y"}), None, 4);

        let trail = log.trace_provenance("claim:x");
        assert_eq!(trail.len(), 3);
        assert!(trail.windows(2).all(|w| w[0].i < w[1].i));
    }

    #[test]
    fn empty_log_verifies() {
        assert!(AuditLog::new().verify().valid);
        assert!(AuditLog::from_jsonl("").expect("imports").is_empty());
    }
}
