//! Belief signals: the signed, TTL-bounded wire unit of the governance
//! core.
//!
//! A signal is immutable once signed. Its canonical form is a fixed-order
//! JSON object (see [`Signal::canonical_form`]); the signature is Ed25519
//! over the SHA-256 of that form, and the author's [`PeerId`] is the
//! verifying key.

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalObject;
use crate::crypto::{sha256_hex, sign_canonical, verify_canonical};
use crate::identity::{Keypair, PeerId};

/// A node's position on a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    /// The claim is supported.
    Strengthen,
    /// The claim is disputed.
    Weaken,
    /// The claim should be withdrawn.
    Retract,
    /// No position held.
    Unknown,
}

impl Stance {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strengthen => "strengthen",
            Self::Weaken => "weaken",
            Self::Retract => "retract",
            Self::Unknown => "unknown",
        }
    }
}

/// Direction a signal pushes a claim. Unlike [`Stance`] there is no
/// `unknown`: a signal always says something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Push the claim up.
    Strengthen,
    /// Push the claim down.
    Weaken,
    /// Withdraw the claim.
    Retract,
}

impl Direction {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strengthen => "strengthen",
            Self::Weaken => "weaken",
            Self::Retract => "retract",
        }
    }

    /// The stance a belief adopts after applying a signal in this
    /// direction.
    #[must_use]
    pub const fn stance(self) -> Stance {
        match self {
            Self::Strengthen => Stance::Strengthen,
            Self::Weaken => Stance::Weaken,
            Self::Retract => Stance::Retract,
        }
    }
}

/// Kind of belief update a signal carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    /// Incremental belief update.
    Delta,
    /// Correction of an earlier signal.
    Correction,
    /// The referenced meaning is deprecated.
    Deprecation,
}

impl SignalType {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delta => "delta",
            Self::Correction => "correction",
            Self::Deprecation => "deprecation",
        }
    }
}

/// Intended propagation reach of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// This node only.
    Local,
    /// The local cluster.
    Cluster,
    /// The whole swarm.
    Global,
}

impl Scope {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cluster => "cluster",
            Self::Global => "global",
        }
    }
}

/// Payload of a belief signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    /// Application-defined claim identifier.
    pub claim_hash: String,

    /// Which way the signal pushes the claim.
    pub direction: Direction,

    /// Author confidence in `[0, 1]`.
    pub confidence: f64,

    /// Optional hash of supporting evidence.
    #[serde(default)]
    pub evidence_hash: Option<String>,
}

impl SignalPayload {
    /// Canonical fixed-order form of the payload.
    #[must_use]
    pub fn canonical_form(&self) -> String {
        CanonicalObject::new()
            .str_field("claim_hash", &self.claim_hash)
            .str_field("direction", self.direction.as_str())
            .f64_field("confidence", self.confidence)
            .opt_str_field("evidence_hash", self.evidence_hash.as_deref())
            .finish()
    }
}

/// A signed belief update. Immutable once signed.
///
/// Field order matches the canonical serialization so the struct reads the
/// same way the bytes do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Author of the signal; hex Ed25519 public key.
    pub source_id: PeerId,

    /// Strictly increasing per source in send order.
    pub signal_id: u64,

    /// Wall-clock milliseconds; authoritative for belief ordering.
    pub timestamp: u64,

    /// Application domain string.
    pub domain: String,

    /// Kind of update.
    pub signal_type: SignalType,

    /// The belief update itself.
    pub payload: SignalPayload,

    /// Hops remaining; decremented on each forward.
    pub ttl: u32,

    /// Propagation reach.
    pub scope: Scope,

    /// Hex Ed25519 signature over the SHA-256 of the canonical form.
    pub signature: String,

    /// Optional dedup key of the signal this one supersedes.
    #[serde(default)]
    pub prior_signal: Option<String>,
}

impl Signal {
    /// Canonical fixed-order form: what gets hashed and signed.
    ///
    /// The signature is excluded, and so is the TTL: it is the one field
    /// forwarding mutates, so covering it would break verification after
    /// the first hop. Everything identity-bearing is inside.
    #[must_use]
    pub fn canonical_form(&self) -> String {
        CanonicalObject::new()
            .str_field("source_id", self.source_id.as_str())
            .u64_field("signal_id", self.signal_id)
            .u64_field("timestamp", self.timestamp)
            .str_field("domain", &self.domain)
            .str_field("signal_type", self.signal_type.as_str())
            .raw_field("payload", &self.payload.canonical_form())
            .str_field("scope", self.scope.as_str())
            .opt_str_field("prior_signal", self.prior_signal.as_deref())
            .finish()
    }

    /// Verifies the signature against the author's public key.
    ///
    /// Returns `false` on malformed hex, wrong lengths, or algebraic
    /// failure; never panics.
    #[must_use]
    pub fn verify(&self) -> bool {
        verify_canonical(&self.source_id, &self.canonical_form(), &self.signature)
    }

    /// Deduplication key: SHA-256 over the identifying subset
    /// `{source_id, signal_id, payload, domain}`.
    ///
    /// The TTL is deliberately excluded so a forwarded copy dedups against
    /// the original.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        let canonical = CanonicalObject::new()
            .str_field("source_id", self.source_id.as_str())
            .u64_field("signal_id", self.signal_id)
            .raw_field("payload", &self.payload.canonical_form())
            .str_field("domain", &self.domain)
            .finish();
        sha256_hex(canonical.as_bytes())
    }

    /// Returns a copy with the TTL decremented, for forwarding.
    #[must_use]
    pub fn forwarded(&self) -> Self {
        let mut copy = self.clone();
        copy.ttl = copy.ttl.saturating_sub(1);
        copy
    }
}

/// Builder that assembles and signs a [`Signal`].
#[derive(Debug, Clone)]
pub struct SignalBuilder {
    domain: String,
    signal_type: SignalType,
    claim_hash: String,
    direction: Direction,
    confidence: f64,
    evidence_hash: Option<String>,
    ttl: u32,
    scope: Scope,
    prior_signal: Option<String>,
}

impl SignalBuilder {
    /// Starts a delta signal for a claim.
    #[must_use]
    pub fn new(claim_hash: impl Into<String>, direction: Direction, confidence: f64) -> Self {
        Self {
            domain: String::from("default"),
            signal_type: SignalType::Delta,
            claim_hash: claim_hash.into(),
            direction,
            confidence: confidence.clamp(0.0, 1.0),
            evidence_hash: None,
            ttl: 8,
            scope: Scope::Global,
            prior_signal: None,
        }
    }

    /// Sets the application domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Sets the signal type.
    #[must_use]
    pub const fn signal_type(mut self, signal_type: SignalType) -> Self {
        self.signal_type = signal_type;
        self
    }

    /// Attaches an evidence hash.
    #[must_use]
    pub fn evidence(mut self, evidence_hash: impl Into<String>) -> Self {
        self.evidence_hash = Some(evidence_hash.into());
        self
    }

    /// Sets the initial TTL.
    #[must_use]
    pub const fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the propagation scope.
    #[must_use]
    pub const fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// References the dedup key of a superseded signal.
    #[must_use]
    pub fn prior(mut self, prior_signal: impl Into<String>) -> Self {
        self.prior_signal = Some(prior_signal.into());
        self
    }

    /// Signs the assembled signal.
    ///
    /// `signal_id` must be strictly increasing per author in send order;
    /// the node composition owns that counter.
    #[must_use]
    pub fn sign(self, keypair: &Keypair, signal_id: u64, timestamp: u64) -> Signal {
        let mut signal = Signal {
            source_id: keypair.peer_id().clone(),
            signal_id,
            timestamp,
            domain: self.domain,
            signal_type: self.signal_type,
            payload: SignalPayload {
                claim_hash: self.claim_hash,
                direction: self.direction,
                confidence: self.confidence,
                evidence_hash: self.evidence_hash,
            },
            ttl: self.ttl,
            scope: self.scope,
            signature: String::new(),
            prior_signal: self.prior_signal,
        };
        signal.signature = sign_canonical(keypair, &signal.canonical_form());
        signal
    }
}
