//! Peer admission gate.
//!
//! Consulted on HELLO. A returning peer with a violation history past the
//! limit is refused outright; an actively quarantined peer is refused for
//! the duration. Admission confers membership, never trust — influence
//! still starts at the floor.

use crate::identity::PeerId;
use crate::quarantine::QuarantineList;
use crate::reputation::ReputationLedger;

/// Violations beyond which a returning peer is refused.
pub const MAX_RETURNING_VIOLATIONS: u32 = 3;

/// Why admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDenial {
    /// The peer's violation history exceeds the limit.
    ExcessiveViolations {
        /// Violations on record.
        violations: u32,
    },
    /// The peer is currently quarantined.
    Quarantined,
}

impl AdmissionDenial {
    /// Short code for logs and audit entries.
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::ExcessiveViolations { .. } => "EXCESSIVE_VIOLATIONS",
            Self::Quarantined => "QUARANTINED",
        }
    }
}

/// Stateless admission policy over the reputation and quarantine stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionController;

impl AdmissionController {
    /// Decides whether a peer may (re)join.
    ///
    /// # Errors
    ///
    /// Returns the denial reason; the caller logs it and drops the HELLO.
    pub fn admit(
        self,
        peer: &PeerId,
        reputation: &ReputationLedger,
        quarantine: &QuarantineList,
        now: u64,
    ) -> Result<(), AdmissionDenial> {
        if quarantine.is_quarantined(peer, now) {
            return Err(AdmissionDenial::Quarantined);
        }
        let violations = reputation.violations(peer);
        if violations > MAX_RETURNING_VIOLATIONS {
            tracing::warn!(peer = %peer, violations, "returning peer refused admission");
            return Err(AdmissionDenial::ExcessiveViolations { violations });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    fn peer() -> PeerId {
        Keypair::generate().peer_id().clone()
    }

    #[test]
    fn unknown_peers_are_admitted() {
        let reputation = ReputationLedger::new(0.1, 0.2);
        let quarantine = QuarantineList::new(1_000);
        assert!(AdmissionController
            .admit(&peer(), &reputation, &quarantine, 0)
            .is_ok());
    }

    #[test]
    fn violation_history_blocks_readmission_past_the_limit() {
        let mut reputation = ReputationLedger::new(0.1, 0.2);
        let quarantine = QuarantineList::new(1_000);
        let p = peer();

        for i in 0..MAX_RETURNING_VIOLATIONS {
            reputation.record_violation(&p, "test", u64::from(i));
        }
        // Exactly at the limit is still tolerated.
        assert!(AdmissionController
            .admit(&p, &reputation, &quarantine, 100)
            .is_ok());

        reputation.record_violation(&p, "one too many", 101);
        assert_eq!(
            AdmissionController.admit(&p, &reputation, &quarantine, 102),
            Err(AdmissionDenial::ExcessiveViolations { violations: 4 })
        );
    }

    #[test]
    fn quarantined_peers_wait_out_their_term() {
        let reputation = ReputationLedger::new(0.1, 0.2);
        let mut quarantine = QuarantineList::new(1_000);
        let p = peer();
        quarantine.quarantine(&p, "drift", 0);

        assert_eq!(
            AdmissionController.admit(&p, &reputation, &quarantine, 500),
            Err(AdmissionDenial::Quarantined)
        );
        assert!(AdmissionController
            .admit(&p, &reputation, &quarantine, 1_500)
            .is_ok());
    }
}
