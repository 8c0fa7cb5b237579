//! Hashing and signing over canonical bytes.
//!
//! Signals and log entries are hashed with SHA-256 of their canonical JSON
//! form; signals are additionally signed with Ed25519 over that digest. The
//! verification path never panics: malformed hex, wrong lengths, and
//! algebraic failures all collapse to `false` at the boundary.

use ed25519_dalek::{Signature, Signer, Verifier};
use sha2::{Digest, Sha256};

use crate::identity::{Keypair, PeerId};

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Computes the SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Computes the SHA-256 digest of `bytes` as lowercase hex.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

/// Signs the SHA-256 digest of a canonical form, returning the signature as
/// hex.
#[must_use]
pub fn sign_canonical(keypair: &Keypair, canonical: &str) -> String {
    let digest = sha256(canonical.as_bytes());
    let signature = keypair.signing_key().sign(&digest);
    hex::encode(signature.to_bytes())
}

/// Verifies a hex signature over the SHA-256 digest of a canonical form.
///
/// The public key is the one named by `signer`. Returns `false` on any
/// malformation or verification failure.
#[must_use]
pub fn verify_canonical(signer: &PeerId, canonical: &str, signature_hex: &str) -> bool {
    let Some(verifying_key) = signer.verifying_key() else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_array) = <[u8; SIGNATURE_SIZE]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_array);
    let digest = sha256(canonical.as_bytes());
    verifying_key.verify(&digest, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let keypair = Keypair::generate();
        let canonical = r#"{"claim_hash":"claim:x","confidence":0.85}"#;

        let signature = sign_canonical(&keypair, canonical);
        assert!(verify_canonical(keypair.peer_id(), canonical, &signature));
    }

    #[test]
    fn verify_rejects_tampered_content() {
        let keypair = Keypair::generate();
        let signature = sign_canonical(&keypair, "original");
        assert!(!verify_canonical(keypair.peer_id(), "tampered", &signature));
    }

    #[test]
    fn verify_rejects_wrong_signer() {
        let author = Keypair::generate();
        let other = Keypair::generate();
        let signature = sign_canonical(&author, "content");
        assert!(!verify_canonical(other.peer_id(), "content", &signature));
    }

    #[test]
    fn verify_never_panics_on_garbage() {
        let keypair = Keypair::generate();

        // Malformed signature hex.
        assert!(!verify_canonical(keypair.peer_id(), "content", "zz-not-hex"));
        // Wrong signature length.
        assert!(!verify_canonical(keypair.peer_id(), "content", "abcd"));
        // Peer id that is hex but not a curve point still just fails.
        let bogus = PeerId::from_hex(&"ff".repeat(32)).expect("hex id");
        let signature = sign_canonical(&keypair, "content");
        let _ = verify_canonical(&bogus, "content", &signature);
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
