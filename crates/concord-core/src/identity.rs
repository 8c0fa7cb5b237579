//! Peer identity: Ed25519 keypairs and their hex-encoded public identifiers.
//!
//! A [`PeerId`] is exactly the lowercase hex of an Ed25519 public key, and
//! two peers are the same iff their hex strings are byte-equal. Secret key
//! material lives inside [`Keypair`] and only leaves it wrapped in
//! [`Zeroizing`].

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Length of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Length of an Ed25519 secret key in bytes.
pub const SECRET_KEY_SIZE: usize = 32;

/// Errors from parsing peer identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The identifier is not valid hex.
    #[error("peer id is not valid hex")]
    MalformedHex,

    /// The identifier decodes to the wrong number of bytes.
    #[error("peer id has wrong length: expected {expected} bytes, got {got}")]
    WrongLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        got: usize,
    },
}

/// Stable identifier of a peer: the lowercase hex of its Ed25519 public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Derives the identifier for a verifying key.
    #[must_use]
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(hex::encode(key.to_bytes()))
    }

    /// Parses an identifier from hex, validating length.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the input is not hex or does not decode
    /// to exactly [`PUBLIC_KEY_SIZE`] bytes.
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(s).map_err(|_| IdentityError::MalformedHex)?;
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(IdentityError::WrongLength {
                expected: PUBLIC_KEY_SIZE,
                got: bytes.len(),
            });
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Returns the hex form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the public key this identifier names.
    ///
    /// Returns `None` for identifiers that are not well-formed keys; the
    /// verification path treats that as signature failure, never a panic.
    #[must_use]
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        let bytes = hex::decode(&self.0).ok()?;
        let array: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().ok()?;
        VerifyingKey::from_bytes(&array).ok()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An Ed25519 keypair bound to the [`PeerId`] it produces.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
    peer_id: PeerId,
}

impl Keypair {
    /// Generates a fresh keypair from the OS random source.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self::from_signing_key(SigningKey::generate(&mut rng))
    }

    /// Builds a keypair from raw secret key bytes.
    #[must_use]
    pub fn from_secret_bytes(bytes: &[u8; SECRET_KEY_SIZE]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    fn from_signing_key(signing: SigningKey) -> Self {
        let peer_id = PeerId::from_verifying_key(&signing.verifying_key());
        Self { signing, peer_id }
    }

    /// Returns the peer identifier derived from the public key.
    #[must_use]
    pub const fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Returns the signing key.
    #[must_use]
    pub const fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    /// Returns the secret key bytes in a zeroizing container.
    #[must_use]
    pub fn secret_key_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_SIZE]> {
        Zeroizing::new(self.signing.to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secret key intentionally absent.
        f.debug_struct("Keypair")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_round_trips_through_hex() {
        let keypair = Keypair::generate();
        let id = keypair.peer_id().clone();

        let parsed = PeerId::from_hex(id.as_str()).expect("valid hex id");
        assert_eq!(parsed, id);
        assert!(parsed.verifying_key().is_some());
    }

    #[test]
    fn peer_id_rejects_malformed_input() {
        assert_eq!(
            PeerId::from_hex("not hex at all"),
            Err(IdentityError::MalformedHex)
        );
        assert_eq!(
            PeerId::from_hex("abcd"),
            Err(IdentityError::WrongLength {
                expected: PUBLIC_KEY_SIZE,
                got: 2,
            })
        );
    }

    #[test]
    fn secret_bytes_rebuild_the_same_identity() {
        let keypair = Keypair::generate();
        let secret = keypair.secret_key_bytes();
        let rebuilt = Keypair::from_secret_bytes(&secret);
        assert_eq!(rebuilt.peer_id(), keypair.peer_id());
    }

    #[test]
    fn debug_omits_secret_material() {
        let keypair = Keypair::generate();
        let rendered = format!("{keypair:?}");
        let secret_hex = hex::encode(*keypair.secret_key_bytes());
        assert!(!rendered.contains(&secret_hex));
    }
}
