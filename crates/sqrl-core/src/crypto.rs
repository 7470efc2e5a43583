//! Ed25519 signing and verification.
//!
//! SQRL authenticates clients by an Ed25519 signature over the
//! concatenation of the literal `client` and `server` base64url strings.
//! Verification fails closed: malformed keys or signatures of the wrong
//! length are verification failures, never panics.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

use crate::{KEY_SIZE, SIGNATURE_SIZE};

/// Error during signature verification.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Public key bytes do not form a valid Ed25519 point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Key or signature has the wrong length
    #[error("Invalid {kind} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// What was malformed
        kind: &'static str,
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// Signature does not validate against the key
    #[error("Signature verification failed")]
    VerificationFailed,
}

/// Generates an Ed25519 keypair from the provided randomness source.
///
/// Returns `(secret, public)`. Randomness is injected by the caller;
/// there is no ambient global RNG in this crate.
pub fn generate_keypair<R: RngCore + CryptoRng>(rng: &mut R) -> ([u8; KEY_SIZE], [u8; KEY_SIZE]) {
    let signing = SigningKey::generate(rng);
    (signing.to_bytes(), signing.verifying_key().to_bytes())
}

/// Derives the public key for an Ed25519 secret key.
pub fn derive_public_key(secret: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    SigningKey::from_bytes(secret).verifying_key().to_bytes()
}

/// Signs a message with an Ed25519 secret key.
pub fn sign_ed25519(secret: &[u8; KEY_SIZE], message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    SigningKey::from_bytes(secret).sign(message).to_bytes()
}

/// Verifies an Ed25519 signature.
///
/// Accepts slices so that untrusted wire input can be checked directly;
/// any length or decoding problem is an `Err`, the same as a bad signature.
pub fn verify_ed25519(
    public: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let public: &[u8; KEY_SIZE] =
        public
            .try_into()
            .map_err(|_| SignatureError::InvalidLength {
                kind: "public key",
                expected: KEY_SIZE,
                actual: public.len(),
            })?;
    let signature: &[u8; SIGNATURE_SIZE] =
        signature
            .try_into()
            .map_err(|_| SignatureError::InvalidLength {
                kind: "signature",
                expected: SIGNATURE_SIZE,
                actual: signature.len(),
            })?;

    let key = VerifyingKey::from_bytes(public).map_err(|_| SignatureError::InvalidPublicKey)?;
    key.verify(message, &Signature::from_bytes(signature))
        .map_err(|_| SignatureError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_sign_verify_roundtrip() {
        let (secret, public) = generate_keypair(&mut OsRng);
        let message = b"client-blob-server-blob";

        let signature = sign_ed25519(&secret, message);
        assert!(verify_ed25519(&public, message, &signature).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampered_message() {
        let (secret, public) = generate_keypair(&mut OsRng);
        let signature = sign_ed25519(&secret, b"original");
        assert!(verify_ed25519(&public, b"originaL", &signature).is_err());
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let (secret, _) = generate_keypair(&mut OsRng);
        let (_, other_public) = generate_keypair(&mut OsRng);

        let signature = sign_ed25519(&secret, b"message");
        assert!(verify_ed25519(&other_public, b"message", &signature).is_err());
    }

    #[test]
    fn test_verify_rejects_flipped_signature_bit() {
        let (secret, public) = generate_keypair(&mut OsRng);
        let mut signature = sign_ed25519(&secret, b"message");
        signature[0] ^= 0x01;
        assert!(verify_ed25519(&public, b"message", &signature).is_err());
    }

    #[test]
    fn test_verify_fails_closed_on_bad_lengths() {
        let (secret, public) = generate_keypair(&mut OsRng);
        let signature = sign_ed25519(&secret, b"message");

        assert!(matches!(
            verify_ed25519(&public[..31], b"message", &signature),
            Err(SignatureError::InvalidLength { .. })
        ));
        assert!(matches!(
            verify_ed25519(&public, b"message", &signature[..63]),
            Err(SignatureError::InvalidLength { .. })
        ));
        assert!(verify_ed25519(&[], b"message", &[]).is_err());
    }

    #[test]
    fn test_derive_public_key_matches_keypair() {
        let (secret, public) = generate_keypair(&mut OsRng);
        assert_eq!(derive_public_key(&secret), public);
    }
}
