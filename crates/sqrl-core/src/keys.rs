//! Public key and signature types used on the SQRL wire.
//!
//! Defines the 32-byte public key types carried by client requests:
//! - `IdentityKey` - site-specific identity public key (`idk`/`pidk`)
//! - `UnlockKey` - server unlock key (`suk`)
//! - `VerifyUnlockKey` - verify unlock key (`vuk`)
//!
//! All keys travel base64url-encoded without padding.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use thiserror::Error;

use crate::{KEY_SIZE, SIGNATURE_SIZE};

/// Error decoding a key or signature from its wire form.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Invalid base64url encoding
    #[error("Invalid base64url encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Invalid decoded length
    #[error("Invalid {kind} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// What was being decoded
        kind: &'static str,
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },
}

/// Macro to define a 32-byte public key type with the common wire codec.
macro_rules! define_key_type {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; KEY_SIZE]);

        impl $name {
            /// Creates a new key from a 32-byte array.
            pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
                Self(bytes)
            }

            /// Returns the inner bytes.
            pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }

            /// Returns the inner bytes as a slice.
            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            /// Encodes as base64url without padding (the wire form).
            pub fn to_base64url(&self) -> String {
                URL_SAFE_NO_PAD.encode(self.0)
            }

            /// Decodes from the base64url wire form.
            pub fn from_base64url(s: &str) -> Result<Self, KeyError> {
                let bytes = URL_SAFE_NO_PAD.decode(s)?;
                if bytes.len() != KEY_SIZE {
                    return Err(KeyError::InvalidLength {
                        kind: $kind,
                        expected: KEY_SIZE,
                        actual: bytes.len(),
                    });
                }
                let mut arr = [0u8; KEY_SIZE];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_base64url()[..12])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_base64url())
            }
        }

        impl From<[u8; KEY_SIZE]> for $name {
            fn from(bytes: [u8; KEY_SIZE]) -> Self {
                Self(bytes)
            }
        }
    };
}

define_key_type!(
    /// Site-specific identity public key (`idk` and `pidk` fields).
    ///
    /// The Ed25519 public half of the key a client derives for one site.
    IdentityKey,
    "IdentityKey"
);

define_key_type!(
    /// Server unlock key (`suk` field).
    ///
    /// Stored at identity creation and echoed back to clients that need to
    /// run the identity unlock flow. Opaque to this engine.
    UnlockKey,
    "UnlockKey"
);

define_key_type!(
    /// Verify unlock key (`vuk` field).
    ///
    /// Public half of the unlock request signing keypair. Opaque to this
    /// engine; unlock request verification is an extension point.
    VerifyUnlockKey,
    "VerifyUnlockKey"
);

/// Ed25519 signature over a client request (`ids` and `pids` fields).
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSignature(#[serde_as(as = "[_; 64]")] pub [u8; SIGNATURE_SIZE]);

impl RequestSignature {
    /// Creates a new signature from a 64-byte array.
    pub const fn new(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the inner bytes.
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Encodes as base64url without padding (the wire form).
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Decodes from the base64url wire form.
    pub fn from_base64url(s: &str) -> Result<Self, KeyError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        if bytes.len() != SIGNATURE_SIZE {
            return Err(KeyError::InvalidLength {
                kind: "RequestSignature",
                expected: SIGNATURE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SIGNATURE_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestSignature({})", &self.to_base64url()[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_base64url_roundtrip() {
        let key = IdentityKey::new([0x42; 32]);
        let encoded = key.to_base64url();
        let decoded = IdentityKey::from_base64url(&encoded).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_key_wire_form_unpadded() {
        let key = IdentityKey::new([0x11; 32]);
        let encoded = key.to_base64url();
        assert_eq!(encoded.len(), 43);
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_key_invalid_length() {
        let result = IdentityKey::from_base64url("AQID");
        assert!(matches!(result, Err(KeyError::InvalidLength { .. })));
    }

    #[test]
    fn test_key_invalid_base64() {
        let result = IdentityKey::from_base64url("not valid base64!!!");
        assert!(matches!(result, Err(KeyError::InvalidBase64(_))));
    }

    #[test]
    fn test_signature_roundtrip() {
        let sig = RequestSignature::new([0xAB; 64]);
        let encoded = sig.to_base64url();
        let decoded = RequestSignature::from_base64url(&encoded).unwrap();
        assert_eq!(sig, decoded);
    }

    #[test]
    fn test_signature_invalid_length() {
        let short = URL_SAFE_NO_PAD.encode([0u8; 32]);
        let result = RequestSignature::from_base64url(&short);
        assert!(matches!(result, Err(KeyError::InvalidLength { .. })));
    }
}
