//! SQRL Core - Core types and cryptographic primitives for SQRL.
//!
//! This crate provides:
//! - Key and signature types (IdentityKey, UnlockKey, RequestSignature)
//! - Ed25519 signing and verification
//! - Transaction Information Flags (TIF) bitmask
//! - Timestamp and nut expiry handling

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod crypto;
pub mod keys;
pub mod tif;
pub mod time;

pub use crypto::*;
pub use keys::*;
pub use tif::Tif;
pub use time::*;

/// SQRL protocol version implemented by this workspace.
pub const PROTOCOL_VERSION: u32 = 1;

/// Protocol versions accepted in `ver` negotiation.
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Size of all public keys on the wire
pub const KEY_SIZE: usize = 32;

/// Size of an Ed25519 request signature
pub const SIGNATURE_SIZE: usize = 64;
