//! SQRL Engine - Server-side protocol engine.
//!
//! This crate provides:
//! - The storage collaborator contract (`Storage`) and its records
//! - An in-memory storage implementation for tests and small deployments
//! - Nut issuance, lookup, and login-completion lifecycle
//! - The TIF / identity-match engine driving the per-command state machine
//! - The protocol driver sequencing decode, verification, state, and
//!   response encoding
//!
//! The engine is stateless and reentrant; all state lives behind the
//! `Storage` trait. It has no dependency on any HTTP framework: the
//! transport layer hands it narrow input records and receives encoded
//! response bodies back.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod driver;
pub mod identity;
pub mod memory;
pub mod nut;
pub mod storage;

pub use driver::{DriverConfig, InboundRequest, IssuedLogin, ProtocolDriver};
pub use identity::{CommandOutcome, EngineError, IdentityEngine};
pub use memory::{MemoryStorage, MemoryStorageConfig};
pub use nut::{generate_nut, NutManager, PollOutcome};
pub use storage::{
    IdentityMatch, IdentityRecord, NutRecord, RotationRequest, Storage, StorageError,
    MAX_PREVIOUS_KEYS,
};
