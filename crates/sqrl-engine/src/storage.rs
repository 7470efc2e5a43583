//! Storage collaborator contract.
//!
//! The engine owns no state of its own; nut and identity records live
//! behind this trait. Implementations must apply a nut's login transition
//! at most once and serialize create-or-rotate per identity key so
//! concurrent `ident` calls for the same key cannot lose updates.
//! Storage failures surface unchanged; the engine performs no retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqrl_core::{IdentityKey, Timestamp, UnlockKey, VerifyUnlockKey};
use thiserror::Error;

/// Upper bound on retained previous identity keys per identity.
pub const MAX_PREVIOUS_KEYS: usize = 4;

/// Error from the storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend failure (connection, corruption, capacity)
    #[error("Storage backend failure: {0}")]
    Backend(String),

    /// Rotation referenced an identity that does not exist
    #[error("No identity stored for rotation source key")]
    RotationSourceMissing,
}

/// Server-side record of one issued nut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutRecord {
    /// The opaque nut value
    pub nut: String,
    /// For nuts issued mid-conversation: the nut the browser is polling
    pub original_login_nut: Option<String>,
    /// Issuance time, used for expiry
    pub created_at: Timestamp,
    /// Set once, when an `ident` command succeeds
    pub logged_in: bool,
    /// The identity that completed login, set together with `logged_in`
    pub client_identity_key: Option<IdentityKey>,
}

impl NutRecord {
    /// Creates a fresh, not-yet-logged-in record.
    pub fn new(nut: impl Into<String>, original_login_nut: Option<String>) -> Self {
        Self {
            nut: nut.into(),
            original_login_nut,
            created_at: Timestamp::now(),
            logged_in: false,
            client_identity_key: None,
        }
    }

    /// The nut the browser polls for this conversation: the original
    /// login nut when present, otherwise this record's own nut.
    pub fn login_nut(&self) -> &str {
        self.original_login_nut.as_deref().unwrap_or(&self.nut)
    }
}

/// Stored identity association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Current identity public key; unique across the store
    pub identity_key: IdentityKey,
    /// Retired identity keys, oldest first, capped at `MAX_PREVIOUS_KEYS`
    pub previous_identity_keys: Vec<IdentityKey>,
    /// Server unlock key provided at creation or rotation
    pub server_unlock_key: Option<UnlockKey>,
    /// Verify unlock key provided at creation or rotation
    pub verify_unlock_key: Option<VerifyUnlockKey>,
    /// Only SQRL may authenticate this identity
    pub sqrl_identity_only: bool,
    /// Out-of-band recovery disallowed
    pub hard_lock: bool,
}

impl IdentityRecord {
    /// Creates a new identity record with no previous keys.
    pub fn new(identity_key: IdentityKey) -> Self {
        Self {
            identity_key,
            previous_identity_keys: Vec::new(),
            server_unlock_key: None,
            verify_unlock_key: None,
            sqrl_identity_only: false,
            hard_lock: false,
        }
    }

    /// Retires a primary key into the previous-key list.
    ///
    /// Duplicates are removed before appending and the list is capped at
    /// `MAX_PREVIOUS_KEYS`, evicting oldest first.
    pub fn retire_key(&mut self, old_key: IdentityKey) {
        self.previous_identity_keys.retain(|k| *k != old_key);
        self.previous_identity_keys.push(old_key);
        while self.previous_identity_keys.len() > MAX_PREVIOUS_KEYS {
            self.previous_identity_keys.remove(0);
        }
    }
}

/// Which of the request's keys matched a stored identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMatch {
    /// The current key (`idk`) matched
    Current,
    /// The previous key (`pidk`) matched
    Previous,
}

/// Parameters for a previous-key rotation.
#[derive(Debug, Clone)]
pub struct RotationRequest {
    /// The stored primary key being retired
    pub old_key: IdentityKey,
    /// The new primary key
    pub new_key: IdentityKey,
    /// Replacement server unlock key, when the client supplied one
    pub server_unlock_key: Option<UnlockKey>,
    /// Replacement verify unlock key, when the client supplied one
    pub verify_unlock_key: Option<VerifyUnlockKey>,
}

/// Abstract persistence for nut and identity records.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persists a freshly issued nut record.
    async fn issue_nut(&self, record: NutRecord) -> Result<(), StorageError>;

    /// Looks up a nut. Expired or unknown nuts are `None`, not an error.
    async fn lookup_nut(&self, nut: &str) -> Result<Option<NutRecord>, StorageError>;

    /// Finds an identity whose primary key equals `identity_key` or
    /// `previous_key`, reporting which one matched. A single combined
    /// lookup; at most one match is returned.
    async fn find_identity(
        &self,
        identity_key: &IdentityKey,
        previous_key: Option<&IdentityKey>,
    ) -> Result<Option<(IdentityRecord, IdentityMatch)>, StorageError>;

    /// Creates a new identity association.
    async fn create_identity(&self, record: IdentityRecord) -> Result<IdentityRecord, StorageError>;

    /// Re-keys an identity: retires the old primary key and installs the
    /// new one atomically.
    async fn rotate_identity(
        &self,
        rotation: RotationRequest,
    ) -> Result<IdentityRecord, StorageError>;

    /// Marks a nut logged in with the authenticated identity key.
    ///
    /// A missing record is a silent no-op: the nut expired and the poller
    /// will simply keep seeing "not logged in".
    async fn mark_nut_logged_in(
        &self,
        nut: &str,
        identity_key: &IdentityKey,
    ) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> IdentityKey {
        IdentityKey::new([byte; 32])
    }

    #[test]
    fn test_retire_key_appends() {
        let mut record = IdentityRecord::new(key(1));
        record.retire_key(key(2));
        record.retire_key(key(3));
        assert_eq!(record.previous_identity_keys, vec![key(2), key(3)]);
    }

    #[test]
    fn test_retire_key_caps_oldest_first() {
        let mut record = IdentityRecord::new(key(0));
        for byte in 1..=5 {
            record.retire_key(key(byte));
        }
        assert_eq!(
            record.previous_identity_keys,
            vec![key(2), key(3), key(4), key(5)]
        );
    }

    #[test]
    fn test_retire_key_deduplicates() {
        let mut record = IdentityRecord::new(key(0));
        record.retire_key(key(1));
        record.retire_key(key(2));
        record.retire_key(key(1));
        assert_eq!(record.previous_identity_keys, vec![key(2), key(1)]);
    }

    #[test]
    fn test_login_nut_resolution() {
        let first = NutRecord::new("abc", None);
        assert_eq!(first.login_nut(), "abc");

        let followup = NutRecord::new("def", Some("abc".to_string()));
        assert_eq!(followup.login_nut(), "abc");
    }
}
