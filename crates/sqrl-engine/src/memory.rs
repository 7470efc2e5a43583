//! In-memory storage implementation.
//!
//! Suitable for tests, simulations, and single-process deployments. Nut
//! expiry is enforced on lookup and reclaimed by the `expire` sweep; both
//! maps sit behind a single writer lock each, which gives the per-key
//! serialization the `Storage` contract requires.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqrl_core::{IdentityKey, NutTtl, Timestamp};
use tracing::{debug, warn};

use crate::storage::{
    IdentityMatch, IdentityRecord, NutRecord, RotationRequest, Storage, StorageError,
};

/// Configuration for the in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryStorageConfig {
    /// Nut lifetime
    pub nut_ttl: NutTtl,
    /// Enable expiry of old nuts
    pub expiration_enabled: bool,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            nut_ttl: NutTtl::default(),
            expiration_enabled: true,
        }
    }
}

/// In-memory nut and identity storage.
pub struct MemoryStorage {
    /// Issued nuts by nut value
    nuts: RwLock<HashMap<String, NutRecord>>,
    /// Identity associations by current primary key
    identities: RwLock<HashMap<IdentityKey, IdentityRecord>>,
    /// Configuration
    config: MemoryStorageConfig,
}

impl MemoryStorage {
    /// Creates a store with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryStorageConfig::default())
    }

    /// Creates a store with the given configuration.
    pub fn with_config(config: MemoryStorageConfig) -> Self {
        Self {
            nuts: RwLock::new(HashMap::new()),
            identities: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Returns true if the record is past its TTL.
    fn is_expired(&self, record: &NutRecord, now: Timestamp) -> bool {
        self.config.expiration_enabled && self.config.nut_ttl.is_expired(record.created_at, now)
    }

    /// Removes expired nut records.
    pub fn expire(&self) {
        if !self.config.expiration_enabled {
            return;
        }

        let now = Timestamp::now();
        let mut nuts = self.nuts.write();
        let before = nuts.len();
        nuts.retain(|_, record| !self.config.nut_ttl.is_expired(record.created_at, now));

        let removed = before - nuts.len();
        if removed > 0 {
            debug!(removed, remaining = nuts.len(), "Expired nut records");
        }
    }

    /// Returns the number of live nut records.
    pub fn nut_count(&self) -> usize {
        self.nuts.read().len()
    }

    /// Returns the number of stored identities.
    pub fn identity_count(&self) -> usize {
        self.identities.read().len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn issue_nut(&self, record: NutRecord) -> Result<(), StorageError> {
        debug!(nut = %record.nut, original = ?record.original_login_nut, "Issuing nut");
        self.nuts.write().insert(record.nut.clone(), record);
        Ok(())
    }

    async fn lookup_nut(&self, nut: &str) -> Result<Option<NutRecord>, StorageError> {
        let now = Timestamp::now();
        let nuts = self.nuts.read();
        Ok(nuts
            .get(nut)
            .filter(|record| !self.is_expired(record, now))
            .cloned())
    }

    async fn find_identity(
        &self,
        identity_key: &IdentityKey,
        previous_key: Option<&IdentityKey>,
    ) -> Result<Option<(IdentityRecord, IdentityMatch)>, StorageError> {
        let identities = self.identities.read();

        if let Some(record) = identities.get(identity_key) {
            return Ok(Some((record.clone(), IdentityMatch::Current)));
        }
        if let Some(previous) = previous_key {
            if let Some(record) = identities.get(previous) {
                return Ok(Some((record.clone(), IdentityMatch::Previous)));
            }
        }

        Ok(None)
    }

    async fn create_identity(&self, record: IdentityRecord) -> Result<IdentityRecord, StorageError> {
        debug!(identity = %record.identity_key, "Creating identity");
        self.identities
            .write()
            .insert(record.identity_key, record.clone());
        Ok(record)
    }

    async fn rotate_identity(
        &self,
        rotation: RotationRequest,
    ) -> Result<IdentityRecord, StorageError> {
        let mut identities = self.identities.write();

        let mut record = identities
            .remove(&rotation.old_key)
            .ok_or(StorageError::RotationSourceMissing)?;

        record.retire_key(rotation.old_key);
        record.identity_key = rotation.new_key;
        if rotation.server_unlock_key.is_some() {
            record.server_unlock_key = rotation.server_unlock_key;
        }
        if rotation.verify_unlock_key.is_some() {
            record.verify_unlock_key = rotation.verify_unlock_key;
        }

        debug!(
            old = %rotation.old_key,
            new = %record.identity_key,
            retired = record.previous_identity_keys.len(),
            "Rotated identity"
        );
        identities.insert(record.identity_key, record.clone());
        Ok(record)
    }

    async fn mark_nut_logged_in(
        &self,
        nut: &str,
        identity_key: &IdentityKey,
    ) -> Result<(), StorageError> {
        let mut nuts = self.nuts.write();
        match nuts.get_mut(nut) {
            Some(record) => {
                record.logged_in = true;
                record.client_identity_key = Some(*identity_key);
                debug!(nut = %nut, "Nut marked logged in");
            }
            None => {
                // Expired or evicted between issuance and completion; the
                // poller keeps seeing "not logged in".
                warn!(nut = %nut, "Login completion on unknown nut ignored");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(byte: u8) -> IdentityKey {
        IdentityKey::new([byte; 32])
    }

    #[tokio::test]
    async fn test_nut_issue_lookup() {
        let storage = MemoryStorage::new();
        storage.issue_nut(NutRecord::new("abc", None)).await.unwrap();

        let record = storage.lookup_nut("abc").await.unwrap().unwrap();
        assert!(!record.logged_in);
        assert!(record.client_identity_key.is_none());

        assert!(storage.lookup_nut("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_nut_behaves_as_absent() {
        let storage = MemoryStorage::with_config(MemoryStorageConfig {
            nut_ttl: NutTtl::new(Duration::from_millis(0)),
            expiration_enabled: true,
        });

        let mut record = NutRecord::new("abc", None);
        record.created_at = Timestamp::new(record.created_at.as_millis() - 1000);
        storage.issue_nut(record).await.unwrap();

        assert!(storage.lookup_nut("abc").await.unwrap().is_none());

        storage.expire();
        assert_eq!(storage.nut_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_logged_in() {
        let storage = MemoryStorage::new();
        storage.issue_nut(NutRecord::new("abc", None)).await.unwrap();
        storage.mark_nut_logged_in("abc", &key(1)).await.unwrap();

        let record = storage.lookup_nut("abc").await.unwrap().unwrap();
        assert!(record.logged_in);
        assert_eq!(record.client_identity_key, Some(key(1)));
    }

    #[tokio::test]
    async fn test_mark_logged_in_unknown_nut_is_noop() {
        let storage = MemoryStorage::new();
        assert!(storage.mark_nut_logged_in("ghost", &key(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_find_identity_current_then_previous() {
        let storage = MemoryStorage::new();
        storage
            .create_identity(IdentityRecord::new(key(1)))
            .await
            .unwrap();

        let (_, matched) = storage
            .find_identity(&key(1), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched, IdentityMatch::Current);

        let (_, matched) = storage
            .find_identity(&key(9), Some(&key(1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched, IdentityMatch::Previous);

        assert!(storage
            .find_identity(&key(9), Some(&key(8)))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rotate_identity_rekeys_map() {
        let storage = MemoryStorage::new();
        storage
            .create_identity(IdentityRecord::new(key(1)))
            .await
            .unwrap();

        let rotated = storage
            .rotate_identity(RotationRequest {
                old_key: key(1),
                new_key: key(2),
                server_unlock_key: None,
                verify_unlock_key: None,
            })
            .await
            .unwrap();

        assert_eq!(rotated.identity_key, key(2));
        assert_eq!(rotated.previous_identity_keys, vec![key(1)]);

        // Old key no longer matches as current; new key does.
        let (_, matched) = storage
            .find_identity(&key(2), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched, IdentityMatch::Current);
        assert!(storage.find_identity(&key(1), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_missing_source_errors() {
        let storage = MemoryStorage::new();
        let result = storage
            .rotate_identity(RotationRequest {
                old_key: key(1),
                new_key: key(2),
                server_unlock_key: None,
                verify_unlock_key: None,
            })
            .await;
        assert!(matches!(result, Err(StorageError::RotationSourceMissing)));
    }
}
