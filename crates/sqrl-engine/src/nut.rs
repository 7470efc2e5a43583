//! Nut issuance and lifecycle.
//!
//! A nut is an opaque single-use server nonce embedded in the login URL.
//! The browser polls the nut it was shown; the authenticating device may
//! be handed fresher nuts mid-conversation, each linked back to the
//! original through `original_login_nut`.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{CryptoRng, RngCore};
use sqrl_core::IdentityKey;
use tracing::debug;

use crate::storage::{NutRecord, Storage, StorageError};

/// Generates a fresh nut: 16 random bytes, base64url without padding.
pub fn generate_nut<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Result of polling a nut, consumed by the web layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Unknown or expired nut
    NotFound,
    /// Issued but not yet authenticated
    Pending,
    /// Authentication completed by this identity
    LoggedIn(IdentityKey),
}

/// Nut lifecycle operations over the storage collaborator.
#[derive(Clone)]
pub struct NutManager {
    storage: Arc<dyn Storage>,
}

impl NutManager {
    /// Creates a manager over the given storage.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Issues a nut, optionally linked to the conversation's original
    /// login nut.
    pub async fn issue(
        &self,
        nut: &str,
        original_login_nut: Option<&str>,
    ) -> Result<(), StorageError> {
        self.storage
            .issue_nut(NutRecord::new(
                nut,
                original_login_nut.map(str::to_string),
            ))
            .await
    }

    /// Looks up a nut record.
    pub async fn lookup(&self, nut: &str) -> Result<Option<NutRecord>, StorageError> {
        self.storage.lookup_nut(nut).await
    }

    /// Completes login for the conversation this nut belongs to.
    ///
    /// Resolves the record's `original_login_nut` so the nut the browser
    /// polls is the one marked, then records the authenticated identity.
    /// An unknown nut is a silent no-op: it expired mid-flight and the
    /// poller keeps seeing "pending" until it, too, gives up.
    pub async fn complete_login(
        &self,
        nut: &str,
        identity_key: &IdentityKey,
    ) -> Result<(), StorageError> {
        let Some(record) = self.storage.lookup_nut(nut).await? else {
            debug!(nut = %nut, "Login completion on vanished nut skipped");
            return Ok(());
        };

        let login_nut = record.login_nut().to_string();
        debug!(nut = %nut, login_nut = %login_nut, identity = %identity_key, "Completing login");
        self.storage
            .mark_nut_logged_in(&login_nut, identity_key)
            .await
    }

    /// Polls a nut on behalf of the waiting browser.
    pub async fn poll(&self, nut: &str) -> Result<PollOutcome, StorageError> {
        Ok(match self.storage.lookup_nut(nut).await? {
            None => PollOutcome::NotFound,
            Some(record) if record.logged_in => match record.client_identity_key {
                Some(key) => PollOutcome::LoggedIn(key),
                // logged_in is only ever set together with the key; treat
                // an inconsistent record as still pending.
                None => PollOutcome::Pending,
            },
            Some(_) => PollOutcome::Pending,
        })
    }
}
