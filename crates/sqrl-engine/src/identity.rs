//! TIF computation and the per-command identity state machine.
//!
//! One combined lookup decides whether the request's current or previous
//! key matches a stored identity; the command then drives creation,
//! rotation, or acknowledgement. Callers must have verified the request's
//! primary signature before invoking the engine - nothing here mutates
//! state for an unverified request.

use std::sync::Arc;

use sqrl_core::{IdentityKey, Tif, UnlockKey};
use sqrl_proto::{ClientRequest, SqrlCommand};
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{
    IdentityMatch, IdentityRecord, RotationRequest, Storage, StorageError,
};

/// Error from the identity engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A command that requires an existing identity found none
    #[error("No stored identity matches the request keys")]
    IdentityNotFound,

    /// Storage failure, propagated unchanged
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// What a command produced: the TIF bits it earned, an optional unlock
/// key to echo, and - for a successful `ident` - the identity key the
/// conversation's nut should be associated with.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Match and status bits earned by this command
    pub tif: Tif,
    /// Server unlock key to include in the response
    pub server_unlock_key: Option<UnlockKey>,
    /// Identity to mark the conversation's nut logged in with
    pub login_key: Option<IdentityKey>,
}

/// The TIF / identity-match engine.
#[derive(Clone)]
pub struct IdentityEngine {
    storage: Arc<dyn Storage>,
}

impl IdentityEngine {
    /// Creates an engine over the given storage.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Runs one command against storage.
    ///
    /// `previous_verified` reports whether the request's `pids` signature
    /// validated; an unverified previous key never participates in the
    /// lookup.
    pub async fn run(
        &self,
        request: &ClientRequest,
        previous_verified: bool,
    ) -> Result<CommandOutcome, EngineError> {
        let previous_key = if previous_verified {
            request.previous_identity_key.as_ref()
        } else {
            None
        };

        let found = self
            .storage
            .find_identity(&request.identity_key, previous_key)
            .await?;

        let match_tif = match &found {
            Some((_, IdentityMatch::Current)) => Tif::CURRENT_ID_MATCH,
            Some((_, IdentityMatch::Previous)) => Tif::PREVIOUS_ID_MATCH,
            None => Tif::NONE,
        };
        debug!(command = request.command.as_str(), tif = %match_tif, "Identity lookup");

        // A previous-key match always gets the stored unlock key back so
        // the client can run the unlock flow; otherwise it is returned
        // only on request.
        let previous_matched = matches!(found, Some((_, IdentityMatch::Previous)));
        let echo_suk = |record: &IdentityRecord| -> Option<UnlockKey> {
            if previous_matched || request.options.return_session_unlock_key {
                record.server_unlock_key
            } else {
                None
            }
        };

        match request.command {
            SqrlCommand::Query => Ok(CommandOutcome {
                tif: match_tif,
                server_unlock_key: found.as_ref().and_then(|(record, _)| echo_suk(record)),
                login_key: None,
            }),

            SqrlCommand::Ident => match found {
                None => {
                    let mut record = IdentityRecord::new(request.identity_key);
                    record.server_unlock_key = request.server_unlock_key;
                    record.verify_unlock_key = request.verify_unlock_key;
                    record.sqrl_identity_only = request.options.sqrl_identity_only;
                    record.hard_lock = request.options.hard_lock;

                    let record = self.storage.create_identity(record).await?;
                    info!(identity = %record.identity_key, "Created identity");

                    // Fresh identity: no match bits, mirroring first-time
                    // registration.
                    Ok(CommandOutcome {
                        tif: Tif::NONE,
                        server_unlock_key: None,
                        login_key: Some(record.identity_key),
                    })
                }

                Some((record, IdentityMatch::Previous)) => {
                    let suk = echo_suk(&record);
                    let rotated = self
                        .storage
                        .rotate_identity(RotationRequest {
                            old_key: record.identity_key,
                            new_key: request.identity_key,
                            server_unlock_key: request.server_unlock_key,
                            verify_unlock_key: request.verify_unlock_key,
                        })
                        .await?;
                    info!(
                        old = %record.identity_key,
                        new = %rotated.identity_key,
                        "Rotated identity to new key"
                    );

                    Ok(CommandOutcome {
                        tif: Tif::PREVIOUS_ID_MATCH,
                        server_unlock_key: suk,
                        login_key: Some(rotated.identity_key),
                    })
                }

                Some((record, IdentityMatch::Current)) => Ok(CommandOutcome {
                    tif: Tif::CURRENT_ID_MATCH,
                    server_unlock_key: echo_suk(&record),
                    login_key: Some(record.identity_key),
                }),
            },

            // Acknowledged at the engine level; the storage semantics of
            // disabling and removal belong to the surrounding service.
            SqrlCommand::Disable | SqrlCommand::Enable | SqrlCommand::Remove => match found {
                None => Err(EngineError::IdentityNotFound),
                Some((record, _)) => Ok(CommandOutcome {
                    tif: match_tif,
                    server_unlock_key: echo_suk(&record),
                    login_key: None,
                }),
            },
        }
    }
}
