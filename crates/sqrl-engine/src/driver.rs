//! Protocol driver.
//!
//! Sequences one inbound POST through the engine: decode the wire body,
//! verify signatures, run the identity state machine, update nut state,
//! and encode the response. Every failure short-circuits into a TIF
//! combination; identity and nut mutations happen only after the primary
//! signature verifies.

use rand::{CryptoRng, RngCore};
use std::sync::Arc;

use sqrl_core::{Tif, SUPPORTED_VERSIONS};
use sqrl_proto::{
    Ask, ClientRequest, PostBody, RequestError, ServerResponse, SqrlCommand, SqrlUrl,
};
use tracing::{debug, warn};

use crate::identity::{CommandOutcome, EngineError, IdentityEngine};
use crate::nut::{generate_nut, NutManager, PollOutcome};
use crate::storage::{Storage, StorageError};

/// Site-level driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Whether login URLs use the `sqrl` (https-backed) scheme
    pub secure: bool,
    /// Authentication domain embedded in login URLs
    pub domain: String,
    /// Path of the protocol endpoint, e.g. `/sqrl`
    pub path: String,
    /// Server friendly name shown by clients
    pub server_friendly_name: Option<String>,
    /// Post-login redirect returned to CPS clients
    pub success_url: Option<String>,
    /// Cancellation redirect returned to CPS clients
    pub cancel_url: Option<String>,
    /// Dialog attached to `query` responses, when the site wants one
    pub ask: Option<Ask>,
}

impl DriverConfig {
    /// Creates a configuration for a domain with the default endpoint path.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            secure: true,
            domain: domain.into(),
            path: "/sqrl".to_string(),
            server_friendly_name: None,
            success_url: None,
            cancel_url: None,
            ask: None,
        }
    }
}

/// One inbound protocol POST, as narrowed down by the transport layer.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// The nut from the request's query string
    pub nut: String,
    /// The POST body fields
    pub body: PostBody,
    /// TIF bits computed by the surrounding session layer (IP match,
    /// disabled flag, association checks), merged into the response
    pub ambient_tif: Tif,
}

/// A freshly issued login URL and its nut.
#[derive(Debug, Clone)]
pub struct IssuedLogin {
    /// The full SQRL URL to present as link or QR code
    pub url: String,
    /// The nut embedded in it, which the browser polls
    pub nut: String,
}

/// The protocol driver.
pub struct ProtocolDriver {
    config: DriverConfig,
    nuts: NutManager,
    engine: IdentityEngine,
}

impl ProtocolDriver {
    /// Creates a driver over the given storage.
    pub fn new(config: DriverConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            nuts: NutManager::new(storage.clone()),
            engine: IdentityEngine::new(storage),
        }
    }

    /// Returns the nut manager, for pollers and maintenance.
    pub fn nuts(&self) -> &NutManager {
        &self.nuts
    }

    /// Issues a new login URL for display to a browser.
    pub async fn issue_login_url<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<IssuedLogin, StorageError> {
        let nut = generate_nut(rng);
        self.nuts.issue(&nut, None).await?;

        let mut url = SqrlUrl::new(self.config.secure, &self.config.domain, &nut)
            .with_path(&self.config.path);
        if let Some(sfn) = &self.config.server_friendly_name {
            url = url.with_friendly_name(sfn);
        }

        debug!(nut = %nut, "Issued login URL");
        Ok(IssuedLogin {
            url: url.to_url(),
            nut,
        })
    }

    /// Polls a login nut on behalf of the waiting browser.
    pub async fn poll(&self, nut: &str) -> Result<PollOutcome, StorageError> {
        self.nuts.poll(nut).await
    }

    /// Handles one protocol POST.
    ///
    /// Storage failures propagate as errors; everything else becomes a
    /// response whose TIF bits describe the outcome.
    pub async fn handle<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        inbound: InboundRequest,
    ) -> Result<ServerResponse, StorageError> {
        // Resolve the conversation this POST belongs to. The chain root is
        // what follow-up nuts link back to.
        let nut_record = self.nuts.lookup(&inbound.nut).await?;
        let chain_root = nut_record
            .as_ref()
            .map(|record| record.login_nut().to_string())
            .unwrap_or_else(|| inbound.nut.clone());

        let request = match ClientRequest::from_post(&inbound.body) {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, "Rejected malformed client request");
                let tif = match error {
                    RequestError::UnknownCommand(_) => {
                        Tif::FUNCTION_NOT_SUPPORTED | Tif::COMMAND_FAILED
                    }
                    _ => Tif::CLIENT_FAILURE | Tif::COMMAND_FAILED,
                };
                return self.respond(rng, &chain_root, tif, inbound.ambient_tif, None).await;
            }
        };

        // Signature failure is fatal for the request; nothing below this
        // point runs without a verified primary signature.
        if !request.verify_primary() {
            warn!(identity = %request.identity_key, "Primary signature verification failed");
            return self
                .respond(
                    rng,
                    &chain_root,
                    Tif::CLIENT_FAILURE | Tif::COMMAND_FAILED,
                    inbound.ambient_tif,
                    None,
                )
                .await;
        }
        let previous_verified = request.verify_previous();

        // The request must belong to a live conversation.
        if nut_record.is_none() {
            debug!(nut = %inbound.nut, "POST for unknown or expired nut");
            return self
                .respond(
                    rng,
                    &chain_root,
                    Tif::TRANSIENT_ERROR | Tif::COMMAND_FAILED,
                    inbound.ambient_tif,
                    None,
                )
                .await;
        }

        match self.engine.run(&request, previous_verified).await {
            Ok(outcome) => {
                if let Some(login_key) = &outcome.login_key {
                    self.nuts.complete_login(&inbound.nut, login_key).await?;
                }
                self.respond_success(rng, &chain_root, &request, outcome, inbound.ambient_tif)
                    .await
            }
            Err(EngineError::IdentityNotFound) => {
                self.respond(
                    rng,
                    &chain_root,
                    Tif::CLIENT_FAILURE | Tif::COMMAND_FAILED,
                    inbound.ambient_tif,
                    None,
                )
                .await
            }
            Err(EngineError::Storage(error)) => Err(error),
        }
    }

    /// Issues the next nut and assembles a response around it.
    async fn respond<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        chain_root: &str,
        tif: Tif,
        ambient_tif: Tif,
        outcome: Option<&CommandOutcome>,
    ) -> Result<ServerResponse, StorageError> {
        let next_nut = generate_nut(rng);
        self.nuts.issue(&next_nut, Some(chain_root)).await?;

        let query_path = format!("{}?nut={}", self.config.path, next_nut);
        let mut response = ServerResponse::new(
            SUPPORTED_VERSIONS.to_vec(),
            next_nut,
            tif | ambient_tif,
            query_path,
        );
        response.server_friendly_name = self.config.server_friendly_name.clone();
        if let Some(outcome) = outcome {
            response.server_unlock_key = outcome.server_unlock_key;
        }

        Ok(response)
    }

    /// Assembles the response for a command the engine accepted.
    async fn respond_success<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        chain_root: &str,
        request: &ClientRequest,
        outcome: CommandOutcome,
        ambient_tif: Tif,
    ) -> Result<ServerResponse, StorageError> {
        let mut response = self
            .respond(rng, chain_root, outcome.tif, ambient_tif, Some(&outcome))
            .await?;

        match request.command {
            SqrlCommand::Query => {
                response.ask = self.config.ask.clone();
            }
            SqrlCommand::Ident => {
                if request.options.client_provided_session && outcome.login_key.is_some() {
                    response.redirect_url = self.config.success_url.clone();
                    response.cancel_url = self.config.cancel_url.clone();
                }
            }
            _ => {}
        }

        Ok(response)
    }
}
