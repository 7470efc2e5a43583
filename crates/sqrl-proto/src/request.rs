//! Parsed client request model.
//!
//! A client POST carries five fields: `client` (the signed payload),
//! `server` (an opaque echo of the previous server response), `ids`
//! (primary signature), and optionally `pids` (previous-identity
//! signature) and `urs` (unlock request signature, tolerated but not
//! verified here).

use sqrl_core::crypto::verify_ed25519;
use sqrl_core::{IdentityKey, KeyError, RequestSignature, UnlockKey, VerifyUnlockKey};
use thiserror::Error;

use crate::wire::{decode_fields, expand_versions, WireError};

/// Error parsing a client request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The `client` payload failed to decode
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// A required field is absent
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The `cmd` verb is not one this server implements
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    /// A key or signature failed to decode
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

/// The five SQRL command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqrlCommand {
    /// Read-only identity lookup
    Query,
    /// Authenticate, creating or rotating the identity as needed
    Ident,
    /// Disable SQRL authentication for the identity
    Disable,
    /// Re-enable SQRL authentication
    Enable,
    /// Remove the identity association
    Remove,
}

impl SqrlCommand {
    /// Parses a `cmd` field value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "query" => Some(SqrlCommand::Query),
            "ident" => Some(SqrlCommand::Ident),
            "disable" => Some(SqrlCommand::Disable),
            "enable" => Some(SqrlCommand::Enable),
            "remove" => Some(SqrlCommand::Remove),
            _ => None,
        }
    }

    /// Returns the verb as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            SqrlCommand::Query => "query",
            SqrlCommand::Ident => "ident",
            SqrlCommand::Disable => "disable",
            SqrlCommand::Enable => "enable",
            SqrlCommand::Remove => "remove",
        }
    }
}

/// Client option flags (`opt` field, tilde-separated tokens).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionFlags {
    /// `sqrlonly` - only SQRL may authenticate this identity
    pub sqrl_identity_only: bool,
    /// `hardlock` - disallow out-of-band identity recovery
    pub hard_lock: bool,
    /// `cps` - client requests a direct post-login redirect URL
    pub client_provided_session: bool,
    /// `suk` - client asks for the stored server unlock key
    pub return_session_unlock_key: bool,
}

impl OptionFlags {
    /// Parses an `opt` field value. Unknown tokens are ignored.
    pub fn parse(opt: &str) -> Self {
        let mut flags = Self::default();
        for token in opt.split('~') {
            match token {
                "sqrlonly" => flags.sqrl_identity_only = true,
                "hardlock" => flags.hard_lock = true,
                "cps" => flags.client_provided_session = true,
                "suk" => flags.return_session_unlock_key = true,
                _ => {}
            }
        }
        flags
    }

    /// Renders the `opt` field value; `None` when no flag is set.
    pub fn render(&self) -> Option<String> {
        let mut tokens = Vec::new();
        if self.sqrl_identity_only {
            tokens.push("sqrlonly");
        }
        if self.hard_lock {
            tokens.push("hardlock");
        }
        if self.client_provided_session {
            tokens.push("cps");
        }
        if self.return_session_unlock_key {
            tokens.push("suk");
        }
        if tokens.is_empty() {
            None
        } else {
            Some(tokens.join("~"))
        }
    }
}

/// Raw POST body fields as received from the transport layer.
#[derive(Debug, Clone)]
pub struct PostBody {
    /// The client's signed payload, base64url
    pub client: String,
    /// Echo of the prior server response, base64url, opaque here
    pub server: String,
    /// Primary identity signature, base64url
    pub ids: String,
    /// Previous identity signature, base64url
    pub pids: Option<String>,
    /// Unlock request signature, base64url; carried but not verified
    pub urs: Option<String>,
}

/// A fully parsed client request.
///
/// Built once per inbound POST and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    /// Protocol versions the client supports, expanded from ranges
    pub versions: Vec<u32>,
    /// The command verb
    pub command: SqrlCommand,
    /// Current identity public key (`idk`)
    pub identity_key: IdentityKey,
    /// Previous identity public key (`pidk`)
    pub previous_identity_key: Option<IdentityKey>,
    /// Server unlock key offered by the client (`suk`)
    pub server_unlock_key: Option<UnlockKey>,
    /// Verify unlock key offered by the client (`vuk`)
    pub verify_unlock_key: Option<VerifyUnlockKey>,
    /// Option flags
    pub options: OptionFlags,
    /// Ask dialog answer (`btn`), when the client is responding to an ask
    pub ask_response: Option<u8>,
    /// The literal `client` base64url string, kept for signature checks
    pub client: String,
    /// The literal `server` base64url string, kept for signature checks
    pub server: String,
    /// Primary identity signature
    pub ids: RequestSignature,
    /// Previous identity signature
    pub pids: Option<RequestSignature>,
}

impl ClientRequest {
    /// Parses the POST fields into a request.
    ///
    /// `client`, `server`, and `ids` must be present; within the decoded
    /// `client` payload, `ver`, `cmd`, and `idk` are required.
    pub fn from_post(post: &PostBody) -> Result<Self, RequestError> {
        let fields = decode_fields(&post.client)?;

        let ver = fields.get("ver").ok_or(RequestError::MissingField("ver"))?;
        let versions = expand_versions(ver)?;

        let cmd = fields.get("cmd").ok_or(RequestError::MissingField("cmd"))?;
        let command =
            SqrlCommand::parse(cmd).ok_or_else(|| RequestError::UnknownCommand(cmd.to_string()))?;

        let idk = fields.get("idk").ok_or(RequestError::MissingField("idk"))?;
        let identity_key = IdentityKey::from_base64url(idk)?;

        let previous_identity_key = fields
            .get("pidk")
            .map(IdentityKey::from_base64url)
            .transpose()?;
        let server_unlock_key = fields
            .get("suk")
            .map(UnlockKey::from_base64url)
            .transpose()?;
        let verify_unlock_key = fields
            .get("vuk")
            .map(VerifyUnlockKey::from_base64url)
            .transpose()?;

        let options = fields.get("opt").map(OptionFlags::parse).unwrap_or_default();
        let ask_response = fields.get("btn").and_then(|b| b.parse().ok());

        let ids = RequestSignature::from_base64url(&post.ids)?;
        let pids = post
            .pids
            .as_deref()
            .map(RequestSignature::from_base64url)
            .transpose()?;

        Ok(Self {
            versions,
            command,
            identity_key,
            previous_identity_key,
            server_unlock_key,
            verify_unlock_key,
            options,
            ask_response,
            client: post.client.clone(),
            server: post.server.clone(),
            ids,
            pids,
        })
    }

    /// The exact bytes every request signature covers: the literal
    /// `client` string immediately followed by the literal `server`
    /// string, no separator.
    pub fn signed_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.client.len() + self.server.len());
        payload.extend_from_slice(self.client.as_bytes());
        payload.extend_from_slice(self.server.as_bytes());
        payload
    }

    /// Verifies the primary signature (`ids`) against `idk`.
    pub fn verify_primary(&self) -> bool {
        verify_ed25519(
            self.identity_key.as_slice(),
            &self.signed_payload(),
            &self.ids.0,
        )
        .is_ok()
    }

    /// Verifies the previous-identity signature (`pids`) against `pidk`.
    ///
    /// Returns false when either is absent or verification fails; a
    /// failing previous round degrades to "no previous key presented"
    /// rather than aborting the request.
    pub fn verify_previous(&self) -> bool {
        match (&self.previous_identity_key, &self.pids) {
            (Some(pidk), Some(pids)) => {
                verify_ed25519(pidk.as_slice(), &self.signed_payload(), &pids.0).is_ok()
            }
            _ => false,
        }
    }
}
