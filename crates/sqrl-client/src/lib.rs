//! SQRL Client - client-side simulation of the protocol.
//!
//! Models the authenticating device: it holds the per-site Ed25519
//! keypair (and, after a rekey, the previous one), builds signed POST
//! bodies for the five command verbs, and follows the `nut`/`qry` chain
//! through server responses.
//!
//! Randomness is always injected by the caller; nothing here reaches for
//! a global RNG.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use zeroize::Zeroize;

use sqrl_core::crypto::{generate_keypair, sign_ed25519};
use sqrl_core::{IdentityKey, RequestSignature, UnlockKey, VerifyUnlockKey, PROTOCOL_VERSION};
use sqrl_proto::wire::{encode_fields, format_versions};
use sqrl_proto::{OptionFlags, PostBody, ResponseError, ServerResponse, SqrlCommand};

pub use sqrl_proto::url::contact_url;

/// Error on the client side of a conversation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The login URL carries no `nut=` parameter
    #[error("Login URL has no nut parameter: {0:?}")]
    MissingNut(String),

    /// The server response failed to parse
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),
}

/// Per-site client identity: the current signing keypair, the previous
/// one after a rekey, and the unlock keys offered at association time.
pub struct ClientIdentity {
    secret: [u8; 32],
    public: IdentityKey,
    previous_secret: Option<[u8; 32]>,
    previous_public: Option<IdentityKey>,
    unlock_key: UnlockKey,
    verify_unlock_key: VerifyUnlockKey,
}

impl ClientIdentity {
    /// Generates a fresh identity from the provided randomness source.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let (secret, public) = generate_keypair(rng);

        // The unlock keypair's public halves are offered to the server at
        // association time.
        // TODO: retain the unlock signing key once urs signing lands.
        let mut unlock = [0u8; 32];
        rng.fill_bytes(&mut unlock);
        let (_, verify_unlock) = generate_keypair(rng);

        Self {
            secret,
            public: IdentityKey::new(public),
            previous_secret: None,
            previous_public: None,
            unlock_key: UnlockKey::new(unlock),
            verify_unlock_key: VerifyUnlockKey::new(verify_unlock),
        }
    }

    /// Replaces the current keypair with a fresh one, retiring the
    /// current key into the previous slot.
    pub fn rekey<R: RngCore + CryptoRng>(&mut self, rng: &mut R) {
        let (secret, public) = generate_keypair(rng);
        if let Some(mut old) = self.previous_secret.replace(self.secret) {
            old.zeroize();
        }
        self.previous_public = Some(self.public);
        self.secret = secret;
        self.public = IdentityKey::new(public);
    }

    /// Returns the current identity public key.
    pub fn identity_key(&self) -> IdentityKey {
        self.public
    }

    /// Returns the previous identity public key, if any.
    pub fn previous_identity_key(&self) -> Option<IdentityKey> {
        self.previous_public
    }

    /// Returns the server unlock key offered at association.
    pub fn unlock_key(&self) -> UnlockKey {
        self.unlock_key
    }

    /// Returns the verify unlock key offered at association.
    pub fn verify_unlock_key(&self) -> VerifyUnlockKey {
        self.verify_unlock_key
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("public", &self.public)
            .field("previous_public", &self.previous_public)
            .finish_non_exhaustive()
    }
}

/// Zeroizes secret key material on drop.
impl Drop for ClientIdentity {
    fn drop(&mut self) {
        self.secret.zeroize();
        if let Some(secret) = &mut self.previous_secret {
            secret.zeroize();
        }
    }
}

/// State of one login conversation with a site.
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Value of the next request's `server` field: the login URL on the
    /// first round, the previous response body afterwards
    server_blob: String,
    /// Nut addressed by the next request
    nut: String,
    /// Path and query of the next request endpoint
    query_path: String,
    /// The most recently absorbed response
    last_response: Option<ServerResponse>,
}

impl ClientSession {
    /// Returns the nut the next request addresses.
    pub fn nut(&self) -> &str {
        &self.nut
    }

    /// Returns the path and query of the next request endpoint.
    pub fn query_path(&self) -> &str {
        &self.query_path
    }

    /// Returns the most recently absorbed response.
    pub fn last_response(&self) -> Option<&ServerResponse> {
        self.last_response.as_ref()
    }
}

/// The simulated client device.
pub struct SqrlClient {
    identity: ClientIdentity,
}

impl SqrlClient {
    /// Creates a client around an identity.
    pub fn new(identity: ClientIdentity) -> Self {
        Self { identity }
    }

    /// Generates a client with a fresh identity.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::new(ClientIdentity::generate(rng))
    }

    /// Returns the client identity.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Returns the client identity for rekeying.
    pub fn identity_mut(&mut self) -> &mut ClientIdentity {
        &mut self.identity
    }

    /// Starts a conversation from a scanned login URL.
    ///
    /// The first request's `server` field carries the base64url-encoded
    /// login URL exactly as displayed.
    pub fn begin(&self, login_url: &str) -> Result<ClientSession, ClientError> {
        let nut = extract_nut(login_url)
            .ok_or_else(|| ClientError::MissingNut(login_url.to_string()))?;

        let after_scheme = login_url.find("://").map(|i| i + 3).unwrap_or(0);
        let path_start = login_url[after_scheme..]
            .find('/')
            .map(|p| after_scheme + p);
        let query_start = login_url.find('?');

        let path = match (path_start, query_start) {
            (Some(p), Some(q)) if p < q => &login_url[p..q],
            (Some(p), None) => &login_url[p..],
            _ => "",
        };
        let query = query_start.map(|q| &login_url[q..]).unwrap_or("");

        Ok(ClientSession {
            server_blob: URL_SAFE_NO_PAD.encode(login_url.as_bytes()),
            nut,
            query_path: format!("{}{}", path, query),
            last_response: None,
        })
    }

    /// Builds a signed POST body for a command.
    pub fn build_request(
        &self,
        session: &ClientSession,
        command: SqrlCommand,
        options: OptionFlags,
    ) -> PostBody {
        self.build(session, command, options, None)
    }

    /// Builds a signed POST body answering a server ask with a button.
    pub fn answer_ask(
        &self,
        session: &ClientSession,
        command: SqrlCommand,
        options: OptionFlags,
        button: u8,
    ) -> PostBody {
        self.build(session, command, options, Some(button))
    }

    fn build(
        &self,
        session: &ClientSession,
        command: SqrlCommand,
        options: OptionFlags,
        button: Option<u8>,
    ) -> PostBody {
        let mut pairs: Vec<(&str, String)> = vec![
            ("ver", format_versions(&[PROTOCOL_VERSION])),
            ("cmd", command.as_str().to_string()),
            ("idk", self.identity.public.to_base64url()),
        ];

        if let Some(previous) = &self.identity.previous_public {
            pairs.push(("pidk", previous.to_base64url()));
        }
        if command == SqrlCommand::Ident {
            pairs.push(("suk", self.identity.unlock_key.to_base64url()));
            pairs.push(("vuk", self.identity.verify_unlock_key.to_base64url()));
        }
        if let Some(opt) = options.render() {
            pairs.push(("opt", opt));
        }
        if let Some(button) = button {
            pairs.push(("btn", button.to_string()));
        }

        let client = encode_fields(&pairs);

        let mut payload = Vec::with_capacity(client.len() + session.server_blob.len());
        payload.extend_from_slice(client.as_bytes());
        payload.extend_from_slice(session.server_blob.as_bytes());

        let ids = RequestSignature::new(sign_ed25519(&self.identity.secret, &payload));
        let pids = self
            .identity
            .previous_secret
            .as_ref()
            .map(|secret| RequestSignature::new(sign_ed25519(secret, &payload)));

        PostBody {
            client,
            server: session.server_blob.clone(),
            ids: ids.to_base64url(),
            pids: pids.map(|p| p.to_base64url()),
            urs: None,
        }
    }

    /// Absorbs a server response body into the session: the next request
    /// will address the fresh nut and echo this body verbatim.
    pub fn absorb<'s>(
        &self,
        session: &'s mut ClientSession,
        response_body: &str,
    ) -> Result<&'s ServerResponse, ClientError> {
        let response = ServerResponse::from_body(response_body)?;

        session.server_blob = response_body.to_string();
        session.nut = response.nut.clone();
        session.query_path = response.query_path.clone();

        Ok(session.last_response.insert(response))
    }
}

/// Extracts the `nut=` parameter from a login URL's query string.
fn extract_nut(url: &str) -> Option<String> {
    let query = &url[url.find('?')? + 1..];
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("nut="))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use sqrl_proto::ClientRequest;

    const LOGIN_URL: &str = "sqrl://example.com/sqrl?nut=abc123&sfn=RXhhbXBsZQ";

    #[test]
    fn test_begin_extracts_nut_and_path() {
        let client = SqrlClient::generate(&mut OsRng);
        let session = client.begin(LOGIN_URL).unwrap();

        assert_eq!(session.nut(), "abc123");
        assert_eq!(session.query_path(), "/sqrl?nut=abc123&sfn=RXhhbXBsZQ");
        assert_eq!(
            session.server_blob,
            URL_SAFE_NO_PAD.encode(LOGIN_URL.as_bytes())
        );
    }

    #[test]
    fn test_begin_requires_nut() {
        let client = SqrlClient::generate(&mut OsRng);
        assert!(matches!(
            client.begin("sqrl://example.com/sqrl"),
            Err(ClientError::MissingNut(_))
        ));
    }

    #[test]
    fn test_build_request_verifies() {
        let client = SqrlClient::generate(&mut OsRng);
        let session = client.begin(LOGIN_URL).unwrap();

        let body = client.build_request(&session, SqrlCommand::Query, OptionFlags::default());
        let request = ClientRequest::from_post(&body).unwrap();

        assert_eq!(request.command, SqrlCommand::Query);
        assert_eq!(request.identity_key, client.identity().identity_key());
        assert!(request.verify_primary());
        assert!(!request.verify_previous());
    }

    #[test]
    fn test_ident_carries_unlock_keys() {
        let client = SqrlClient::generate(&mut OsRng);
        let session = client.begin(LOGIN_URL).unwrap();

        let body = client.build_request(&session, SqrlCommand::Ident, OptionFlags::default());
        let request = ClientRequest::from_post(&body).unwrap();

        assert_eq!(
            request.server_unlock_key,
            Some(client.identity().unlock_key())
        );
        assert_eq!(
            request.verify_unlock_key,
            Some(client.identity().verify_unlock_key())
        );
    }

    #[test]
    fn test_rekey_produces_verifying_previous_signature() {
        let mut client = SqrlClient::generate(&mut OsRng);
        let old_key = client.identity().identity_key();
        client.identity_mut().rekey(&mut OsRng);

        assert_eq!(client.identity().previous_identity_key(), Some(old_key));
        assert_ne!(client.identity().identity_key(), old_key);

        let session = client.begin(LOGIN_URL).unwrap();
        let body = client.build_request(&session, SqrlCommand::Ident, OptionFlags::default());
        let request = ClientRequest::from_post(&body).unwrap();

        assert_eq!(request.previous_identity_key, Some(old_key));
        assert!(request.verify_primary());
        assert!(request.verify_previous());
    }

    #[test]
    fn test_absorb_advances_session() {
        let client = SqrlClient::generate(&mut OsRng);
        let mut session = client.begin(LOGIN_URL).unwrap();

        let response = ServerResponse::new(
            vec![1],
            "nut456",
            sqrl_core::Tif::NONE,
            "/sqrl?nut=nut456",
        );
        let body = response.to_body();

        client.absorb(&mut session, &body).unwrap();
        assert_eq!(session.nut(), "nut456");
        assert_eq!(session.query_path(), "/sqrl?nut=nut456");
        assert_eq!(session.server_blob, body);
    }

    #[test]
    fn test_answer_ask_includes_button() {
        let client = SqrlClient::generate(&mut OsRng);
        let session = client.begin(LOGIN_URL).unwrap();

        let body = client.answer_ask(&session, SqrlCommand::Query, OptionFlags::default(), 1);
        let request = ClientRequest::from_post(&body).unwrap();
        assert_eq!(request.ask_response, Some(1));
    }
}
