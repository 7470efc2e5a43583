//! Server response model and body codec.
//!
//! Every server reply is one wire envelope with `ver`, `nut`, `tif`, and
//! `qry` always present, plus optional `url`, `can`, `sin`, `suk`, `sfn`,
//! and `ask` fields. The encoded body doubles as the `server` echo the
//! client signs over on its next request.

use sqrl_core::{KeyError, Tif, UnlockKey};
use thiserror::Error;

use crate::wire::{
    decode_fields, encode_fields, expand_versions, format_versions, Ask, WireError,
};

/// Error parsing a server response body.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The envelope failed to decode
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// A required field is absent
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The `tif` field is not valid hex
    #[error("Invalid tif field: {0:?}")]
    InvalidTif(String),

    /// The `suk` field failed to decode
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

/// A server response, constructed once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    /// Protocol versions the server supports
    pub versions: Vec<u32>,
    /// Fresh nut for the client's next request
    pub nut: String,
    /// Transaction information flags
    pub tif: Tif,
    /// Path and query of the next request endpoint
    pub query_path: String,
    /// Post-login redirect URL (CPS flow)
    pub redirect_url: Option<String>,
    /// Cancellation redirect URL
    pub cancel_url: Option<String>,
    /// Secret index request
    pub secret_index: Option<String>,
    /// Stored server unlock key, echoed on request
    pub server_unlock_key: Option<UnlockKey>,
    /// Server friendly name
    pub server_friendly_name: Option<String>,
    /// Dialog the server asks the client to present
    pub ask: Option<Ask>,
}

impl ServerResponse {
    /// Creates a response with only the required fields set.
    pub fn new(versions: Vec<u32>, nut: impl Into<String>, tif: Tif, query_path: impl Into<String>) -> Self {
        Self {
            versions,
            nut: nut.into(),
            tif,
            query_path: query_path.into(),
            redirect_url: None,
            cancel_url: None,
            secret_index: None,
            server_unlock_key: None,
            server_friendly_name: None,
            ask: None,
        }
    }

    /// Encodes the response body (base64url envelope).
    ///
    /// Field order is fixed: `ver`, `nut`, `tif`, `qry`, then optional
    /// fields in the order `url`, `can`, `sin`, `suk`, `sfn`, `ask`.
    pub fn to_body(&self) -> String {
        let mut pairs: Vec<(&str, String)> = vec![
            ("ver", format_versions(&self.versions)),
            ("nut", self.nut.clone()),
            ("tif", self.tif.to_hex()),
            ("qry", self.query_path.clone()),
        ];

        if let Some(url) = &self.redirect_url {
            pairs.push(("url", url.clone()));
        }
        if let Some(can) = &self.cancel_url {
            pairs.push(("can", can.clone()));
        }
        if let Some(sin) = &self.secret_index {
            pairs.push(("sin", sin.clone()));
        }
        if let Some(suk) = &self.server_unlock_key {
            pairs.push(("suk", suk.to_base64url()));
        }
        if let Some(sfn) = &self.server_friendly_name {
            pairs.push(("sfn", sfn.clone()));
        }
        if let Some(ask) = &self.ask {
            pairs.push(("ask", ask.render()));
        }

        encode_fields(&pairs)
    }

    /// Parses a response body as a client would.
    ///
    /// `ver`, `nut`, `tif`, and `qry` are required.
    pub fn from_body(body: &str) -> Result<Self, ResponseError> {
        let fields = decode_fields(body)?;

        let versions = match fields.get("ver") {
            Some(ver) => expand_versions(ver)?,
            None => return Err(ResponseError::MissingField("ver")),
        };
        let nut = fields
            .get("nut")
            .ok_or(ResponseError::MissingField("nut"))?
            .to_string();
        let tif_raw = fields.get("tif").ok_or(ResponseError::MissingField("tif"))?;
        let tif = Tif::from_hex(tif_raw).map_err(|_| ResponseError::InvalidTif(tif_raw.to_string()))?;
        let query_path = fields
            .get("qry")
            .ok_or(ResponseError::MissingField("qry"))?
            .to_string();

        let server_unlock_key = fields
            .get("suk")
            .map(UnlockKey::from_base64url)
            .transpose()?;

        Ok(Self {
            versions,
            nut,
            tif,
            query_path,
            redirect_url: fields.get("url").map(String::from),
            cancel_url: fields.get("can").map(String::from),
            secret_index: fields.get("sin").map(String::from),
            server_unlock_key,
            server_friendly_name: fields.get("sfn").map(String::from),
            ask: fields.get("ask").map(Ask::parse),
        })
    }
}
