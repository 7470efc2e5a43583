//! The SQRL wire envelope.
//!
//! Both the client's signed payload and the server's response body use the
//! same encoding: ordered `name=value` lines joined by CRLF (with a
//! trailing CRLF), base64url-encoded without padding. This module also
//! covers the two small grammars embedded in field values: `ver` version
//! ranges and the `ask` dialog field.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

/// Error decoding a wire envelope or an embedded field grammar.
#[derive(Debug, Error)]
pub enum WireError {
    /// Body is not valid base64url
    #[error("Invalid base64url body: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Decoded body is not UTF-8
    #[error("Body is not valid UTF-8")]
    InvalidUtf8,

    /// A field line has no `=` separator
    #[error("Field line without '=': {0:?}")]
    MissingSeparator(String),

    /// A `ver` token is not an integer or `lo-hi` range
    #[error("Malformed version token: {0:?}")]
    MalformedVersion(String),
}

/// Decoded name=value fields, in wire order.
///
/// Lookups resolve duplicate names to the last occurrence; iteration and
/// equality preserve the original order so encoding round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fields(Vec<(String, String)>);

impl Fields {
    /// Returns the value for a name. Duplicates: last occurrence wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the pairs in wire order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    /// Returns the number of pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Encodes ordered name=value pairs into the base64url envelope.
///
/// Order is caller-significant and preserved verbatim.
pub fn encode_fields<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut body = String::new();
    for (name, value) in pairs {
        body.push_str(name.as_ref());
        body.push('=');
        body.push_str(value.as_ref());
        body.push_str("\r\n");
    }
    URL_SAFE_NO_PAD.encode(body.as_bytes())
}

/// Decodes a base64url envelope into its name=value fields.
pub fn decode_fields(blob: &str) -> Result<Fields, WireError> {
    let bytes = URL_SAFE_NO_PAD.decode(blob.trim())?;
    let text = String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)?;

    let mut pairs = Vec::new();
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| WireError::MissingSeparator(line.to_string()))?;
        pairs.push((name.to_string(), value.to_string()));
    }

    Ok(Fields(pairs))
}

/// Expands a `ver` value into the flat list of supported versions.
///
/// The value is a comma-separated list of single integers and `lo-hi`
/// inclusive ranges, e.g. `"1,3-5,9"` expands to `[1, 3, 4, 5, 9]`.
pub fn expand_versions(value: &str) -> Result<Vec<u32>, WireError> {
    let mut versions = Vec::new();

    for token in value.split(',') {
        let malformed = || WireError::MalformedVersion(token.to_string());
        let mut parts = token.split('-');

        match (parts.next(), parts.next(), parts.next()) {
            (Some(single), None, _) => {
                versions.push(single.trim().parse().map_err(|_| malformed())?);
            }
            (Some(lo), Some(hi), None) => {
                let lo: u32 = lo.trim().parse().map_err(|_| malformed())?;
                let hi: u32 = hi.trim().parse().map_err(|_| malformed())?;
                versions.extend(lo..=hi);
            }
            _ => return Err(malformed()),
        }
    }

    Ok(versions)
}

/// Formats a version list for the `ver` field.
pub fn format_versions(versions: &[u32]) -> String {
    versions
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// One button of an ask dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskButton {
    /// Button label shown to the user
    pub label: String,
    /// Optional URL associated with the button
    pub url: Option<String>,
}

impl AskButton {
    /// Creates a button with no URL.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: None,
        }
    }

    /// Creates a button with an associated URL.
    pub fn with_url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: Some(url.into()),
        }
    }

    fn parse(field: &str) -> Self {
        match field.split_once(';') {
            Some((label, url)) => Self::with_url(label, url),
            None => Self::new(field),
        }
    }

    fn render(&self) -> String {
        match &self.url {
            Some(url) => format!("{};{}", self.label, url),
            None => self.label.clone(),
        }
    }
}

/// Server-requested user dialog (`ask` field).
///
/// Grammar: `message~label1[;url1][~label2[;url2]]`. Both buttons are
/// optional.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ask {
    /// The message presented to the user
    pub message: String,
    /// First response button
    pub button1: Option<AskButton>,
    /// Second response button
    pub button2: Option<AskButton>,
}

impl Ask {
    /// Creates an ask with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            button1: None,
            button2: None,
        }
    }

    /// Parses an `ask` field value.
    pub fn parse(field: &str) -> Self {
        let mut parts = field.split('~');
        Self {
            message: parts.next().unwrap_or("").to_string(),
            button1: parts.next().map(AskButton::parse),
            button2: parts.next().map(AskButton::parse),
        }
    }

    /// Renders the `ask` field value.
    pub fn render(&self) -> String {
        let mut out = self.message.clone();
        if let Some(b1) = &self.button1 {
            out.push('~');
            out.push_str(&b1.render());
        }
        if let Some(b2) = &self.button2 {
            out.push('~');
            out.push_str(&b2.render());
        }
        out
    }
}
