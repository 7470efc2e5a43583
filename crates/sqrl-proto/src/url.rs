//! SQRL URL handling.
//!
//! A login URL looks like:
//!
//! ```text
//! sqrl://example.com/sqrl?nut=oOB4QOFJux5Z1zL4skiMBA&x=5&sfn=RXhhbXBsZQ
//! ```
//!
//! `sqrl` maps to an https contact endpoint, `qrl` to http. The canonical
//! form used for comparison lower-cases the scheme and host, preserves
//! path/query case, and drops userinfo, port, and fragment.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

/// URL scheme of a SQRL login URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqrlScheme {
    /// `sqrl://` - contact over https
    Sqrl,
    /// `qrl://` - contact over http
    Qrl,
}

impl SqrlScheme {
    /// Returns the scheme for a secure (https-backed) site.
    pub fn from_secure(secure: bool) -> Self {
        if secure {
            SqrlScheme::Sqrl
        } else {
            SqrlScheme::Qrl
        }
    }

    /// Returns the scheme as it appears in a URL.
    pub fn as_str(&self) -> &'static str {
        match self {
            SqrlScheme::Sqrl => "sqrl",
            SqrlScheme::Qrl => "qrl",
        }
    }
}

/// A SQRL login URL under construction.
///
/// Immutable value type; `to_url` renders the full URL string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqrlUrl {
    /// URL scheme
    pub scheme: SqrlScheme,
    /// Authentication domain
    pub domain: String,
    /// Site path, normalized to start with `/` when non-empty
    pub path: String,
    /// The nut correlating this login attempt
    pub nut: String,
    /// Count of leading path characters included in the authentication
    /// domain (`x=` parameter); emitted only when positive
    pub domain_extension: Option<usize>,
    /// Server friendly name (`sfn=` parameter), base64url-encoded in the URL
    pub server_friendly_name: Option<String>,
}

impl SqrlUrl {
    /// Creates a new login URL for a domain and nut, with no path.
    pub fn new(secure: bool, domain: impl Into<String>, nut: impl Into<String>) -> Self {
        Self {
            scheme: SqrlScheme::from_secure(secure),
            domain: domain.into(),
            path: String::new(),
            nut: nut.into(),
            domain_extension: None,
            server_friendly_name: None,
        }
    }

    /// Sets the site path. A missing leading `/` is added, a trailing `?`
    /// is stripped.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let mut path: String = path.into();
        if path.ends_with('?') {
            path.pop();
        }
        if !path.is_empty() && !path.starts_with('/') {
            path.insert(0, '/');
        }
        self.path = path;
        self
    }

    /// Sets the domain extension, clamped to the path length.
    pub fn with_domain_extension(mut self, chars: usize) -> Self {
        self.domain_extension = Some(chars);
        self
    }

    /// Sets the server friendly name.
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.server_friendly_name = Some(name.into());
        self
    }

    /// Renders the complete login URL.
    ///
    /// The query always starts with `nut=`; `x=` is appended only when the
    /// clamped extension is positive, `sfn=` only when the friendly name is
    /// non-empty.
    pub fn to_url(&self) -> String {
        let mut url = format!(
            "{}://{}{}?nut={}",
            self.scheme.as_str(),
            self.domain,
            self.path,
            self.nut
        );

        if let Some(x) = self.domain_extension {
            let x = x.min(self.path.len());
            if x > 0 {
                url.push_str(&format!("&x={}", x));
            }
        }

        if let Some(sfn) = &self.server_friendly_name {
            if !sfn.is_empty() {
                url.push_str("&sfn=");
                url.push_str(&URL_SAFE_NO_PAD.encode(sfn.as_bytes()));
            }
        }

        url
    }
}

impl fmt::Display for SqrlUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_url())
    }
}

/// Splits a URL into scheme, authority, and path+query, dropping any
/// fragment. Malformed input degrades to empty components.
fn split_url(url: &str) -> (&str, &str, &str) {
    let url = url.split('#').next().unwrap_or("");

    let (scheme, rest) = match url.find("://") {
        Some(i) => (&url[..i], &url[i + 3..]),
        None => match url.find(':') {
            Some(i) => (&url[..i], url[i + 1..].trim_start_matches('/')),
            None => ("", url),
        },
    };

    let split = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, path_and_query) = rest.split_at(split);
    (scheme, authority, path_and_query)
}

/// Strips userinfo from an authority component.
fn strip_userinfo(authority: &str) -> &str {
    match authority.rfind('@') {
        Some(i) => &authority[i + 1..],
        None => authority,
    }
}

/// Strips the port from a host:port pair.
fn strip_port(host: &str) -> &str {
    match host.find(':') {
        Some(i) => &host[..i],
        None => host,
    }
}

/// Returns the canonical form of a SQRL URL, used for comparison and
/// signing context.
///
/// Lower-cases scheme and host, preserves path/query case, and drops
/// userinfo, port, and fragment. The output is `{scheme}//{host}{path+query}`
/// with no `://`. Malformed input yields empty components rather than an
/// error.
pub fn canonicalize(url: &str) -> String {
    let (scheme, authority, path_and_query) = split_url(url);
    let host = strip_port(strip_userinfo(authority));

    format!(
        "{}//{}{}",
        scheme.to_ascii_lowercase(),
        host.to_ascii_lowercase(),
        path_and_query
    )
}

/// Maps a SQRL URL to the http(s) endpoint a client contacts.
///
/// `qrl:` becomes `http`, anything else `https`. Host, port, and
/// path+query are retained; this output is for transport only and never
/// participates in signing.
pub fn contact_url(url: &str) -> String {
    let (scheme, authority, path_and_query) = split_url(url);
    let transport = if scheme.eq_ignore_ascii_case("qrl") {
        "http"
    } else {
        "https"
    };

    format!(
        "{}://{}{}",
        transport,
        strip_userinfo(authority),
        path_and_query
    )
}
