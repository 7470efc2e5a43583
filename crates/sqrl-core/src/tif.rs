//! Transaction Information Flags (TIF).
//!
//! The server communicates the outcome of every request as a bitmask,
//! serialized in the `tif` response field as unprefixed hexadecimal.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error parsing a `tif` field value.
#[derive(Debug, Error)]
#[error("Invalid tif value: {0:?}")]
pub struct TifParseError(pub String);

/// Transaction Information Flags bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tif(pub u16);

impl Tif {
    /// No flags set.
    pub const NONE: Tif = Tif(0);
    /// The request's current identity key matched a stored identity.
    pub const CURRENT_ID_MATCH: Tif = Tif(0x01);
    /// The request's previous identity key matched a stored identity.
    pub const PREVIOUS_ID_MATCH: Tif = Tif(0x02);
    /// Request IP matches the IP the login URL was issued to.
    ///
    /// Computed by the session layer, merged in by the driver.
    pub const IP_ADDRESSES_MATCH: Tif = Tif(0x04);
    /// The matched identity has SQRL access disabled.
    ///
    /// Computed by the session layer, merged in by the driver.
    pub const SQRL_DISABLED: Tif = Tif(0x08);
    /// The client sent a command verb the server does not implement.
    pub const FUNCTION_NOT_SUPPORTED: Tif = Tif(0x10);
    /// Transient server-side problem; the client should retry.
    pub const TRANSIENT_ERROR: Tif = Tif(0x20);
    /// The command could not be completed.
    pub const COMMAND_FAILED: Tif = Tif(0x40);
    /// The failure was caused by the client's request.
    pub const CLIENT_FAILURE: Tif = Tif(0x80);
    /// The identity association in the request is inconsistent.
    ///
    /// Computed by the session layer, merged in by the driver.
    pub const BAD_ID_ASSOCIATION: Tif = Tif(0x100);

    /// Returns the raw bits.
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`.
    pub const fn contains(&self, other: Tif) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no flags are set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Serializes to the wire form: unprefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("{:x}", self.0)
    }

    /// Parses the wire form. Accepts either letter case.
    pub fn from_hex(s: &str) -> Result<Self, TifParseError> {
        u16::from_str_radix(s, 16)
            .map(Tif)
            .map_err(|_| TifParseError(s.to_string()))
    }
}

impl BitOr for Tif {
    type Output = Tif;

    fn bitor(self, rhs: Tif) -> Tif {
        Tif(self.0 | rhs.0)
    }
}

impl BitOrAssign for Tif {
    fn bitor_assign(&mut self, rhs: Tif) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Tif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tif_hex_roundtrip() {
        let tif = Tif::CURRENT_ID_MATCH | Tif::COMMAND_FAILED;
        assert_eq!(tif.bits(), 0x41);
        assert_eq!(tif.to_hex(), "41");
        assert_eq!(Tif::from_hex("41").unwrap(), tif);
    }

    #[test]
    fn test_tif_parses_uppercase() {
        assert_eq!(Tif::from_hex("C0").unwrap().bits(), 0xC0);
    }

    #[test]
    fn test_tif_high_bit() {
        let tif = Tif::BAD_ID_ASSOCIATION;
        assert_eq!(tif.to_hex(), "100");
        assert_eq!(Tif::from_hex("100").unwrap(), tif);
    }

    #[test]
    fn test_tif_contains() {
        let tif = Tif::COMMAND_FAILED | Tif::CLIENT_FAILURE;
        assert!(tif.contains(Tif::COMMAND_FAILED));
        assert!(tif.contains(Tif::CLIENT_FAILURE));
        assert!(!tif.contains(Tif::CURRENT_ID_MATCH));
        assert!(Tif::NONE.is_empty());
    }

    #[test]
    fn test_tif_rejects_garbage() {
        assert!(Tif::from_hex("zz").is_err());
        assert!(Tif::from_hex("").is_err());
    }
}
