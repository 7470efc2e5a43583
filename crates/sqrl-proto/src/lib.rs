//! SQRL Protocol - URL and wire formats.
//!
//! This crate defines:
//! - SQRL URL generation, canonicalization, and contact-endpoint mapping
//! - The base64url, CRLF-joined name=value envelope shared by both
//!   directions of the protocol
//! - The parsed client request model (`client`/`server`/`ids` POST fields)
//! - The server response model and its body codec

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod request;
pub mod response;
pub mod url;
pub mod wire;

pub use request::{ClientRequest, OptionFlags, PostBody, RequestError, SqrlCommand};
pub use response::{ResponseError, ServerResponse};
pub use url::{canonicalize, contact_url, SqrlScheme, SqrlUrl};
pub use wire::{decode_fields, encode_fields, expand_versions, Ask, AskButton, Fields, WireError};
