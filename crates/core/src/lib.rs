//! Core types for site-key verification.
//!
//! This crate provides:
//! - Canonical-data construction and `X-Adblock-Key` verification
//! - The public-key cache, signature verifier and base64 codec it is built from
//! - The HTTP transport contract used to mirror requests
//! - The per-session site-keys configuration
//! - Unified error types and layered application configuration

pub mod codec;
pub mod config;
pub mod error;
pub mod keys;
pub mod signature;
pub mod sitekeys;
pub mod transport;
pub mod verifier;

pub use codec::{Base64Codec, StandardBase64};
pub use config::{AppConfig, ConfigError};
pub use error::{Error, SiteKeyError};
pub use keys::PublicKeyCache;
pub use signature::{PublicKey, RsaSha1Verifier, SignatureVerifier};
pub use sitekeys::{AliveGuard, SiteKeysConfiguration};
pub use transport::{Completion, HttpClient, HttpRequest, ServerResponse, TransportError};
pub use verifier::{SiteKeyVerifier, canonical_data, url_without_fragment};
