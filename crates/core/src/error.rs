//! Unified error types for site-key verification.
//!
//! `SiteKeyError` is the taxonomy surfaced by [`SiteKeyVerifier::verify`](crate::SiteKeyVerifier::verify)
//! to callers that need to tell "malformed" apart from "not verified". A well-formed value whose
//! signature does not match is not an error: `verify` returns `Ok(false)` for it.

/// Errors raised while parsing and checking an `X-Adblock-Key` value.
#[derive(Debug, thiserror::Error)]
pub enum SiteKeyError {
    /// The value does not split into exactly `publicKey_signature`.
    #[error("MALFORMED_VALUE: expected `publicKey_signature`, got {parts} part(s)")]
    MalformedValue { parts: usize },

    /// One of the two parts is not valid base64.
    #[error("DECODE_ERROR: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The URL cannot be parsed or has no host.
    #[error("URI_ERROR: {0}")]
    Uri(String),

    /// The public key bytes are not a valid DER-encoded key.
    #[error("KEY_RECONSTRUCTION_ERROR: {0}")]
    KeyReconstruction(String),
}

/// Unified error type for callers above the verifier.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty value).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Site-key value rejected as malformed.
    #[error(transparent)]
    SiteKey(#[from] SiteKeyError),

    /// HTTP transport failure.
    #[error("TRANSPORT_ERROR: {0}")]
    Transport(String),

    /// The owning engine session has been disposed.
    #[error("SESSION_DISPOSED")]
    Disposed,
}
