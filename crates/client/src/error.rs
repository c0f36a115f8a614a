//! Extraction-path error types.
//!
//! None of these escape an extractor: each is logged at the boundary and the resource is
//! allowed to load unverified.

use sitekey_core::TransportError;

/// Why an extraction attempt degraded to pass-through.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The mirrored request failed in the transport.
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The transport produced no body stream.
    #[error("response has no body")]
    MissingBody,

    /// The body is not valid UTF-8 text.
    #[error("body is not valid text: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    /// A rewritten header value is not a valid header.
    #[error("invalid header value: {0}")]
    HeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    /// The host view has been released.
    #[error("host is gone")]
    HostGone,

    /// The engine session has been disposed.
    #[error("session disposed")]
    SessionDisposed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExtractError::MissingBody;
        assert_eq!(err.to_string(), "response has no body");

        let err: ExtractError = TransportError::Timeout.into();
        assert!(err.to_string().contains("timed out"));
    }
}
