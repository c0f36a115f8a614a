//! HTTP transport contract.
//!
//! The Header Extractor mirrors intercepted requests through an [`HttpClient`]. Completion
//! is reported through a callback that may run on any thread, so callers that need the
//! response synchronously rendezvous with it themselves.

use http::{HeaderMap, Method};

pub const HEADER_SITEKEY: &str = "x-adblock-key";
pub const HEADER_USER_AGENT: &str = "user-agent";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_CONTENT_LENGTH: &str = "content-length";
pub const HEADER_CSP: &str = "content-security-policy";
pub const HEADER_COOKIE: &str = "cookie";
pub const HEADER_SET_COOKIE: &str = "set-cookie";
pub const HEADER_LOCATION: &str = "location";
pub const HEADER_RANGE: &str = "range";

pub const MIME_TYPE_TEXT_HTML: &str = "text/html";

/// An outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub follow_redirects: bool,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into(), method: Method::GET, headers: HeaderMap::new(), follow_redirects: true }
    }
}

/// A completed response.
#[derive(Debug, Clone, Default)]
pub struct ServerResponse {
    /// HTTP status code as reported by the transport.
    pub status: u16,
    pub headers: HeaderMap,
    /// Response body, `None` when the transport produced no stream.
    pub body: Option<Vec<u8>>,
    /// Final URL after redirects, when it differs from the requested one.
    pub final_url: Option<String>,
}

/// Failure reported by the transport instead of a response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// The completion callback was dropped without being invoked.
    #[error("request abandoned by transport")]
    Abandoned,
}

/// Completion callback for [`HttpClient::request`].
pub type Completion = Box<dyn FnOnce(Result<ServerResponse, TransportError>) + Send + 'static>;

/// Performs HTTP requests and reports completion through a callback.
pub trait HttpClient: Send + Sync {
    /// Start `request`; `completion` is invoked exactly once, possibly on another thread.
    fn request(&self, request: HttpRequest, completion: Completion);
}

/// HTTP status cannot be lower than 100 or greater than 599.
pub fn is_valid_code(status: u16) -> bool {
    (100..=599).contains(&status)
}

pub fn is_redirect_code(status: u16) -> bool {
    (300..=399).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(is_valid_code(200));
        assert!(is_valid_code(599));
        assert!(!is_valid_code(600));
        assert!(!is_valid_code(99));
        assert!(is_redirect_code(302));
        assert!(!is_redirect_code(200));
    }

    #[test]
    fn test_get_request_defaults() {
        let request = HttpRequest::get("https://example.com/");
        assert_eq!(request.method, Method::GET);
        assert!(request.headers.is_empty());
        assert!(request.follow_redirects);
    }
}
