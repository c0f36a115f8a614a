//! Reqwest-backed [`HttpClient`] used to mirror frame requests.
//!
//! Redirects are followed here rather than inside reqwest so every hop goes through the
//! cookie bridge with the navigation context of the first request.
//!
//! ### Defaults
//! - Timeout: 20s
//! - Max redirects: 5
//! - rustls, gzip/brotli/deflate decoding

pub mod cookies;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, COOKIE, LOCATION};
use reqwest::{Client, Method, StatusCode, Url};
use sitekey_core::{AppConfig, Completion, Error, HttpClient, HttpRequest, ServerResponse, TransportError};
use tokio::runtime::Handle;

pub use cookies::{CookieStorage, RequestContext};

/// Configuration for the transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// User agent for requests that carry none (default: "sitekey/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { user_agent: "sitekey/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for TransportConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.transport_timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// HTTP transport running requests on a tokio runtime.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    http: Client,
    config: TransportConfig,
    runtime: Handle,
    cookies: Option<Arc<dyn CookieStorage>>,
}

impl ReqwestHttpClient {
    /// Create a transport whose callback-style requests run on `runtime`.
    pub fn new(config: TransportConfig, runtime: Handle) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config, runtime, cookies: None })
    }

    /// Share cookies with the host jar.
    pub fn with_cookie_storage(mut self, storage: Arc<dyn CookieStorage>) -> Self {
        self.cookies = Some(storage);
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Perform `request`, following redirects when it asks for it.
    ///
    /// A redirect that cannot be followed (limit reached, no usable `Location`) is returned as
    /// the response.
    pub async fn send(&self, request: HttpRequest) -> Result<ServerResponse, TransportError> {
        let HttpRequest { url, mut method, mut headers, follow_redirects } = request;
        let context = cookies::take_property_headers(&mut headers);
        let requested = Url::parse(&url).map_err(|e| TransportError::InvalidRequest(format!("{url}: {e}")))?;

        let mut current = requested.clone();
        let mut redirects = 0;

        loop {
            let mut hop_headers = headers.clone();
            if let Some(storage) = &self.cookies {
                cookies::attach_cookies(storage.as_ref(), &context, &current, &mut hop_headers);
            }

            let response = self
                .http
                .request(method.clone(), current.clone())
                .headers(hop_headers)
                .send()
                .await
                .map_err(map_error)?;
            let status = response.status();

            if status.is_redirection()
                && let Some(location) = response.headers().get(LOCATION)
            {
                if let Some(storage) = &self.cookies {
                    cookies::store_redirect_cookies(storage.as_ref(), &current, response.headers());
                }

                let next = location.to_str().ok().and_then(|l| current.join(l).ok());
                if follow_redirects
                    && redirects < self.config.max_redirects
                    && let Some(next) = next
                {
                    tracing::debug!("redirect {} -> {} ({})", current, next, status.as_u16());
                    if next.host_str() != current.host_str() {
                        headers.remove(AUTHORIZATION);
                        headers.remove(COOKIE);
                    }
                    if status == StatusCode::SEE_OTHER
                        || (method == Method::POST && matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND))
                    {
                        method = Method::GET;
                    }
                    current = next;
                    redirects += 1;
                    continue;
                }
            }

            let response_headers = response.headers().clone();
            let body = response.bytes().await.map_err(map_error)?;
            let final_url = (current != requested).then(|| current.to_string());

            tracing::debug!("mirrored {} -> {} ({} bytes)", url, status.as_u16(), body.len());

            return Ok(ServerResponse {
                status: status.as_u16(),
                headers: response_headers,
                body: Some(body.to_vec()),
                final_url,
            });
        }
    }
}

impl HttpClient for ReqwestHttpClient {
    fn request(&self, request: HttpRequest, completion: Completion) {
        let client = self.clone();
        self.runtime.spawn(async move {
            completion(client.send(request).await);
        });
    }
}

impl std::fmt::Debug for ReqwestHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestHttpClient")
            .field("config", &self.config)
            .field("cookies", &self.cookies.is_some())
            .finish_non_exhaustive()
    }
}

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() { TransportError::Timeout } else { TransportError::Network(e.to_string()) }
}
