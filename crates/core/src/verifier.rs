//! Site-key verification.
//!
//! An `X-Adblock-Key` value has the form `base64(publicKeyDER) + "_" + base64(signature)`.
//! The signature covers the canonical data of the request:
//!
//! ```text
//! path[?query] 0x00 authority 0x00 user-agent
//! ```
//!
//! where `path` defaults to `/` and `authority` is the URL authority (host, plus userinfo and
//! port when present). A verified key is stored in the [`PublicKeyCache`] under the URL it was
//! verified for.

use std::sync::Arc;

use http::HeaderMap;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::codec::Base64Codec;
use crate::error::SiteKeyError;
use crate::keys::PublicKeyCache;
use crate::signature::{PublicKey, SignatureVerifier};
use crate::transport::{HEADER_SITEKEY, HEADER_USER_AGENT};

const SEPARATOR: u8 = 0x00;

/// Checks site-key values and records the keys that pass.
#[derive(Clone)]
pub struct SiteKeyVerifier {
    signature_verifier: Arc<dyn SignatureVerifier>,
    public_keys: Arc<PublicKeyCache>,
    codec: Arc<dyn Base64Codec>,
}

impl SiteKeyVerifier {
    pub fn new(
        signature_verifier: Arc<dyn SignatureVerifier>, public_keys: Arc<PublicKeyCache>, codec: Arc<dyn Base64Codec>,
    ) -> Self {
        Self { signature_verifier, public_keys, codec }
    }

    /// Verify an `X-Adblock-Key` value for `url`.
    ///
    /// Returns `Ok(true)` and caches the public key when the signature matches, `Ok(false)`
    /// when it does not. The cache is keyed by `url` exactly as given.
    ///
    /// # Errors
    ///
    /// Returns `SiteKeyError` when the value is malformed, either part is not base64, the URL
    /// has no host, or the public key cannot be reconstructed.
    pub fn verify(&self, url: &str, user_agent: Option<&str>, value: &str) -> Result<bool, SiteKeyError> {
        let (public_key_part, signature_part) = split_value(value)?;

        let public_key_bytes = self.codec.decode(public_key_part)?;
        let signature_bytes = self.codec.decode(signature_part)?;
        let data = canonical_data(url, user_agent)?;

        let public_key = PublicKey::from_der(&public_key_bytes)?;

        if self.signature_verifier.verify(&public_key, &data, &signature_bytes) {
            self.public_keys.put(url, public_key_part);
            return Ok(true);
        }
        Ok(false)
    }

    /// Look for the site-key header in `response_headers` and verify it.
    ///
    /// The user agent is taken from `request_headers`. Errors are logged and swallowed; the
    /// outcome is only observable through the public-key cache.
    pub fn verify_in_headers(&self, url: &str, request_headers: &HeaderMap, response_headers: &HeaderMap) {
        let Some(header) = response_headers.get(HEADER_SITEKEY) else {
            return;
        };
        let Ok(value) = header.to_str() else {
            tracing::error!(url, "site-key header is not valid text");
            return;
        };
        let user_agent = request_headers
            .get(HEADER_USER_AGENT)
            .and_then(|v| v.to_str().ok());

        match self.verify(url_without_fragment(url), user_agent, value) {
            Ok(true) => tracing::debug!(url, "public key verified successfully"),
            Ok(false) => tracing::error!(url, "public key is not verified"),
            Err(e) => tracing::error!(url, error = %e, "failed to verify site-key header"),
        }
    }

    /// The cache verified keys are written into.
    pub fn public_keys(&self) -> &Arc<PublicKeyCache> {
        &self.public_keys
    }
}

impl std::fmt::Debug for SiteKeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteKeyVerifier")
            .field("public_keys", &self.public_keys.len())
            .finish_non_exhaustive()
    }
}

fn split_value(value: &str) -> Result<(&str, &str), SiteKeyError> {
    let parts: Vec<&str> = value.split('_').collect();
    match parts.as_slice() {
        [public_key, signature] if !public_key.is_empty() && !signature.is_empty() => Ok((public_key, signature)),
        _ => Err(SiteKeyError::MalformedValue { parts: parts.iter().filter(|p| !p.is_empty()).count() }),
    }
}

/// Build the canonical signed data for `url` and `user_agent`.
///
/// # Errors
///
/// Returns `SiteKeyError::Uri` if `url` cannot be parsed or has no host.
pub fn canonical_data(url: &str, user_agent: Option<&str>) -> Result<Vec<u8>, SiteKeyError> {
    let parsed = Url::parse(url).map_err(|e| SiteKeyError::Uri(format!("{url}: {e}")))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SiteKeyError::Uri(format!("can't extract host from {url}")))?;

    let mut path = match percent_decode_str(parsed.path()).decode_utf8_lossy() {
        p if p.is_empty() => "/".to_string(),
        p => p.into_owned(),
    };
    if let Some(query) = parsed.query() {
        path.push('?');
        path.push_str(query);
    }

    let authority = match written_authority(url) {
        Some(raw) => percent_decode_str(raw).decode_utf8_lossy().into_owned(),
        None => authority(&parsed, host),
    };
    let user_agent = user_agent.unwrap_or_default();

    let mut data = Vec::with_capacity(path.len() + authority.len() + user_agent.len() + 2);
    data.extend_from_slice(path.as_bytes());
    data.push(SEPARATOR);
    data.extend_from_slice(authority.as_bytes());
    data.push(SEPARATOR);
    data.extend_from_slice(user_agent.as_bytes());
    Ok(data)
}

/// The authority exactly as it appears in `url`, keeping host case and explicit default ports.
fn written_authority(url: &str) -> Option<&str> {
    let (_, rest) = url.trim().split_once("://")?;
    let end = rest.find(['/', '?', '#', '\\']).unwrap_or(rest.len());
    Some(&rest[..end]).filter(|a| !a.is_empty())
}

fn authority(url: &Url, host: &str) -> String {
    let mut authority = String::new();
    if !url.username().is_empty() {
        authority.push_str(url.username());
        if let Some(password) = url.password() {
            authority.push(':');
            authority.push_str(password);
        }
        authority.push('@');
    }
    authority.push_str(host);
    if let Some(port) = url.port() {
        authority.push(':');
        authority.push_str(&port.to_string());
    }
    authority
}

/// `url` with any `#fragment` removed.
pub fn url_without_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(before, _)| before)
}
