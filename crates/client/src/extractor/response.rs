//! Turns a mirrored server response into the response handed back to the host.
//!
//! Splits `Content-Type` into MIME type and charset, and for HTML frames injects the host's
//! element-hiding script before the last `</body>`. When the page carries a
//! `Content-Security-Policy` that restricts scripts, the injected tag gets a nonce the policy
//! allows: an existing one is reused, otherwise a fresh one is added to `script-src`.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use sitekey_core::ServerResponse;
use sitekey_core::transport::{HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE, HEADER_CSP, MIME_TYPE_TEXT_HTML};
use sitekey_core::url_without_fragment;

use crate::error::ExtractError;
use crate::extractor::WebResponse;
use crate::host::Host;

const CHARSET: &str = "charset=";
const BODY_CLOSE: &str = "</body>";
const SCRIPT_SRC: &str = "script-src";

/// MIME prefixes whose bodies have no text encoding.
const BINARY_MIMES: &[&str] = &["image", "application/octet-stream", "video", "font", "audio"];

/// Directives whose presence between `script-src` and `'unsafe-inline'` means the keyword
/// belongs to a different directive.
const OTHER_DIRECTIVES: &[&str] =
    &["-src ", "-src-elem ", "-src-attr ", "navigate-to ", "form-action ", "base-uri "];

static NONCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)script-src[^;]*'(nonce-[^']+)'").unwrap());

/// MIME type and charset parsed from a `Content-Type` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInfo {
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
}

impl ResourceInfo {
    /// Parse `text/html; charset=utf-8` style values.
    ///
    /// Without parameters the value is a mime type only if it contains `/`. The charset may be
    /// any parameter and is matched case-insensitively.
    pub fn parse(content_type: &str) -> Self {
        let mut info = Self::default();

        match content_type.find(';').filter(|pos| *pos > 0) {
            Some(pos) => {
                info.mime_type = Some(content_type[..pos].to_string());
                info.encoding = content_type[pos + 1..]
                    .split(';')
                    .map(str::trim)
                    .find_map(|param| {
                        let prefix = param.get(..CHARSET.len())?;
                        prefix.eq_ignore_ascii_case(CHARSET).then(|| param[CHARSET.len()..].to_string())
                    })
                    .filter(|charset| !charset.trim().is_empty());
            }
            None if content_type.find('/').is_some_and(|pos| pos > 0) => {
                info.mime_type = Some(content_type.to_string());
            }
            None => {}
        }
        info
    }

    pub fn is_binary(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|mime| BINARY_MIMES.iter().any(|prefix| mime.starts_with(prefix)))
    }

    fn trim(&mut self) {
        if let Some(mime) = self.mime_type.as_mut() {
            *mime = mime.trim().to_string();
        }
        if let Some(encoding) = self.encoding.as_mut() {
            *encoding = encoding.trim().to_string();
        }
    }
}

/// Build the host-facing response for `response`, fetched for `url`.
///
/// # Errors
///
/// Returns `ExtractError` when the body is missing, an HTML body is not valid UTF-8, or the
/// rewritten CSP header is not a valid header value.
pub fn process(
    host: &dyn Host, url: &str, response: ServerResponse, js_in_frames_enabled: bool,
) -> Result<WebResponse, ExtractError> {
    let ServerResponse { status, mut headers, body, .. } = response;
    let body = body.ok_or(ExtractError::MissingBody)?;

    let mut info = match headers.get(HEADER_CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(content_type) => ResourceInfo::parse(content_type),
        None => ResourceInfo::default(),
    };

    if info.mime_type.is_some() {
        headers.remove(HEADER_CONTENT_TYPE);
        if info.encoding.is_some() && info.is_binary() {
            info.encoding = None;
        }
    } else if let Some(length) = headers.get(HEADER_CONTENT_LENGTH) {
        let parsed = length.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok());
        if parsed.is_none() {
            info.mime_type = Some("text/plain".into());
        }
    }
    info.trim();

    let is_html = info
        .mime_type
        .as_deref()
        .is_none_or(|mime| mime.to_ascii_lowercase().contains(MIME_TYPE_TEXT_HTML));

    let body = if js_in_frames_enabled && is_html {
        inject_javascript(host, url, body, &mut headers)?
    } else {
        body
    };

    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
        .to_string();

    Ok(WebResponse {
        mime_type: info.mime_type,
        encoding: info.encoding,
        status,
        reason,
        headers,
        body: body.into(),
    })
}

fn inject_javascript(host: &dyn Host, url: &str, body: Vec<u8>, headers: &mut HeaderMap) -> Result<Vec<u8>, ExtractError> {
    let html = String::from_utf8(body)?;
    let lowered = html.to_ascii_lowercase();

    let Some(index) = lowered.rfind(BODY_CLOSE) else {
        return Ok(html.into_bytes());
    };
    if !host.prepare_element_hiding(url_without_fragment(url)) {
        return Ok(html.into_bytes());
    }

    let tag = match update_csp_header(headers)? {
        Some(nonce) => format!("<script nonce=\"{nonce}\">"),
        None => "<script>".to_string(),
    };

    let mut injected = String::with_capacity(html.len() + tag.len() + 64);
    injected.push_str(&html[..index]);
    injected.push_str(&tag);
    injected.push_str(&host.inject_js());
    injected.push_str("</script>");
    injected.push_str(&html[index..]);

    tracing::debug!(url, nonce = tag.contains("nonce"), "injected element-hiding script");
    Ok(injected.into_bytes())
}

/// Make sure the CSP lets an inline script run, returning the nonce to put on it.
///
/// `None` means no nonce is needed: there is no policy, it does not restrict scripts, or it
/// already allows inline scripts.
fn update_csp_header(headers: &mut HeaderMap) -> Result<Option<String>, ExtractError> {
    let Some(csp) = headers.get(HEADER_CSP).and_then(|v| v.to_str().ok()).map(str::to_string) else {
        return Ok(None);
    };
    let lowered = csp.to_ascii_lowercase();
    let Some(script_src) = lowered.find(SCRIPT_SRC) else {
        return Ok(None);
    };

    if let Some(nonce) = NONCE_PATTERN.captures(&csp).and_then(|c| c.get(1)) {
        return Ok(Some(nonce.as_str()["nonce-".len()..].to_string()));
    }

    if contains_valid_unsafe_inline(&lowered) {
        return Ok(None);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let before = csp[..script_src].trim();
    let after = csp[script_src + SCRIPT_SRC.len()..].trim();
    let rewritten = format!("{before} {SCRIPT_SRC} 'nonce-{id}' {after}");

    headers.insert(HEADER_CSP, HeaderValue::from_str(rewritten.trim())?);
    Ok(Some(id))
}

/// Whether `'unsafe-inline'` follows `script-src` within the same directive.
fn contains_valid_unsafe_inline(csp_lowered: &str) -> bool {
    let Some(start) = csp_lowered.find(SCRIPT_SRC) else {
        return false;
    };
    let Some(offset) = csp_lowered[start..].find("'unsafe-inline'") else {
        return false;
    };
    let between = &csp_lowered[start + SCRIPT_SRC.len()..start + offset];
    !OTHER_DIRECTIVES.iter().any(|directive| between.contains(directive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ScriptBridge;

    struct PageHost {
        hiding: bool,
    }

    impl Host for PageHost {
        fn inject_js(&self) -> String {
            "hide();".into()
        }

        fn prepare_element_hiding(&self, _url: &str) -> bool {
            self.hiding
        }

        fn navigation_url(&self) -> Option<String> {
            None
        }

        fn accepts_third_party_cookies(&self) -> bool {
            false
        }

        fn add_callback_bridge(&self, _name: &str, _bridge: ScriptBridge) {}

        fn remove_callback_bridge(&self, _name: &str) {}
    }

    fn html_response(body: &str, csp: Option<&str>) -> ServerResponse {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_CONTENT_TYPE, HeaderValue::from_static("text/html; charset=UTF-8"));
        if let Some(csp) = csp {
            headers.insert(HEADER_CSP, HeaderValue::from_str(csp).unwrap());
        }
        ServerResponse { status: 200, headers, body: Some(body.as_bytes().to_vec()), final_url: None }
    }

    fn body_text(response: &WebResponse) -> String {
        String::from_utf8(response.body.to_vec()).unwrap()
    }

    #[test]
    fn test_parse_content_type() {
        let info = ResourceInfo::parse("text/html; Charset=utf-8");
        assert_eq!(info.mime_type.as_deref(), Some("text/html"));
        assert_eq!(info.encoding.as_deref(), Some("utf-8"));

        let info = ResourceInfo::parse("application/json");
        assert_eq!(info.mime_type.as_deref(), Some("application/json"));
        assert!(info.encoding.is_none());

        let info = ResourceInfo::parse("text/html; boundary=x");
        assert!(info.encoding.is_none());
    }

    #[test]
    fn test_parse_charset_in_any_parameter() {
        let info = ResourceInfo::parse("text/html; boundary=x; CHARSET=utf-8");
        assert_eq!(info.mime_type.as_deref(), Some("text/html"));
        assert_eq!(info.encoding.as_deref(), Some("utf-8"));

        let info = ResourceInfo::parse("text/html; charset=");
        assert!(info.encoding.is_none());
    }

    #[test]
    fn test_parse_rejects_values_without_mime() {
        assert_eq!(ResourceInfo::parse("html"), ResourceInfo::default());
        assert_eq!(ResourceInfo::parse("/html"), ResourceInfo::default());
        assert_eq!(ResourceInfo::parse("; charset=utf-8"), ResourceInfo::default());
    }

    #[test]
    fn test_binary_mimes() {
        assert!(ResourceInfo::parse("image/png").is_binary());
        assert!(ResourceInfo::parse("font/woff2").is_binary());
        assert!(ResourceInfo::parse("application/octet-stream").is_binary());
        assert!(!ResourceInfo::parse("text/css").is_binary());
    }

    #[test]
    fn test_injects_before_last_body_close() {
        let host = PageHost { hiding: true };
        let response = html_response("<html><body>a</body><!-- </body> --></html>", None);

        let processed = process(&host, "https://example.com/", response, true).unwrap();
        let body = body_text(&processed);

        assert_eq!(body, "<html><body>a</body><!-- <script>hide();</script></body> --></html>");
        assert_eq!(processed.mime_type.as_deref(), Some("text/html"));
        assert_eq!(processed.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(processed.reason, "OK");
        assert!(processed.headers.get(HEADER_CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_injects_before_uppercase_body_close() {
        let host = PageHost { hiding: true };
        let response = html_response("<HTML><BODY>a</BODY></HTML>", None);

        let processed = process(&host, "https://example.com/", response, true).unwrap();
        assert_eq!(body_text(&processed), "<HTML><BODY>a<script>hide();</script></BODY></HTML>");
    }

    #[test]
    fn test_no_injection_without_body_close() {
        let host = PageHost { hiding: true };
        let response = html_response("<html>fragment</html>", None);

        let processed = process(&host, "https://example.com/", response, true).unwrap();
        assert_eq!(body_text(&processed), "<html>fragment</html>");
    }

    #[test]
    fn test_no_injection_when_disabled_or_hiding_unavailable() {
        let page = "<html><body></body></html>";

        let processed = process(&PageHost { hiding: true }, "https://example.com/", html_response(page, None), false).unwrap();
        assert_eq!(body_text(&processed), page);

        let processed = process(&PageHost { hiding: false }, "https://example.com/", html_response(page, None), true).unwrap();
        assert_eq!(body_text(&processed), page);
    }

    #[test]
    fn test_no_injection_into_non_html() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_CONTENT_TYPE, HeaderValue::from_static("image/png; charset=binary"));
        let response = ServerResponse { status: 200, headers, body: Some(b"</body>".to_vec()), final_url: None };

        let processed = process(&PageHost { hiding: true }, "https://example.com/a.png", response, true).unwrap();
        assert_eq!(processed.body.as_ref(), b"</body>");
        assert_eq!(processed.mime_type.as_deref(), Some("image/png"));
        assert!(processed.encoding.is_none());
    }

    #[test]
    fn test_unparsable_content_length_defaults_to_text_plain() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_CONTENT_LENGTH, HeaderValue::from_static("abc"));
        let response = ServerResponse { status: 200, headers, body: Some(b"</body>".to_vec()), final_url: None };

        let processed = process(&PageHost { hiding: true }, "https://example.com/", response, true).unwrap();
        assert_eq!(processed.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(processed.body.as_ref(), b"</body>");
    }

    #[test]
    fn test_missing_mime_is_treated_as_html() {
        let response = ServerResponse { status: 200, headers: HeaderMap::new(), body: Some(b"<body></body>".to_vec()), final_url: None };

        let processed = process(&PageHost { hiding: true }, "https://example.com/", response, true).unwrap();
        assert_eq!(body_text(&processed), "<body><script>hide();</script></body>");
        assert!(processed.mime_type.is_none());
    }

    #[test]
    fn test_missing_body_is_an_error() {
        let response = ServerResponse { status: 200, ..Default::default() };
        let result = process(&PageHost { hiding: true }, "https://example.com/", response, true);
        assert!(matches!(result, Err(ExtractError::MissingBody)));
    }

    #[test]
    fn test_invalid_utf8_html_is_an_error() {
        let response = ServerResponse { status: 200, headers: HeaderMap::new(), body: Some(vec![0xff, 0xfe]), final_url: None };
        let result = process(&PageHost { hiding: true }, "https://example.com/", response, true);
        assert!(matches!(result, Err(ExtractError::Encoding(_))));
    }

    #[test]
    fn test_existing_nonce_is_reused() {
        let csp = "default-src 'self'; script-src 'self' 'nonce-abc123'; img-src *";
        let response = html_response("<body></body>", Some(csp));

        let processed = process(&PageHost { hiding: true }, "https://example.com/", response, true).unwrap();
        assert_eq!(body_text(&processed), "<body><script nonce=\"abc123\">hide();</script></body>");
        assert_eq!(processed.headers.get(HEADER_CSP).unwrap(), csp);
    }

    #[test]
    fn test_nonce_added_to_script_src() {
        let csp = "default-src 'self'; script-src 'self'";
        let response = html_response("<body></body>", Some(csp));

        let processed = process(&PageHost { hiding: true }, "https://example.com/", response, true).unwrap();
        let rewritten = processed.headers.get(HEADER_CSP).unwrap().to_str().unwrap().to_string();

        let nonce = NONCE_PATTERN.captures(&rewritten).unwrap().get(1).unwrap().as_str()["nonce-".len()..].to_string();
        assert!(rewritten.starts_with("default-src 'self'; script-src 'nonce-"));
        assert!(rewritten.ends_with("' 'self'"));
        assert_eq!(body_text(&processed), format!("<body><script nonce=\"{nonce}\">hide();</script></body>"));
    }

    #[test]
    fn test_unsafe_inline_needs_no_nonce() {
        let csp = "script-src 'self' 'unsafe-inline'";
        let response = html_response("<body></body>", Some(csp));

        let processed = process(&PageHost { hiding: true }, "https://example.com/", response, true).unwrap();
        assert_eq!(body_text(&processed), "<body><script>hide();</script></body>");
        assert_eq!(processed.headers.get(HEADER_CSP).unwrap(), csp);
    }

    #[test]
    fn test_unsafe_inline_of_another_directive() {
        assert!(contains_valid_unsafe_inline("script-src 'self' 'unsafe-inline'"));
        assert!(!contains_valid_unsafe_inline("script-src 'self'; style-src 'unsafe-inline'"));
        assert!(!contains_valid_unsafe_inline("script-src 'self'; base-uri 'unsafe-inline'"));
        assert!(!contains_valid_unsafe_inline("default-src 'unsafe-inline'"));
    }

    #[test]
    fn test_policy_without_script_src() {
        let csp = "img-src *";
        let response = html_response("<body></body>", Some(csp));

        let processed = process(&PageHost { hiding: true }, "https://example.com/", response, true).unwrap();
        assert_eq!(body_text(&processed), "<body><script>hide();</script></body>");
        assert_eq!(processed.headers.get(HEADER_CSP).unwrap(), csp);
    }
}
