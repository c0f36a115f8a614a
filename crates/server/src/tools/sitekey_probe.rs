//! sitekey_probe tool implementation.
//!
//! Fetches a URL through the transport and reports what a page publishes as its site key:
//! the `X-Adblock-Key` response header and the `data-adblockkey` attribute of the root element.
//! Verification failures are reported in the output, never as tool errors.

use http::HeaderValue;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sitekey_client::{ReqwestHttpClient, ResourceInfo, document_site_key};
use sitekey_core::transport::{HEADER_CONTENT_TYPE, HEADER_SITEKEY, HEADER_USER_AGENT, MIME_TYPE_TEXT_HTML};
use sitekey_core::{Error, HttpRequest, SiteKeysConfiguration, url_without_fragment};
use url::Url;

use crate::error::ToolError;

/// Input parameters for the sitekey_probe tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SiteKeyProbeParams {
    /// The URL to fetch.
    pub url: String,

    /// User agent to send. Defaults to the configured user agent.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Verification outcome of one site-key source.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SiteKeyOutcome {
    /// The raw value found.
    pub value: String,
    pub verified: bool,
    pub public_key: Option<String>,
    /// Why the value could not be checked, if it could not.
    pub error: Option<String>,
}

/// Output structure for the sitekey_probe tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SiteKeyProbeOutput {
    /// The URL requested.
    pub url: String,
    /// The URL verified against, after redirects.
    pub final_url: String,
    /// HTTP status of the final response.
    pub status: u16,
    /// Outcome of the `X-Adblock-Key` header, if present.
    pub header: Option<SiteKeyOutcome>,
    /// Outcome of the `data-adblockkey` attribute, if present.
    pub document: Option<SiteKeyOutcome>,
}

/// Implementation of the sitekey_probe tool.
pub async fn probe_impl(
    transport: &ReqwestHttpClient, configuration: &SiteKeysConfiguration, params: SiteKeyProbeParams,
) -> Result<CallToolResult, McpError> {
    let url = params.url.trim();
    if url.is_empty() {
        return Err(ToolError::from(Error::InvalidInput("url cannot be empty".into())).into());
    }
    Url::parse(url).map_err(|e| ToolError::from(Error::InvalidUrl(format!("{url}: {e}"))))?;

    if !configuration.is_alive() {
        return Err(ToolError::from(Error::Disposed).into());
    }

    let user_agent = params
        .user_agent
        .unwrap_or_else(|| transport.config().user_agent.clone());
    let user_agent_value = HeaderValue::from_str(&user_agent)
        .map_err(|e| ToolError::from(Error::InvalidInput(format!("user_agent: {e}"))))?;

    let mut request = HttpRequest::get(url);
    request.headers.insert(HEADER_USER_AGENT, user_agent_value);

    let response = transport.send(request).await.map_err(ToolError::from)?;
    let final_url = url_without_fragment(response.final_url.as_deref().unwrap_or(url)).to_string();

    let header = response
        .headers
        .get(HEADER_SITEKEY)
        .map(|value| match value.to_str() {
            Ok(value) => check(configuration, &final_url, &user_agent, value),
            Err(e) => SiteKeyOutcome {
                value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                verified: false,
                public_key: None,
                error: Some(e.to_string()),
            },
        });

    let is_html = response
        .headers
        .get(HEADER_CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ResourceInfo::parse)
        .is_none_or(|info| info.mime_type.as_deref().is_none_or(|m| m.contains(MIME_TYPE_TEXT_HTML)));

    let document = response
        .body
        .as_deref()
        .filter(|_| is_html)
        .and_then(|body| std::str::from_utf8(body).ok())
        .and_then(document_site_key)
        .map(|value| check(configuration, &final_url, &user_agent, &value));

    tracing::debug!(
        url,
        status = response.status,
        header = header.is_some(),
        document = document.is_some(),
        "sitekey_probe"
    );

    let output = SiteKeyProbeOutput { url: url.to_string(), final_url, status: response.status, header, document };

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}

fn check(configuration: &SiteKeysConfiguration, url: &str, user_agent: &str, value: &str) -> SiteKeyOutcome {
    let Some(_alive) = configuration.alive() else {
        return SiteKeyOutcome {
            value: value.to_string(),
            verified: false,
            public_key: None,
            error: Some(Error::Disposed.to_string()),
        };
    };

    match configuration.verifier().verify(url, Some(user_agent), value) {
        Ok(verified) => SiteKeyOutcome {
            value: value.to_string(),
            verified,
            public_key: if verified { configuration.public_keys().get(url) } else { None },
            error: None,
        },
        Err(e) => SiteKeyOutcome { value: value.to_string(), verified: false, public_key: None, error: Some(e.to_string()) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::signed_value;
    use sitekey_client::TransportConfig;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UA: &str = "probe-test/1.0";

    fn setup() -> (ReqwestHttpClient, SiteKeysConfiguration) {
        let config = TransportConfig {
            user_agent: UA.into(),
            timeout: Duration::from_secs(5),
            max_redirects: 3,
        };
        let transport = ReqwestHttpClient::new(config, Handle::current()).unwrap();
        let configuration = SiteKeysConfiguration::with_defaults(Arc::new(transport.clone()));
        (transport, configuration)
    }

    fn parse(result: &CallToolResult) -> SiteKeyProbeOutput {
        let content = serde_json::to_value(&result.content[0]).unwrap();
        let text = content.get("text").and_then(|t| t.as_str()).unwrap();
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_probe_verifies_header() {
        let server = MockServer::start().await;
        let url = format!("{}/parked", server.uri());
        let (value, public_key) = signed_value(&url, Some(UA));

        Mock::given(method("GET"))
            .and(path("/parked"))
            .and(header("user-agent", UA))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-adblock-key", value.as_str())
                    .set_body_raw("<html><body>parked</body></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let (transport, configuration) = setup();
        let result = probe_impl(&transport, &configuration, SiteKeyProbeParams { url: url.clone(), user_agent: None })
            .await
            .unwrap();
        let output = parse(&result);

        assert_eq!(output.status, 200);
        assert_eq!(output.final_url, url);
        let header = output.header.unwrap();
        assert!(header.verified);
        assert_eq!(header.public_key.as_deref(), Some(public_key.as_str()));
        assert!(output.document.is_none());
        assert_eq!(configuration.public_keys().get(&url), Some(public_key));
    }

    #[tokio::test]
    async fn test_probe_reads_document_attribute() {
        let server = MockServer::start().await;
        let url = format!("{}/page", server.uri());
        let (value, _) = signed_value(&url, Some("custom-agent"));
        let body = format!(r#"<html data-adblockkey="{value}"><body></body></html>"#);

        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
            .mount(&server)
            .await;

        let (transport, configuration) = setup();
        let params = SiteKeyProbeParams { url: url.clone(), user_agent: Some("custom-agent".into()) };
        let output = parse(&probe_impl(&transport, &configuration, params).await.unwrap());

        assert!(output.header.is_none());
        let document = output.document.unwrap();
        assert!(document.verified);
        assert!(document.error.is_none());
    }

    #[tokio::test]
    async fn test_probe_reports_malformed_header_without_failing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-adblock-key", "not-a-site-key"))
            .mount(&server)
            .await;

        let (transport, configuration) = setup();
        let params = SiteKeyProbeParams { url: format!("{}/bad", server.uri()), user_agent: None };
        let output = parse(&probe_impl(&transport, &configuration, params).await.unwrap());

        let header = output.header.unwrap();
        assert!(!header.verified);
        assert!(header.error.unwrap().contains("MALFORMED_VALUE"));
        assert!(configuration.public_keys().is_empty());
    }

    #[tokio::test]
    async fn test_probe_verifies_against_redirect_target() {
        let server = MockServer::start().await;
        let target = format!("{}/final", server.uri());
        let (value, _) = signed_value(&target, Some(UA));

        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/final"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/final"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-adblock-key", value.as_str()))
            .mount(&server)
            .await;

        let (transport, configuration) = setup();
        let params = SiteKeyProbeParams { url: format!("{}/start", server.uri()), user_agent: None };
        let output = parse(&probe_impl(&transport, &configuration, params).await.unwrap());

        assert_eq!(output.final_url, target);
        assert!(output.header.unwrap().verified);
    }

    #[tokio::test]
    async fn test_probe_invalid_input() {
        let (transport, configuration) = setup();

        let params = SiteKeyProbeParams { url: " ".into(), user_agent: None };
        let err = probe_impl(&transport, &configuration, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);

        let params = SiteKeyProbeParams { url: "example.com/no-scheme".into(), user_agent: None };
        let err = probe_impl(&transport, &configuration, params).await.unwrap_err();
        assert_eq!(err.code.0, -32003);
    }

    #[tokio::test]
    async fn test_probe_disposed_session() {
        let (transport, configuration) = setup();
        configuration.dispose();

        let params = SiteKeyProbeParams { url: "https://example.com/".into(), user_agent: None };
        let err = probe_impl(&transport, &configuration, params).await.unwrap_err();
        assert_eq!(err.code.0, -32021);
    }
}
