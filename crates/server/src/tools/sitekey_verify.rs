//! sitekey_verify tool implementation.
//!
//! Checks an `X-Adblock-Key` value against a URL and user agent without any network access.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sitekey_core::{Error, SiteKeysConfiguration, url_without_fragment};
use url::Url;

use crate::error::ToolError;

/// Input parameters for the sitekey_verify tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SiteKeyVerifyParams {
    /// The URL the value was served for. A `#fragment` is ignored.
    pub url: String,

    /// User agent the value was signed for. Absent means the empty string.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// The `publicKey_signature` value, both parts base64.
    pub value: String,
}

/// Output structure for the sitekey_verify tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SiteKeyVerifyOutput {
    /// URL the result is recorded under.
    pub url: String,
    /// Whether the signature matched.
    pub verified: bool,
    /// The cached public key, only when verified.
    pub public_key: Option<String>,
}

/// Implementation of the sitekey_verify tool.
pub fn verify_impl(
    configuration: &SiteKeysConfiguration, params: SiteKeyVerifyParams,
) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::from(Error::InvalidInput("url cannot be empty".into())).into());
    }
    if params.value.trim().is_empty() {
        return Err(ToolError::from(Error::InvalidInput("value cannot be empty".into())).into());
    }

    let url = url_without_fragment(params.url.trim());
    Url::parse(url).map_err(|e| ToolError::from(Error::InvalidUrl(format!("{url}: {e}"))))?;

    let Some(_alive) = configuration.alive() else {
        return Err(ToolError::from(Error::Disposed).into());
    };

    let verified = configuration
        .verifier()
        .verify(url, params.user_agent.as_deref(), params.value.trim())
        .map_err(ToolError::from)?;

    tracing::debug!(url, verified, "sitekey_verify");

    let public_key = if verified { configuration.public_keys().get(url) } else { None };
    let output = SiteKeyVerifyOutput { url: url.to_string(), verified, public_key };

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}
