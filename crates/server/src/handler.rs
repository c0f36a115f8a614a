//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::sitekey_probe::{SiteKeyProbeParams, probe_impl};
use crate::tools::sitekey_verify::{SiteKeyVerifyParams, verify_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use sitekey_client::ReqwestHttpClient;
use sitekey_core::SiteKeysConfiguration;

/// The main MCP server handler for sitekey-mcp.
#[derive(Clone)]
pub struct SiteKeyServer {
    tool_router: ToolRouter<Self>,
    configuration: Arc<SiteKeysConfiguration>,
    transport: ReqwestHttpClient,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl SiteKeyServer {
    /// Create a new server handler over one site-keys session.
    pub fn new(configuration: Arc<SiteKeysConfiguration>, transport: ReqwestHttpClient) -> Self {
        Self { tool_router: Self::tool_router(), configuration, transport }
    }

    /// Verify an `X-Adblock-Key` value.
    ///
    /// No network requests are made. A verified key is kept in the session's public-key cache.
    #[tool(
        description = "Verify an X-Adblock-Key value (publicKey_signature) for a URL and user agent. Returns whether the signature matches and the accepted public key."
    )]
    async fn sitekey_verify(&self, params: Parameters<SiteKeyVerifyParams>) -> Result<CallToolResult, McpError> {
        verify_impl(&self.configuration, params.0)
    }

    /// Fetch a URL and check the site key it publishes.
    #[tool(
        description = "Fetch a URL and verify its site key from the X-Adblock-Key header and the data-adblockkey attribute of the root element."
    )]
    async fn sitekey_probe(&self, params: Parameters<SiteKeyProbeParams>) -> Result<CallToolResult, McpError> {
        probe_impl(&self.transport, &self.configuration, params.0).await
    }
}

impl ServerHandler for SiteKeyServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "sitekey-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
