//! Structured errors for the sitekey-mcp server.
//!
//! Library errors are wrapped here so they can be turned into MCP error codes.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use sitekey_core::{Error, SiteKeyError, TransportError};

/// Errors surfaced by the tools.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error("TRANSPORT_ERROR: {0}")]
    Transport(#[from] TransportError),
}

impl From<SiteKeyError> for ToolError {
    fn from(err: SiteKeyError) -> Self {
        Self::Core(err.into())
    }
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match &err {
            ToolError::Core(Error::InvalidInput(_)) => -32602,
            ToolError::Core(Error::InvalidUrl(_)) => -32003,
            ToolError::Core(Error::SiteKey(SiteKeyError::Uri(_))) => -32003,
            ToolError::Core(Error::SiteKey(_)) => -32020,
            ToolError::Core(Error::Transport(_)) | ToolError::Transport(_) => -32008,
            ToolError::Core(Error::Disposed) => -32021,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
