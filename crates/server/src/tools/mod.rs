//! MCP tool implementations.
//!
//! This module contains all tools exposed by the sitekey-mcp server.

pub mod sitekey_probe;
pub mod sitekey_verify;
