//! Client side of site-key verification.
//!
//! This crate provides the extractors that get a page's site key to the verifier, the host
//! abstraction they run against, the reqwest transport used to mirror frame requests, and the
//! resource-interception pipeline shared by the server.

pub mod document;
pub mod error;
pub mod extractor;
pub mod host;
pub mod pipeline;
pub mod transport;

pub use document::document_site_key;
pub use error::ExtractError;
pub use extractor::{
    CombinedExtractor, HeaderExtractor, Intercept, PageState, RequestKind, ResourceInfo, ScriptBridge, ScriptExtractor,
    SiteKeyExtractor, WebRequest, WebResponse,
};
pub use host::{Host, HostRef, TaskQueue, TaskRunner, task_queue};
pub use pipeline::{FilterOracle, ResourceInterceptor};
pub use transport::{CookieStorage, ReqwestHttpClient, TransportConfig};
