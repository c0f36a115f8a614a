//! Site-key extractors.
//!
//! An extractor gets a page's `X-Adblock-Key` in front of the verifier before the page's
//! sub-resources are filtered. Two strategies exist:
//!
//! - [`HeaderExtractor`] mirrors each frame request over HTTP, verifies the response header
//!   and hands the response back to the host.
//! - [`ScriptExtractor`] lets the page report its key through a script callback bridge and
//!   holds sub-resource requests until the report arrives or a bounded wait runs out.
//!
//! [`CombinedExtractor`] routes main frames to the script path and sub-frames over HTTP.
//! Every extractor fails open: any internal error lets the resource load unverified.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;
use sitekey_core::SiteKeysConfiguration;

use crate::host::HostRef;

mod combined;
mod header;
mod latch;
pub mod response;
mod script;

pub use combined::CombinedExtractor;
pub use header::HeaderExtractor;
pub use latch::Latch;
pub use response::ResourceInfo;
pub use script::{PageState, ScriptBridge, ScriptExtractor};

/// Where an intercepted request will be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// The top-level document.
    MainFrame,
    /// A document loaded into an iframe.
    SubFrame,
    /// Any other sub-resource.
    Resource,
}

/// A resource request intercepted by the host.
#[derive(Debug, Clone)]
pub struct WebRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub kind: RequestKind,
}

impl WebRequest {
    pub fn get(url: impl Into<String>, kind: RequestKind) -> Self {
        Self { url: url.into(), method: Method::GET, headers: HeaderMap::new(), kind }
    }

    pub fn is_main_frame(&self) -> bool {
        self.kind == RequestKind::MainFrame
    }

    pub fn is_frame(&self) -> bool {
        matches!(self.kind, RequestKind::MainFrame | RequestKind::SubFrame)
    }
}

/// A response synthesized for the host in place of its own network load.
#[derive(Debug, Clone)]
pub struct WebResponse {
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What the host should do with an intercepted request.
#[derive(Debug, Clone)]
pub enum Intercept {
    /// Load the resource normally.
    PassThrough,
    /// Serve an empty response instead of the resource.
    Block,
    /// Serve this response instead of loading the resource.
    Respond(WebResponse),
}

impl Intercept {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::PassThrough)
    }
}

/// State shared by both extractor strategies.
#[derive(Debug)]
struct ExtractorBase {
    host: HostRef,
    enabled: AtomicBool,
    configuration: RwLock<Option<Arc<SiteKeysConfiguration>>>,
}

impl ExtractorBase {
    fn new(host: HostRef) -> Self {
        Self { host, enabled: AtomicBool::new(true), configuration: RwLock::new(None) }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn configuration(&self) -> Option<Arc<SiteKeysConfiguration>> {
        self.configuration.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_configuration(&self, configuration: Option<Arc<SiteKeysConfiguration>>) {
        *self.configuration.write().unwrap_or_else(PoisonError::into_inner) = configuration;
    }
}

/// The extraction strategy of one host, chosen at construction.
#[derive(Debug)]
pub enum SiteKeyExtractor {
    Header(HeaderExtractor),
    Script(ScriptExtractor),
    Combined(CombinedExtractor),
}

impl SiteKeyExtractor {
    /// Handle an intercepted request. Never fails; errors degrade to [`Intercept::PassThrough`].
    pub fn extract(&self, request: &WebRequest) -> Intercept {
        match self {
            Self::Header(extractor) => extractor.extract(request),
            Self::Script(extractor) => extractor.extract(request),
            Self::Combined(extractor) => extractor.extract(request),
        }
    }

    /// Reset per-page state when the host begins a new top-level navigation.
    pub fn start_new_page(&self) {
        match self {
            Self::Header(extractor) => extractor.start_new_page(),
            Self::Script(extractor) => extractor.start_new_page(),
            Self::Combined(extractor) => extractor.start_new_page(),
        }
    }

    /// Possibly block until the current page's key check finishes. Returns whether the
    /// caller was held.
    pub fn wait_for_check(&self, url: &str, is_main_frame: bool) -> bool {
        match self {
            Self::Header(extractor) => extractor.wait_for_check(url, is_main_frame),
            Self::Script(extractor) => extractor.wait_for_check(url, is_main_frame),
            Self::Combined(extractor) => extractor.wait_for_check(url, is_main_frame),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        match self {
            Self::Header(extractor) => extractor.set_enabled(enabled),
            Self::Script(extractor) => extractor.set_enabled(enabled),
            Self::Combined(extractor) => extractor.set_enabled(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Header(extractor) => extractor.is_enabled(),
            Self::Script(extractor) => extractor.is_enabled(),
            Self::Combined(extractor) => extractor.is_enabled(),
        }
    }

    pub fn set_configuration(&self, configuration: Option<Arc<SiteKeysConfiguration>>) {
        match self {
            Self::Header(extractor) => extractor.set_configuration(configuration),
            Self::Script(extractor) => extractor.set_configuration(configuration),
            Self::Combined(extractor) => extractor.set_configuration(configuration),
        }
    }
}
