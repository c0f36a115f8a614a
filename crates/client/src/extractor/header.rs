use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use reqwest::Method;
use sitekey_core::transport::{HEADER_RANGE, is_redirect_code, is_valid_code};
use sitekey_core::{HttpRequest, ServerResponse, SiteKeysConfiguration, TransportError};

use super::{ExtractorBase, Intercept, WebRequest, response};
use crate::error::ExtractError;
use crate::host::HostRef;
use crate::transport::cookies;

/// Mirrors frame requests over HTTP to read the site-key response header.
///
/// The calling thread is blocked until the mirrored request completes, so sub-resources of a
/// frame can only be requested after its key has been verified. [`Self::wait_for_check`]
/// therefore never holds anything.
#[derive(Debug)]
pub struct HeaderExtractor {
    base: ExtractorBase,
    accept_third_party_cookies: AtomicBool,
    js_in_frames_enabled: bool,
}

impl HeaderExtractor {
    pub fn new(host: HostRef, js_in_frames_enabled: bool) -> Self {
        Self { base: ExtractorBase::new(host), accept_third_party_cookies: AtomicBool::new(false), js_in_frames_enabled }
    }

    /// Mirror `request`, verify the site-key header of the response and return the response
    /// for the host to render.
    pub fn extract(&self, request: &WebRequest) -> Intercept {
        match self.try_extract(request) {
            Ok(intercept) => intercept,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "header extraction failed, allowing load");
                Intercept::PassThrough
            }
        }
    }

    fn try_extract(&self, request: &WebRequest) -> Result<Intercept, ExtractError> {
        if !self.is_enabled() {
            return Ok(Intercept::PassThrough);
        }
        let Some(configuration) = self.base.configuration() else {
            tracing::debug!(url = %request.url, "no site-keys configuration, allowing load");
            return Ok(Intercept::PassThrough);
        };
        if request.method != Method::GET || request.headers.contains_key(HEADER_RANGE) {
            return Ok(Intercept::PassThrough);
        }
        if !configuration.is_alive() {
            return Err(ExtractError::SessionDisposed);
        }

        let response = self.send_request(&configuration, request)?;

        if !is_valid_code(response.status) || is_redirect_code(response.status) {
            tracing::debug!(url = %request.url, status = response.status, "status not servable, allowing load");
            return Ok(Intercept::PassThrough);
        }
        if response.body.is_none() {
            return Err(ExtractError::MissingBody);
        }

        let url = response.final_url.clone().unwrap_or_else(|| request.url.clone());

        match configuration.alive() {
            Some(session) => session.verifier().verify_in_headers(&url, &request.headers, &response.headers),
            None => return Err(ExtractError::SessionDisposed),
        }

        let host = self.base.host.upgrade().ok_or(ExtractError::HostGone)?;
        let processed = response::process(host.as_ref(), &url, response, self.js_in_frames_enabled)?;
        Ok(Intercept::Respond(processed))
    }

    /// Issue the mirrored request and block until its completion is delivered.
    fn send_request(
        &self, configuration: &Arc<SiteKeysConfiguration>, request: &WebRequest,
    ) -> Result<ServerResponse, ExtractError> {
        let mut headers = request.headers.clone();
        if let Some(host) = self.base.host.upgrade() {
            cookies::add_property_headers(
                &mut headers,
                host.navigation_url().as_deref(),
                self.accept_third_party_cookies.load(Ordering::Acquire),
            );
        }

        let http_request =
            HttpRequest { url: request.url.clone(), method: request.method.clone(), headers, follow_redirects: true };

        let (tx, rx) = mpsc::sync_channel(1);
        configuration.http_client().request(
            http_request,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        let result = rx.recv().map_err(|_| TransportError::Abandoned)?;
        Ok(result?)
    }

    /// Refresh the third-party cookie setting for the new page.
    pub fn start_new_page(&self) {
        if !self.is_enabled() {
            return;
        }
        if let Some(host) = self.base.host.upgrade() {
            self.accept_third_party_cookies.store(host.accepts_third_party_cookies(), Ordering::Release);
        }
    }

    /// Frames are verified synchronously in [`Self::extract`], nothing is ever held.
    pub fn wait_for_check(&self, _url: &str, _is_main_frame: bool) -> bool {
        false
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.base.set_enabled(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.base.is_enabled()
    }

    pub fn set_configuration(&self, configuration: Option<Arc<SiteKeysConfiguration>>) {
        self.base.set_configuration(configuration);
    }
}
