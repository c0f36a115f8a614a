use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use sitekey_core::{SiteKeysConfiguration, url_without_fragment};

use super::{ExtractorBase, Intercept, Latch, WebRequest};
use crate::host::{HostRef, TaskRunner};

/// Per-page progress of the script extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// No page has started since construction.
    Idle,
    /// A page started and has not reported its key yet.
    AwaitingExtraction,
    /// The page reported, or extraction was disabled.
    Finished,
}

#[derive(Debug)]
struct ScriptShared {
    base: ExtractorBase,
    runner: TaskRunner,
    hold_timeout: Duration,
    latch: Mutex<Option<Arc<Latch>>>,
    finished: AtomicBool,
    bridge_registered: AtomicBool,
}

impl ScriptShared {
    /// Mark the page finished and wake every held request.
    fn finish(&self) {
        let latch = self.latch.lock().unwrap_or_else(PoisonError::into_inner);
        self.finished.store(true, Ordering::Release);
        if let Some(latch) = latch.as_ref() {
            latch.release();
        }
    }

    fn current_latch(&self) -> Option<Arc<Latch>> {
        self.latch.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Extracts the page site key through a callback bridge called by page script.
///
/// Every new page arms a latch. Sub-resource requests block on it in [`Self::wait_for_check`]
/// for at most the hold timeout, and a terminal callback from the page releases it. Bridge
/// registration changes are posted to the host's task runner.
#[derive(Debug)]
pub struct ScriptExtractor {
    shared: Arc<ScriptShared>,
}

impl ScriptExtractor {
    /// Name under which the bridge is exposed to page script.
    pub const BRIDGE_NAME: &str = "AbpCallback";

    /// Create the extractor and register its bridge with the host right away.
    ///
    /// Must be called on the host's script thread.
    pub fn new(host: HostRef, runner: TaskRunner, hold_timeout: Duration) -> Self {
        let shared = Arc::new(ScriptShared {
            base: ExtractorBase::new(host.clone()),
            runner,
            hold_timeout,
            latch: Mutex::new(None),
            finished: AtomicBool::new(false),
            bridge_registered: AtomicBool::new(false),
        });

        if let Some(host_view) = host.upgrade() {
            host_view.add_callback_bridge(Self::BRIDGE_NAME, ScriptBridge::new(&shared, host));
            shared.bridge_registered.store(true, Ordering::Release);
        }

        Self { shared }
    }

    /// Script extraction does not intercept requests.
    pub fn extract(&self, _request: &WebRequest) -> Intercept {
        Intercept::PassThrough
    }

    /// Arm a fresh latch for the new page, releasing any request still held by the old one.
    pub fn start_new_page(&self) {
        let previous = {
            let mut latch = self.shared.latch.lock().unwrap_or_else(PoisonError::into_inner);
            self.shared.finished.store(false, Ordering::Release);
            latch.replace(Arc::new(Latch::new()))
        };
        if let Some(previous) = previous {
            previous.release();
        }
    }

    /// Hold a sub-resource request until the page key is known or the hold timeout passes.
    ///
    /// Returns whether the caller was held. Main frames, a disabled extractor and finished
    /// pages are never held.
    pub fn wait_for_check(&self, url: &str, is_main_frame: bool) -> bool {
        if is_main_frame {
            tracing::debug!(url, "main frame is not held");
            return false;
        }
        if !self.is_enabled() || self.shared.finished.load(Ordering::Acquire) {
            return false;
        }
        let Some(latch) = self.shared.current_latch() else {
            tracing::warn!(url, "no page started, request is not held");
            return false;
        };

        tracing::debug!(url, "holding request until site-key check completes");
        if !latch.wait_timeout(self.shared.hold_timeout) {
            tracing::debug!(url, "site-key check did not finish in time, releasing request");
        }
        true
    }

    /// Enable or disable extraction.
    ///
    /// Disabling finishes the current page at once and releases held requests. Bridge
    /// registration follows on the host's thread: a posted task registers or removes it to
    /// match the enabled flag at the time the task runs.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.base.set_enabled(enabled);

        if !enabled {
            let previous = {
                let mut latch = self.shared.latch.lock().unwrap_or_else(PoisonError::into_inner);
                self.shared.finished.store(true, Ordering::Release);
                latch.take()
            };
            if let Some(previous) = previous {
                previous.release();
            }
        } else if self.shared.bridge_registered.load(Ordering::Acquire) {
            return;
        }

        let shared = Arc::downgrade(&self.shared);
        let host = self.shared.base.host.clone();
        self.shared.runner.post(move || sync_bridge(&shared, host));
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.base.is_enabled()
    }

    pub fn set_configuration(&self, configuration: Option<Arc<SiteKeysConfiguration>>) {
        self.shared.base.set_configuration(configuration);
    }

    pub fn state(&self) -> PageState {
        let latch = self.shared.latch.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.finished.load(Ordering::Acquire) {
            PageState::Finished
        } else if latch.is_some() {
            PageState::AwaitingExtraction
        } else {
            PageState::Idle
        }
    }
}

impl Drop for ScriptExtractor {
    fn drop(&mut self) {
        if let Some(latch) = self.shared.current_latch() {
            latch.release();
        }
    }
}

/// Register or remove the bridge so it matches the extractor's enabled flag.
fn sync_bridge(shared: &Weak<ScriptShared>, host: HostRef) {
    let Some(host_view) = host.upgrade() else {
        return;
    };
    match shared.upgrade() {
        Some(shared) if shared.base.is_enabled() => {
            if !shared.bridge_registered.swap(true, Ordering::AcqRel) {
                host_view.add_callback_bridge(ScriptExtractor::BRIDGE_NAME, ScriptBridge::new(&shared, host));
            }
        }
        Some(shared) => {
            host_view.remove_callback_bridge(ScriptExtractor::BRIDGE_NAME);
            shared.bridge_registered.store(false, Ordering::Release);
        }
        None => host_view.remove_callback_bridge(ScriptExtractor::BRIDGE_NAME),
    }
}

/// The object page script calls back into.
///
/// Holds the extractor weakly: once the extractor is gone, any call unregisters the bridge
/// from the host and does nothing else.
#[derive(Debug, Clone)]
pub struct ScriptBridge {
    extractor: Weak<ScriptShared>,
    host: HostRef,
}

impl ScriptBridge {
    fn new(shared: &Arc<ScriptShared>, host: HostRef) -> Self {
        Self { extractor: Arc::downgrade(shared), host }
    }

    /// Resolve the extractor, or unregister this bridge if it is gone.
    fn extractor(&self) -> Option<Arc<ScriptShared>> {
        let extractor = self.extractor.upgrade();
        if extractor.is_none()
            && let Some(host) = self.host.upgrade()
        {
            tracing::debug!("extractor released, removing callback bridge");
            host.remove_callback_bridge(ScriptExtractor::BRIDGE_NAME);
        }
        extractor
    }

    /// The page found a site key in its document.
    pub fn on_key_extracted(&self, public_key: &str, url: &str, user_agent: &str) {
        let Some(extractor) = self.extractor() else {
            return;
        };
        if !extractor.base.is_enabled() {
            return;
        }

        let url = url_without_fragment(url);
        if public_key.trim().is_empty() {
            tracing::debug!(url, "page reported an empty site key");
            extractor.finish();
            return;
        }

        tracing::debug!(url, "site key reported by page");
        match extractor.base.configuration() {
            Some(configuration) => match configuration.alive() {
                Some(session) => match session.verifier().verify(url, Some(user_agent), public_key) {
                    Ok(true) => tracing::debug!(url, "public key verified successfully"),
                    Ok(false) => tracing::error!(url, "public key is not verified"),
                    Err(e) => tracing::error!(url, error = %e, "failed to verify site key"),
                },
                None => tracing::debug!(url, "session disposed, site key ignored"),
            },
            None => tracing::error!(url, "no site-keys configuration, site key ignored"),
        }

        extractor.finish();
    }

    /// The page has no site key.
    pub fn on_key_absent(&self, url: &str) {
        let Some(extractor) = self.extractor() else {
            return;
        };
        if !extractor.base.is_enabled() {
            return;
        }
        tracing::debug!(url, "page has no site key");
        extractor.finish();
    }

    /// The document was not ready to be inspected; the page is reset to awaiting.
    pub fn on_dom_not_ready(&self, url: &str) {
        let Some(extractor) = self.extractor() else {
            return;
        };
        if !extractor.base.is_enabled() {
            return;
        }
        tracing::debug!(url, "document not ready, site key pending");
        let _latch = extractor.latch.lock().unwrap_or_else(PoisonError::into_inner);
        extractor.finished.store(false, Ordering::Release);
    }
}
