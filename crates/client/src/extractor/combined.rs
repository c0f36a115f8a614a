use std::sync::Arc;

use sitekey_core::SiteKeysConfiguration;

use super::{HeaderExtractor, Intercept, ScriptExtractor, WebRequest};

/// Script extraction for the main frame, HTTP mirroring for sub-frames.
///
/// The page itself loads normally and reports its key from script, while iframes, which
/// the script bridge cannot see, are verified from their response headers.
#[derive(Debug)]
pub struct CombinedExtractor {
    script: ScriptExtractor,
    header: HeaderExtractor,
}

impl CombinedExtractor {
    pub fn new(script: ScriptExtractor, header: HeaderExtractor) -> Self {
        Self { script, header }
    }

    pub fn extract(&self, request: &WebRequest) -> Intercept {
        if request.is_main_frame() { self.script.extract(request) } else { self.header.extract(request) }
    }

    pub fn start_new_page(&self) {
        self.script.start_new_page();
        self.header.start_new_page();
    }

    pub fn wait_for_check(&self, url: &str, is_main_frame: bool) -> bool {
        self.script.wait_for_check(url, is_main_frame)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.script.set_enabled(enabled);
        self.header.set_enabled(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.script.is_enabled()
    }

    pub fn set_configuration(&self, configuration: Option<Arc<SiteKeysConfiguration>>) {
        self.header.set_configuration(configuration.clone());
        self.script.set_configuration(configuration);
    }

    pub fn script(&self) -> &ScriptExtractor {
        &self.script
    }

    pub fn header(&self) -> &HeaderExtractor {
        &self.header
    }
}
