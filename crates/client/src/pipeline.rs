//! Resource-interception pipeline.
//!
//! Ties an extractor to a content filter: sub-resources wait for the page key check, are
//! matched against the filter with the site key of the nearest verified ancestor document,
//! and frames that survive filtering are handed to the extractor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::header::REFERER;
use sitekey_core::{PublicKeyCache, SiteKeysConfiguration};

use crate::extractor::{Intercept, SiteKeyExtractor, WebRequest};

/// The content filter consulted for every intercepted request.
pub trait FilterOracle: Send + Sync {
    /// Whether filtering is active at all.
    fn is_enabled(&self) -> bool;

    /// Whether an allowlisting subscription is active.
    fn allowlisting_enabled(&self) -> bool;

    /// Whether `url`, loaded under `referrer_chain`, must be blocked.
    fn should_block(&self, url: &str, referrer_chain: &[String], site_key: Option<&str>) -> bool;
}

/// Intercepts the requests of one host.
pub struct ResourceInterceptor {
    extractor: Arc<SiteKeyExtractor>,
    oracle: Arc<dyn FilterOracle>,
    configuration: Option<Arc<SiteKeysConfiguration>>,
    referrers: Mutex<HashMap<String, String>>,
}

impl ResourceInterceptor {
    pub fn new(
        extractor: Arc<SiteKeyExtractor>, oracle: Arc<dyn FilterOracle>, configuration: Option<Arc<SiteKeysConfiguration>>,
    ) -> Self {
        extractor.set_configuration(configuration.clone());
        Self { extractor, oracle, configuration, referrers: Mutex::new(HashMap::new()) }
    }

    /// Start a new top-level navigation.
    pub fn start_new_page(&self) {
        self.referrers.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.extractor.start_new_page();
    }

    /// Decide what the host does with `request`.
    pub fn intercept(&self, request: &WebRequest) -> Intercept {
        if !self.oracle.is_enabled() {
            return Intercept::PassThrough;
        }

        let url = request.url.as_str();
        if let Some(referrer) = request.headers.get(REFERER).and_then(|v| v.to_str().ok()) {
            self.record_referrer(url, referrer);
        }
        let referrer_chain = self.referrer_chain(url);

        let site_key_checks = self.site_key_checks();

        if !request.is_main_frame() {
            if site_key_checks {
                self.extractor.wait_for_check(url, false);
            }

            let site_key = match (&self.configuration, site_key_checks) {
                (Some(configuration), true) => {
                    let key = configuration.public_keys().get_any(&referrer_chain, "");
                    Some(PublicKeyCache::strip_padding(&key).to_string()).filter(|k| !k.is_empty())
                }
                _ => None,
            };

            if self.oracle.should_block(url, &referrer_chain, site_key.as_deref()) {
                tracing::debug!(url, "blocked");
                return Intercept::Block;
            }
        }

        if site_key_checks && request.is_frame() { self.extractor.extract(request) } else { Intercept::PassThrough }
    }

    /// Site-key work is done only for a live session, and only when allowlisting can use it
    /// or checks are forced.
    fn site_key_checks(&self) -> bool {
        self.configuration.as_ref().is_some_and(|configuration| {
            configuration.is_alive() && (configuration.force_checks() || self.oracle.allowlisting_enabled())
        })
    }

    fn record_referrer(&self, url: &str, referrer: &str) {
        if url == referrer {
            tracing::debug!(url, "referrer equals url, not recorded");
            return;
        }
        self.referrers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), referrer.to_string());
    }

    /// Ancestors of `url`, outermost first.
    pub fn referrer_chain(&self, url: &str) -> Vec<String> {
        let referrers = self.referrers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut chain: Vec<String> = Vec::new();
        let mut current = url;
        while let Some(parent) = referrers.get(current) {
            if chain.contains(parent) {
                tracing::warn!(url, "referrer loop detected");
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        chain.reverse();
        chain
    }
}

impl std::fmt::Debug for ResourceInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceInterceptor")
            .field("extractor", &self.extractor)
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}
