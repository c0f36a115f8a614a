//! The site-keys configuration shared by every extractor of an engine session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crate::codec::{Base64Codec, StandardBase64};
use crate::keys::PublicKeyCache;
use crate::signature::{RsaSha1Verifier, SignatureVerifier};
use crate::transport::HttpClient;
use crate::verifier::SiteKeyVerifier;

/// Bundles the verifier components with an HTTP client for one engine session.
///
/// Everything but `force_checks` is fixed at construction. The session can be disposed,
/// after which [`SiteKeysConfiguration::alive`] yields `None` and the cache is empty.
pub struct SiteKeysConfiguration {
    signature_verifier: Arc<dyn SignatureVerifier>,
    public_keys: Arc<PublicKeyCache>,
    http_client: Arc<dyn HttpClient>,
    verifier: SiteKeyVerifier,
    /// Allow site-key checks even when no allowlisting subscription is enabled.
    force_checks: AtomicBool,
    disposed: RwLock<bool>,
}

/// Read guard proving the session has not been disposed.
///
/// Disposal waits for outstanding guards to be dropped.
pub struct AliveGuard<'a> {
    config: &'a SiteKeysConfiguration,
    _lock: RwLockReadGuard<'a, bool>,
}

impl std::ops::Deref for AliveGuard<'_> {
    type Target = SiteKeysConfiguration;

    fn deref(&self) -> &Self::Target {
        self.config
    }
}

impl SiteKeysConfiguration {
    pub fn new(
        signature_verifier: Arc<dyn SignatureVerifier>, public_keys: Arc<PublicKeyCache>,
        http_client: Arc<dyn HttpClient>, verifier: SiteKeyVerifier,
    ) -> Self {
        Self {
            signature_verifier,
            public_keys,
            http_client,
            verifier,
            force_checks: AtomicBool::new(false),
            disposed: RwLock::new(false),
        }
    }

    /// Assemble a configuration from the reference RSA verifier, standard base64 and a
    /// fresh cache around `http_client`.
    pub fn with_defaults(http_client: Arc<dyn HttpClient>) -> Self {
        let signature_verifier: Arc<dyn SignatureVerifier> = Arc::new(RsaSha1Verifier);
        let public_keys = Arc::new(PublicKeyCache::new());
        let codec: Arc<dyn Base64Codec> = Arc::new(StandardBase64);
        let verifier = SiteKeyVerifier::new(signature_verifier.clone(), public_keys.clone(), codec);
        Self::new(signature_verifier, public_keys, http_client, verifier)
    }

    pub fn signature_verifier(&self) -> &Arc<dyn SignatureVerifier> {
        &self.signature_verifier
    }

    pub fn public_keys(&self) -> &Arc<PublicKeyCache> {
        &self.public_keys
    }

    pub fn http_client(&self) -> &Arc<dyn HttpClient> {
        &self.http_client
    }

    pub fn verifier(&self) -> &SiteKeyVerifier {
        &self.verifier
    }

    pub fn force_checks(&self) -> bool {
        self.force_checks.load(Ordering::Acquire)
    }

    pub fn set_force_checks(&self, force_checks: bool) {
        self.force_checks.store(force_checks, Ordering::Release);
    }

    /// Take a liveness guard, or `None` once the session is disposed.
    pub fn alive(&self) -> Option<AliveGuard<'_>> {
        let lock = self.disposed.read().unwrap_or_else(PoisonError::into_inner);
        if *lock {
            return None;
        }
        Some(AliveGuard { config: self, _lock: lock })
    }

    pub fn is_alive(&self) -> bool {
        self.alive().is_some()
    }

    /// Mark the session disposed and discard every cached key. Idempotent.
    pub fn dispose(&self) {
        let mut disposed = self.disposed.write().unwrap_or_else(PoisonError::into_inner);
        if !*disposed {
            *disposed = true;
            self.public_keys.clear();
            tracing::debug!("site-keys configuration disposed");
        }
    }
}

impl std::fmt::Debug for SiteKeysConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteKeysConfiguration")
            .field("verifier", &self.verifier)
            .field("force_checks", &self.force_checks())
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Completion, HttpRequest, TransportError};

    struct NoopClient;

    impl HttpClient for NoopClient {
        fn request(&self, _request: HttpRequest, completion: Completion) {
            completion(Err(TransportError::Abandoned));
        }
    }

    #[test]
    fn test_force_checks_toggle() {
        let config = SiteKeysConfiguration::with_defaults(Arc::new(NoopClient));
        assert!(!config.force_checks());
        config.set_force_checks(true);
        assert!(config.force_checks());
    }

    #[test]
    fn test_shared_cache() {
        let config = SiteKeysConfiguration::with_defaults(Arc::new(NoopClient));
        config.public_keys().put("https://example.com/", "key");
        assert_eq!(config.verifier().public_keys().get("https://example.com/").as_deref(), Some("key"));
    }

    #[test]
    fn test_dispose_clears_cache_and_liveness() {
        let config = SiteKeysConfiguration::with_defaults(Arc::new(NoopClient));
        config.public_keys().put("https://example.com/", "key");
        assert!(config.is_alive());

        config.dispose();
        config.dispose();

        assert!(!config.is_alive());
        assert!(config.alive().is_none());
        assert!(config.public_keys().is_empty());
    }
}
