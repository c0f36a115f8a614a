//! In-memory cache of verified public keys, keyed by request URL.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Maps a request URL to the base64 public key that was verified for it.
///
/// Keys are exact URL strings; a later insert for the same URL replaces the earlier one.
/// Entries are only ever written after a successful signature verification.
#[derive(Debug, Default)]
pub struct PublicKeyCache {
    keys: RwLock<HashMap<String, String>>,
}

impl PublicKeyCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the verified public key for `url`.
    pub fn put(&self, url: &str, public_key: &str) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(url.to_string(), public_key.to_string());
    }

    /// The public key verified for `url`, if any.
    pub fn get(&self, url: &str) -> Option<String> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(url).cloned()
    }

    /// The key of the first URL in `urls` that has one, or `default`.
    ///
    /// Used with a referrer chain to find the key of the nearest verified document.
    pub fn get_any<S: AsRef<str>>(&self, urls: &[S], default: &str) -> String {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        urls.iter()
            .find_map(|url| keys.get(url.as_ref()))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.keys.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove trailing `=` padding so the key matches the `sitekey=` filter option syntax.
    pub fn strip_padding(key: &str) -> &str {
        key.trim_end_matches('=')
    }
}
