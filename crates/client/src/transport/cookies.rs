//! Cookie bridge between the mirrored transport and the host's cookie jar.
//!
//! The extractor's requests should carry the same cookies the host would have sent. The
//! host's navigation context travels with each request as two property headers, which the
//! transport strips before anything goes on the wire. Cookies set by redirect responses are
//! written back to the host jar; those of final responses reach the host with the response.

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use sitekey_core::url_without_fragment;
use url::Url;

pub const HEADER_PROP_ACCEPT_TPC: &str = "x-prop-accept-tpc";
pub const HEADER_PROP_NAVIGATION_URL: &str = "x-prop-navigation-url";

/// The host's cookie jar.
pub trait CookieStorage: Send + Sync {
    /// Whether the host accepts cookies at all.
    fn accepts_cookies(&self) -> bool;

    /// The `Cookie` header value the host would send to `url`.
    fn cookie(&self, url: &str) -> Option<String>;

    /// Store a `Set-Cookie` value received from `url`.
    fn set_cookie(&self, url: &str, cookie: &str);
}

/// Navigation context carried by the property headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub navigation_url: Option<String>,
    pub accept_third_party_cookies: bool,
}

/// Attach the host's navigation context to an outgoing request.
pub fn add_property_headers(headers: &mut HeaderMap, navigation_url: Option<&str>, accept_third_party_cookies: bool) {
    headers.insert(HEADER_PROP_ACCEPT_TPC, HeaderValue::from_static(if accept_third_party_cookies { "true" } else { "false" }));
    if let Some(value) = navigation_url.and_then(|url| HeaderValue::from_str(url).ok()) {
        headers.insert(HEADER_PROP_NAVIGATION_URL, value);
    }
}

/// Remove the property headers from `headers` and return the context they carried.
pub fn take_property_headers(headers: &mut HeaderMap) -> RequestContext {
    let accept_third_party_cookies = headers
        .remove(HEADER_PROP_ACCEPT_TPC)
        .and_then(|v| v.to_str().ok().map(|s| s.trim().eq_ignore_ascii_case("true")))
        .unwrap_or(false);
    let navigation_url = headers
        .remove(HEADER_PROP_NAVIGATION_URL)
        .and_then(|v| v.to_str().ok().map(str::to_string));
    RequestContext { navigation_url, accept_third_party_cookies }
}

/// Append the host's cookies for `url` to `headers` if the context allows sending them.
pub fn attach_cookies(storage: &dyn CookieStorage, context: &RequestContext, url: &Url, headers: &mut HeaderMap) {
    if !storage.accepts_cookies() {
        return;
    }
    let Some(cookie) = storage.cookie(url_without_fragment(url.as_str())) else {
        return;
    };

    let document_url = context.navigation_url.as_deref().unwrap_or(url.as_str());
    if !context.accept_third_party_cookies && !is_first_party_cookie(document_url, url.as_str(), &cookie) {
        tracing::debug!(url = %url, "dropping third-party cookies");
        return;
    }

    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.append(COOKIE, value);
        }
        Err(e) => tracing::warn!(url = %url, error = %e, "host cookie is not a valid header value"),
    }
}

/// Persist every `Set-Cookie` of a redirect response into the host jar.
pub fn store_redirect_cookies(storage: &dyn CookieStorage, url: &Url, response_headers: &HeaderMap) {
    if !storage.accepts_cookies() {
        return;
    }
    let url = url_without_fragment(url.as_str());
    for value in response_headers.get_all(reqwest::header::SET_COOKIE) {
        if let Ok(cookie) = value.to_str() {
            storage.set_cookie(url, cookie);
        }
    }
}

/// Whether `cookie`, sent to `request_url`, belongs to the site of `document_url`.
///
/// The cookie domain is its `Domain` attribute, or the request host when it has none.
pub fn is_first_party_cookie(document_url: &str, request_url: &str, cookie: &str) -> bool {
    let Some(document_domain) = host_of(document_url) else {
        tracing::error!(url = document_url, "no domain in document url");
        return false;
    };

    let cookie_domain = match domain_attribute(cookie) {
        Some(domain) => domain,
        None => match host_of(request_url) {
            Some(host) => host,
            None => {
                tracing::error!(url = request_url, "no domain in request url");
                return false;
            }
        },
    };

    domain_matches(&cookie_domain, &document_domain)
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .filter(|h| !h.is_empty())
}

/// `Domain` attribute of the first cookie in `cookie`, lowercased, without a leading dot.
fn domain_attribute(cookie: &str) -> Option<String> {
    cookie
        .split(';')
        .skip(1)
        .filter_map(|attr| attr.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("domain"))
        .map(|(_, value)| value.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|domain| !domain.is_empty())
}

/// Cookie domain matching: `host` equals `domain` or is a subdomain of it.
fn domain_matches(domain: &str, host: &str) -> bool {
    if !domain.contains('.') {
        return false;
    }
    host == domain || host.strip_suffix(domain).is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const NAVIGATION_URL: &str = "https://some.domain.com/";

    #[derive(Default)]
    struct MemoryJar {
        accepts: bool,
        cookie: Option<String>,
        stored: Mutex<Vec<(String, String)>>,
    }

    impl CookieStorage for MemoryJar {
        fn accepts_cookies(&self) -> bool {
            self.accepts
        }

        fn cookie(&self, _url: &str) -> Option<String> {
            self.cookie.clone()
        }

        fn set_cookie(&self, url: &str, cookie: &str) {
            self.stored.lock().unwrap().push((url.to_string(), cookie.to_string()));
        }
    }

    #[test]
    fn test_first_party_cookies() {
        for (url, cookie) in [
            ("https://some.domain.com/1", "somecookie=someValue; Path=/;"),
            ("https://blabla.com/2", "somecookie=someValue; Path=/; Domain=.domain.com"),
            ("https://blabla.om/3", "somecookie=someValue; Path=/; Domain=some.domain.com"),
        ] {
            assert!(is_first_party_cookie(NAVIGATION_URL, url, cookie), "{url}");
        }
    }

    #[test]
    fn test_third_party_cookies() {
        for (url, cookie) in [
            ("https://blabla.com/1", "somecookie=someValue; Path=/;"),
            ("https://some.domain.com/2", "somecookie=someValue; Path=/; Domain=blabla.com"),
            ("https://blabla.om/3", "somecookie=someValue; Path=/; Domain=www.some.domain.com"),
            ("https://some.domain.com/4", "somecookie=someValue; Domain=com"),
        ] {
            assert!(!is_first_party_cookie(NAVIGATION_URL, url, cookie), "{url}");
        }
    }

    #[test]
    fn test_domain_matches_requires_label_boundary() {
        assert!(domain_matches("google.com", "www.google.com"));
        assert!(domain_matches("google.com", "google.com"));
        assert!(!domain_matches("google.com", "gogoogle.com"));
        assert!(!domain_matches("www.google.com", "google.com"));
    }

    #[test]
    fn test_property_headers_round_trip() {
        let mut headers = HeaderMap::new();
        add_property_headers(&mut headers, Some(NAVIGATION_URL), true);
        assert_eq!(headers.len(), 2);

        let context = take_property_headers(&mut headers);
        assert!(headers.is_empty());
        assert_eq!(context.navigation_url.as_deref(), Some(NAVIGATION_URL));
        assert!(context.accept_third_party_cookies);
    }

    #[test]
    fn test_missing_property_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(take_property_headers(&mut headers), RequestContext::default());
    }

    #[test]
    fn test_attach_first_party_cookie() {
        let jar =
            MemoryJar { accepts: true, cookie: Some("sid=1; Domain=some.domain.com".into()), ..Default::default() };
        let context = RequestContext { navigation_url: Some(NAVIGATION_URL.into()), accept_third_party_cookies: false };
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("existing=1"));

        attach_cookies(&jar, &context, &Url::parse("https://cdn.some.domain.com/").unwrap(), &mut headers);

        let cookies: Vec<_> = headers.get_all(COOKIE).iter().collect();
        assert_eq!(cookies, vec!["existing=1", "sid=1; Domain=some.domain.com"]);
    }

    #[test]
    fn test_attach_skips_subdomain_host_cookie() {
        let jar = MemoryJar { accepts: true, cookie: Some("sid=1".into()), ..Default::default() };
        let context = RequestContext { navigation_url: Some(NAVIGATION_URL.into()), accept_third_party_cookies: false };
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("existing=1"));

        attach_cookies(&jar, &context, &Url::parse("https://cdn.some.domain.com/").unwrap(), &mut headers);

        let cookies: Vec<_> = headers.get_all(COOKIE).iter().collect();
        assert_eq!(cookies, vec!["existing=1"]);
    }

    #[test]
    fn test_attach_skips_third_party_unless_accepted() {
        let jar = MemoryJar { accepts: true, cookie: Some("sid=1".into()), ..Default::default() };
        let url = Url::parse("https://tracker.example/").unwrap();

        let mut context = RequestContext { navigation_url: Some(NAVIGATION_URL.into()), accept_third_party_cookies: false };
        let mut headers = HeaderMap::new();
        attach_cookies(&jar, &context, &url, &mut headers);
        assert!(headers.get(COOKIE).is_none());

        context.accept_third_party_cookies = true;
        attach_cookies(&jar, &context, &url, &mut headers);
        assert_eq!(headers.get(COOKIE).unwrap(), "sid=1");
    }

    #[test]
    fn test_attach_without_navigation_url_uses_request_url() {
        let jar = MemoryJar { accepts: true, cookie: Some("sid=1".into()), ..Default::default() };
        let mut headers = HeaderMap::new();
        attach_cookies(&jar, &RequestContext::default(), &Url::parse("https://a.example.org/").unwrap(), &mut headers);
        assert_eq!(headers.get(COOKIE).unwrap(), "sid=1");
    }

    #[test]
    fn test_jar_refusing_cookies() {
        let jar = MemoryJar { accepts: false, cookie: Some("sid=1".into()), ..Default::default() };
        let url = Url::parse("https://some.domain.com/#top").unwrap();
        let mut headers = HeaderMap::new();
        attach_cookies(&jar, &RequestContext::default(), &url, &mut headers);
        assert!(headers.is_empty());

        let mut response = HeaderMap::new();
        response.append(reqwest::header::SET_COOKIE, HeaderValue::from_static("a=1"));
        store_redirect_cookies(&jar, &url, &response);
        assert!(jar.stored.lock().unwrap().is_empty());
    }

    #[test]
    fn test_store_redirect_cookies() {
        let jar = MemoryJar { accepts: true, ..Default::default() };
        let mut response = HeaderMap::new();
        response.append(reqwest::header::SET_COOKIE, HeaderValue::from_static("a=1"));
        response.append(reqwest::header::SET_COOKIE, HeaderValue::from_static("b=2; Path=/"));

        store_redirect_cookies(&jar, &Url::parse("https://some.domain.com/r#frag").unwrap(), &response);

        let stored = jar.stored.lock().unwrap();
        assert_eq!(
            *stored,
            vec![
                ("https://some.domain.com/r".to_string(), "a=1".to_string()),
                ("https://some.domain.com/r".to_string(), "b=2; Path=/".to_string()),
            ]
        );
    }
}
