//! Site-key discovery in HTML documents.
//!
//! Pages that cannot set response headers publish their key as the `data-adblockkey`
//! attribute of the root `<html>` element. The injected page script reads the same attribute
//! and reports it through the callback bridge.

use scraper::Html;

pub const SITEKEY_ATTRIBUTE: &str = "data-adblockkey";

/// The `data-adblockkey` attribute of the document's root element, if present and non-empty.
pub fn document_site_key(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .root_element()
        .value()
        .attr(SITEKEY_ATTRIBUTE)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_attribute() {
        let html = r#"<!doctype html><html lang="en" data-adblockkey="KEY_SIG"><body></body></html>"#;
        assert_eq!(document_site_key(html), Some("KEY_SIG".to_string()));
    }

    #[test]
    fn test_missing_or_empty_attribute() {
        assert_eq!(document_site_key("<html><body></body></html>"), None);
        assert_eq!(document_site_key(r#"<html data-adblockkey=""></html>"#), None);
    }

    #[test]
    fn test_attribute_on_other_elements_ignored() {
        let html = r#"<html><body data-adblockkey="KEY_SIG"><div data-adblockkey="x"></div></body></html>"#;
        assert_eq!(document_site_key(html), None);
    }

    #[test]
    fn test_fragment_without_html_tag() {
        assert_eq!(document_site_key("<p>hello</p>"), None);
    }
}
