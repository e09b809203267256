//! Text and URL utilities
//!
//! Anchor-text normalization, permissive domain extraction and link-URL
//! canonicalization. Everything here is pure and never fails.

mod domain;
mod normalize;

pub use domain::{extract_domain, is_same_page_href, strip_https};
pub use normalize::{canonicalize_link_url, normalize};

/// Returns true if `href` points at `expected`
///
/// Accepted forms: exact match, match ignoring surrounding slashes, and match
/// against the scheme-relative form of `expected` (`https:` stripped).
///
/// # Examples
///
/// ```
/// use linkwatch::url::href_matches;
///
/// let expected = "https://acceptor.example/";
/// assert!(href_matches("https://acceptor.example/", expected));
/// assert!(href_matches("https://acceptor.example", expected));
/// assert!(href_matches("//acceptor.example/", expected));
/// assert!(!href_matches("https://acceptor.example/other/", expected));
/// ```
pub fn href_matches(href: &str, expected: &str) -> bool {
    let href_trimmed = href.trim_matches('/');
    href == expected
        || href_trimmed == expected.trim_matches('/')
        || href_trimmed == strip_https(expected).trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_href_matches_exact() {
        assert!(href_matches("https://a.example/x/", "https://a.example/x/"));
    }

    #[test]
    fn test_href_matches_without_trailing_slash() {
        assert!(href_matches("https://a.example/x", "https://a.example/x/"));
    }

    #[test]
    fn test_href_matches_scheme_relative() {
        assert!(href_matches("//a.example/x", "https://a.example/x/"));
    }

    #[test]
    fn test_href_does_not_match_http_variant() {
        assert!(!href_matches("http://a.example/x", "https://a.example/x/"));
    }
}
