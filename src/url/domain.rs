use once_cell::sync::Lazy;
use regex::Regex;

static HOST_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?:)?(?://)?(?:[^@/\n]+@)?(?:www\.)?([^:/?\n]+\.[^:/?\n]+)")
        .expect("valid regex")
});

/// Extracts the domain name from a URL-like string
///
/// The match is permissive: the scheme, a `www.` prefix, userinfo, port,
/// path and query are all optional. The result is lowercase. An empty string
/// is returned when no host-like token (something containing a dot) is found.
///
/// # Examples
///
/// ```
/// use linkwatch::url::extract_domain;
///
/// assert_eq!(extract_domain("HTTPS://WWW.Example.COM/path?q=1"), "example.com");
/// assert_eq!(extract_domain("//cdn.example.org/lib.js"), "cdn.example.org");
/// assert_eq!(extract_domain("localhost"), "");
/// ```
pub fn extract_domain(url: &str) -> String {
    let lowered = url.to_lowercase();
    HOST_TOKEN
        .captures(&lowered)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Removes a leading `https:` scheme, leaving a scheme-relative URL
pub fn strip_https(url: &str) -> &str {
    url.strip_prefix("https:").unwrap_or(url)
}

/// Returns true if an href stays on the page it appears on
///
/// Fragment, query and path-relative hrefs as well as non-navigational
/// schemes never point at another domain.
pub fn is_same_page_href(href: &str) -> bool {
    let href = href.trim();
    if href.starts_with("//") {
        return false;
    }
    href.is_empty()
        || href.starts_with('/')
        || href.starts_with('#')
        || href.starts_with('?')
        || href.starts_with("./")
        || href.starts_with("../")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
}
