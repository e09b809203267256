use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Normalizes anchor text for comparison
///
/// # Normalization Steps
///
/// 1. Lowercase
/// 2. Newlines and non-breaking spaces become plain spaces
/// 3. Apostrophes and soft hyphens are removed, en dashes become `-`
/// 4. Leading/trailing slashes and whitespace are trimmed
/// 5. Internal whitespace runs collapse to a single space
/// 6. Trailing non-alphabetic characters are removed
///
/// The function is idempotent: `normalize(normalize(x)) == normalize(x)`.
///
/// # Examples
///
/// ```
/// use linkwatch::url::normalize;
///
/// assert_eq!(normalize("  Best   Casino Sites!! "), "best casino sites");
/// assert_eq!(normalize("/Rock’n Roll/"), "rockn roll");
/// ```
pub fn normalize(text: &str) -> String {
    let mut lowered = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        match c {
            '\n' | '\u{a0}' => lowered.push(' '),
            '\'' | '\u{2019}' | '\u{ad}' => {}
            '\u{2013}' => lowered.push('-'),
            other => lowered.push(other),
        }
    }

    let trimmed = lowered.trim_matches(|c: char| c == '/' || c.is_whitespace());
    let collapsed = WHITESPACE_RUN.replace_all(trimmed, " ");

    collapsed
        .trim_end_matches(|c: char| !c.is_alphabetic())
        .to_string()
}

/// Canonicalizes a link (acceptor) URL so it always ends with `/`
///
/// # Examples
///
/// ```
/// use linkwatch::url::canonicalize_link_url;
///
/// assert_eq!(canonicalize_link_url("https://acceptor.example"), "https://acceptor.example/");
/// assert_eq!(canonicalize_link_url("https://acceptor.example/"), "https://acceptor.example/");
/// ```
pub fn canonicalize_link_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}
