//! HTML analysis for link verification
//!
//! This module inspects a donor page for:
//! - The anchor pointing at the expected acceptor URL, its text and `rel` tokens
//! - `<meta name="robots">` directives
//! - Outbound anchors to unrelated domains
//! - Visible text, for language detection

use crate::url::{extract_domain, href_matches, is_same_page_href};
use scraper::{ElementRef, Html, Selector};

/// Everything the classifier needs to know about one donor page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAnalysis {
    pub robots_noindex: bool,
    pub robots_nofollow: bool,

    /// An anchor pointing at the expected href was found
    pub anchor_found: bool,

    /// Lowercased `rel` tokens of the first matching anchor
    pub rel_tokens: Vec<String>,

    /// The first matching anchor carries a non-empty `rel` attribute
    pub has_rel: bool,

    /// Text of the first matching anchor
    pub anchor_text_found: Option<String>,

    /// Last href toward the acceptor domain seen before the scan stopped
    pub acceptor_href: Option<String>,

    pub matching_anchor_count: u32,
    pub total_anchor_count: u32,
    pub off_domain_anchor_count: u32,
}

impl PageAnalysis {
    pub fn rel_nofollow(&self) -> bool {
        self.rel_tokens.iter().any(|t| t == "nofollow")
    }

    pub fn rel_sponsored(&self) -> bool {
        self.rel_tokens.iter().any(|t| t == "sponsored")
    }

    /// True if no anchor mentions the acceptor domain at all
    ///
    /// On a plain 200 response this usually means the links are rendered
    /// client-side.
    pub fn acceptor_absent(&self) -> bool {
        !self.anchor_found && self.acceptor_href.is_none()
    }
}

/// Analyzes donor pages for one expected link
#[derive(Debug, Clone)]
pub struct PageAnalyzer {
    expected_href: String,
    page_domain: String,
    link_domain: String,
}

impl PageAnalyzer {
    /// Creates an analyzer for one link
    ///
    /// # Arguments
    ///
    /// * `expected_href` - The canonical acceptor URL the anchor must point at
    /// * `page_domain` - Domain of the donor page
    /// * `link_domain` - Domain of the acceptor URL
    pub fn new(expected_href: &str, page_domain: &str, link_domain: &str) -> Self {
        Self {
            expected_href: expected_href.to_string(),
            page_domain: page_domain.to_string(),
            link_domain: link_domain.to_string(),
        }
    }

    /// Parses `html` and extracts the link signals
    ///
    /// # Scan Rules
    ///
    /// - Anchors without `href` are ignored
    /// - Every anchor matching the expected href is counted
    /// - Relative and non-navigational hrefs never count as off-domain
    /// - An href whose domain is neither the donor's nor the acceptor's is
    ///   counted as off-domain and skipped
    /// - An href to the acceptor domain is remembered; the first one that
    ///   matches the expected href fixes the anchor text and `rel` tokens
    ///   and stops the scan
    ///
    /// Malformed HTML never fails: the parser recovers and whatever cannot be
    /// parsed is simply not found.
    pub fn analyze(&self, html: &str) -> PageAnalysis {
        let document = Html::parse_document(html);
        let mut analysis = PageAnalysis::default();

        self.read_meta_robots(&document, &mut analysis);

        let anchors: Vec<ElementRef<'_>> = match Selector::parse("a[href]") {
            Ok(selector) => document.select(&selector).collect(),
            Err(_) => Vec::new(),
        };

        for anchor in &anchors {
            if let Some(href) = anchor.value().attr("href") {
                analysis.total_anchor_count += 1;
                if href_matches(href, &self.expected_href) {
                    analysis.matching_anchor_count += 1;
                }
            }
        }

        for anchor in &anchors {
            let href = match anchor.value().attr("href") {
                Some(href) => href,
                None => continue,
            };

            if is_same_page_href(href) {
                continue;
            }

            let href_domain = extract_domain(href);
            if href_domain.is_empty() {
                continue;
            }

            if href_domain != self.page_domain && href_domain != self.link_domain {
                analysis.off_domain_anchor_count += 1;
                continue;
            }

            if href_domain != self.link_domain {
                continue;
            }

            analysis.acceptor_href = Some(href.to_string());

            if href_matches(href, &self.expected_href) {
                analysis.anchor_found = true;
                analysis.anchor_text_found = Some(anchor.text().collect::<String>());

                if let Some(rel) = anchor.value().attr("rel") {
                    analysis.rel_tokens = rel
                        .split_whitespace()
                        .map(|t| t.to_ascii_lowercase())
                        .collect();
                    analysis.has_rel = !analysis.rel_tokens.is_empty();
                }
                break;
            }
        }

        analysis
    }

    /// Reads the first `<meta name="robots">` tag only
    fn read_meta_robots(&self, document: &Html, analysis: &mut PageAnalysis) {
        let selector = match Selector::parse("meta[name]") {
            Ok(selector) => selector,
            Err(_) => return,
        };

        let robots = document.select(&selector).find(|meta| {
            meta.value()
                .attr("name")
                .map(|name| name.trim().eq_ignore_ascii_case("robots"))
                .unwrap_or(false)
        });

        if let Some(meta) = robots {
            let content = meta
                .value()
                .attr("content")
                .unwrap_or("")
                .to_ascii_lowercase();
            analysis.robots_noindex = content.contains("noindex");
            analysis.robots_nofollow = content.contains("nofollow");
        }
    }
}

const INVISIBLE_ELEMENTS: &[&str] = &["style", "script", "head", "title", "meta", "noscript"];

/// Extracts the human-visible text of a page
///
/// Text inside `style`, `script`, `head`, `title`, `meta` and `noscript`
/// elements is skipped, as are comments. Fragments are trimmed and joined
/// with single spaces.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut fragments = Vec::new();
    collect_text(document.root_element(), &mut fragments);
    fragments.join(" ")
}

fn collect_text(element: ElementRef<'_>, fragments: &mut Vec<String>) {
    if INVISIBLE_ELEMENTS.contains(&element.value().name()) {
        return;
    }

    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                fragments.push(trimmed.to_string());
            }
        } else if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, fragments);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> PageAnalyzer {
        PageAnalyzer::new("https://acceptor.example/", "donor.example", "acceptor.example")
    }

    #[test]
    fn test_finds_matching_anchor() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="https://acceptor.example/">Expected Anchor</a>
        </body></html>"#;

        let analysis = analyzer().analyze(html);
        assert!(analysis.anchor_found);
        assert_eq!(analysis.anchor_text_found.as_deref(), Some("Expected Anchor"));
        assert_eq!(analysis.matching_anchor_count, 1);
        assert_eq!(analysis.total_anchor_count, 2);
        assert!(!analysis.has_rel);
    }

    #[test]
    fn test_reads_rel_tokens() {
        let html = r#"<a href="https://acceptor.example" rel="NoFollow sponsored">x</a>"#;

        let analysis = analyzer().analyze(html);
        assert!(analysis.anchor_found);
        assert!(analysis.has_rel);
        assert!(analysis.rel_nofollow());
        assert!(analysis.rel_sponsored());
    }

    #[test]
    fn test_first_match_wins() {
        let html = r#"
            <a href="https://acceptor.example/">First</a>
            <a href="https://acceptor.example/" rel="nofollow">Second</a>
        "#;

        let analysis = analyzer().analyze(html);
        assert_eq!(analysis.anchor_text_found.as_deref(), Some("First"));
        assert!(!analysis.rel_nofollow());
        assert_eq!(analysis.matching_anchor_count, 2);
    }

    #[test]
    fn test_scheme_relative_href_matches() {
        let html = r#"<a href="//acceptor.example/">x</a>"#;
        assert!(analyzer().analyze(html).anchor_found);
    }

    #[test]
    fn test_records_differing_acceptor_href() {
        let html = r#"<a href="https://acceptor.example/pricing/">Pricing</a>"#;

        let analysis = analyzer().analyze(html);
        assert!(!analysis.anchor_found);
        assert_eq!(
            analysis.acceptor_href.as_deref(),
            Some("https://acceptor.example/pricing/")
        );
        assert!(!analysis.acceptor_absent());
    }

    #[test]
    fn test_counts_off_domain_anchors() {
        let html = r##"
            <a href="https://casino.example/">a</a>
            <a href="https://pills.example/">b</a>
            <a href="https://donor.example/page">c</a>
            <a href="#top">d</a>
            <a href="mailto:x@y.example">e</a>
        "##;

        let analysis = analyzer().analyze(html);
        assert_eq!(analysis.off_domain_anchor_count, 2);
        assert!(analysis.acceptor_absent());
    }

    #[test]
    fn test_meta_robots_first_tag_only() {
        let html = r#"<html><head>
            <meta name="description" content="noindex in description">
            <meta name="ROBOTS" content="NOINDEX, follow">
            <meta name="robots" content="nofollow">
        </head></html>"#;

        let analysis = analyzer().analyze(html);
        assert!(analysis.robots_noindex);
        assert!(!analysis.robots_nofollow);
    }

    #[test]
    fn test_malformed_html_does_not_panic() {
        let analysis = analyzer().analyze("<a href=\"https://acceptor.example/\"<<<</div></a");
        assert!(analysis.total_anchor_count <= 1);

        let empty = analyzer().analyze("");
        assert_eq!(empty, PageAnalysis::default());
    }

    #[test]
    fn test_visible_text_skips_invisible_elements() {
        let html = r#"<html><head><title>Title</title><style>body {}</style></head>
            <body><h1>Hello</h1><script>var x = 1;</script><!-- hidden --><p>World  </p></body></html>"#;

        assert_eq!(visible_text(html), "Hello World");
    }
}
