//! Green/red classification of a fetched donor page

use crate::crawler::analyzer::PageAnalysis;
use crate::state::{CheckStatus, FetchMode};
use crate::url::normalize;

/// Status and human-readable reasons for one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: CheckStatus,
    pub message: String,
}

/// Classifies a fetched page
///
/// # Rules
///
/// Evaluated in this order. Every red reason is recorded; any red reason
/// makes the result red.
///
/// | Condition | Message |
/// |-----------|---------|
/// | `200` never in the chain | `code: <last>;` (no further checks) |
/// | No matching anchor, acceptor href present | `found href "<href>" differs;` |
/// | No matching anchor at all | `acceptor not found;` |
/// | `rel` has `nofollow` | `rel has nofollow;` |
/// | `rel` has `sponsored` | `rel has sponsored;` |
/// | Robots meta has `noindex` | `robots has noindex;` |
/// | Robots meta has `nofollow` | `robots has nofollow;` |
/// | Normalized anchor text differs | `found anchor text "<text>" differs;` |
/// | None of the above | `ok;` (green) |
///
/// Browser mode and the proxy label are appended to every message.
pub fn classify(
    status_codes: &[u16],
    expected_anchor: &str,
    analysis: &PageAnalysis,
    mode: FetchMode,
    proxy_label: Option<&str>,
) -> Classification {
    let mut reasons = Vec::new();

    if !status_codes.contains(&200) {
        let last = status_codes
            .last()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string());
        reasons.push(format!("code: {};", last));
        return finish(CheckStatus::Red, reasons, mode, proxy_label);
    }

    if !analysis.anchor_found {
        match &analysis.acceptor_href {
            Some(href) => reasons.push(format!("found href \"{}\" differs;", href)),
            None => reasons.push("acceptor not found;".to_string()),
        }
    }
    if analysis.rel_nofollow() {
        reasons.push("rel has nofollow;".to_string());
    }
    if analysis.rel_sponsored() {
        reasons.push("rel has sponsored;".to_string());
    }
    if analysis.robots_noindex {
        reasons.push("robots has noindex;".to_string());
    }
    if analysis.robots_nofollow {
        reasons.push("robots has nofollow;".to_string());
    }
    if let Some(found) = analysis.anchor_text_found.as_deref() {
        if !found.is_empty() && normalize(found) != normalize(expected_anchor) {
            reasons.push(format!("found anchor text \"{}\" differs;", found.trim()));
        }
    }

    if reasons.is_empty() {
        finish(CheckStatus::Green, vec!["ok;".to_string()], mode, proxy_label)
    } else {
        finish(CheckStatus::Red, reasons, mode, proxy_label)
    }
}

/// Builds the red message recorded when a fetch could not be classified
pub fn error_message(description: &str, mode: FetchMode, proxy_label: Option<&str>) -> String {
    finish(
        CheckStatus::Red,
        vec![format!("error: {};", description)],
        mode,
        proxy_label,
    )
    .message
}

fn finish(
    status: CheckStatus,
    mut lines: Vec<String>,
    mode: FetchMode,
    proxy_label: Option<&str>,
) -> Classification {
    if mode == FetchMode::Browser {
        lines.push(format!("mode: {};", mode));
    }
    if let Some(label) = proxy_label {
        lines.push(format!("visit_from: {};", label));
    }
    Classification {
        status,
        message: lines.join("\n"),
    }
}
