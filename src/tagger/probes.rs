//! Country, visits and language probes for donor domains

use crate::crawler::{visible_text, FetchOutcome, Fetcher};
use crate::proxy::{ProxyEndpoint, ProxyRotator};
use crate::tagger::dictionaries::{lookup_country, lookup_language};
use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;

static LEGEND_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z\s]+").expect("valid regex"));

const OTHER_COUNTRIES: &str = "Other countries";

/// A matched country: `(code, full_name)`
pub type CountryMatch = (&'static str, &'static str);

/// Splits an analytics legend into candidate country names
///
/// The legend interleaves names with shares (`"United States45.1%Germany9%"`),
/// so runs of anything but letters and spaces separate candidates.
pub fn split_country_legend(legend: &str) -> Vec<String> {
    LEGEND_SEPARATOR
        .split(legend)
        .map(str::trim)
        .filter(|c| !c.is_empty() && *c != OTHER_COUNTRIES)
        .map(str::to_string)
        .collect()
}

/// Maps legend candidates onto dictionary countries, without duplicates
pub fn match_countries(candidates: &[String]) -> Vec<CountryMatch> {
    let mut matches: Vec<CountryMatch> = Vec::new();
    for candidate in candidates {
        if let Some(found) = lookup_country(candidate) {
            if !matches.contains(&found) {
                matches.push(found);
            }
        }
    }
    matches
}

/// Returns the trimmed text of the first element matching `selector`
pub fn select_text(html: &str, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let document = Html::parse_document(html);
    let element = document.select(&selector).next()?;
    let text = element.text().collect::<Vec<_>>().join("");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Detects the language of a page's visible text
///
/// Returns `(name, full_name)` of the canonical language tag.
pub fn detect_language(html: &str) -> Option<(&'static str, &'static str)> {
    let text = visible_text(html);
    let info = whatlang::detect(&text)?;
    lookup_language(info.lang().code())
}

/// What the analytics page told us about a domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsReport {
    pub countries: Vec<CountryMatch>,
    pub visits: Option<String>,
}

/// Reads the country legend and the visits figure from a rendered analytics page
pub fn read_analytics_page(
    html: &str,
    legend_selector: &str,
    visits_selector: Option<&str>,
) -> AnalyticsReport {
    let countries = select_text(html, legend_selector)
        .map(|legend| match_countries(&split_country_legend(&legend)))
        .unwrap_or_default();
    let visits = visits_selector.and_then(|selector| select_text(html, selector));

    AnalyticsReport { countries, visits }
}

/// Renders the analytics page of a domain in the browser
pub async fn fetch_analytics_page(
    browser: &dyn Fetcher,
    url: &str,
    proxy: Option<&ProxyEndpoint>,
    timeout: Duration,
) -> anyhow::Result<String> {
    let outcome = browser
        .fetch(url, proxy, timeout)
        .await
        .with_context(|| format!("failed to render {}", url))?;
    Ok(outcome.body)
}

fn has_content(outcome: &FetchOutcome) -> bool {
    outcome.status_codes.contains(&200) && !outcome.body.trim().is_empty()
}

/// Fetches the main page of a domain
///
/// Tries a plain HTTP fetch through `start` first, then renders the page in
/// the browser through `start` and each following proxy until some content is
/// obtained.
pub async fn fetch_main_page(
    http: &dyn Fetcher,
    browser: &dyn Fetcher,
    rotator: &ProxyRotator,
    domain: &str,
    start: Option<&ProxyEndpoint>,
    http_timeout: Duration,
    browser_timeout: Duration,
) -> anyhow::Result<String> {
    let url = format!("https://{}", domain);

    match http.fetch(&url, start, http_timeout).await {
        Ok(outcome) if has_content(&outcome) => return Ok(outcome.body),
        Ok(outcome) => {
            tracing::debug!("Main page of {} returned {:?}, trying browser", domain, outcome.final_status())
        }
        Err(e) => tracing::debug!("Main page of {} failed directly ({}), trying browser", domain, e),
    }

    let mut proxy = start;
    loop {
        match browser.fetch(&url, proxy, browser_timeout).await {
            Ok(outcome) if !outcome.body.trim().is_empty() => return Ok(outcome.body),
            Ok(_) => tracing::debug!("Empty render of {} via {:?}", domain, proxy.map(|p| &p.label)),
            Err(e) => tracing::debug!("Render of {} via {:?} failed: {}", domain, proxy.map(|p| &p.label), e),
        }

        proxy = match proxy {
            Some(current) => rotator.next(Some(current)),
            None => None,
        };
        if proxy.is_none() {
            return Err(anyhow!("no content obtained for {}", domain));
        }
    }
}
