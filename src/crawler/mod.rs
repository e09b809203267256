//! Crawler module for link verification
//!
//! This module contains the link checking pipeline, including:
//! - HTTP and headless-browser fetchers behind one [`Fetcher`] trait
//! - HTML analysis of donor pages
//! - Green/red classification
//! - The batch checker driving the direct, proxy and browser stages

mod analyzer;
mod browser;
mod checker;
mod classifier;
mod fetcher;

pub use analyzer::{visible_text, PageAnalysis, PageAnalyzer};
pub use browser::BrowserFetcher;
pub use checker::{BatchReport, LinkChecker, StartMode};
pub use classifier::{classify, error_message, Classification};
pub use fetcher::{build_http_client, decode_body, FetchError, FetchOutcome, Fetcher, HttpFetcher};

/// Splits `items` into consecutive groups of at most `size` elements
///
/// Groups are never empty and concatenate back to `items` in order. A `size`
/// of zero is treated as one.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(|group| group.to_vec()).collect()
}
