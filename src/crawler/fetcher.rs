//! HTTP fetcher implementation
//!
//! This module handles plain HTTP(S) requests for the link checker, including:
//! - Building HTTP clients with a browser-like user agent, optionally proxied
//! - Manual redirect handling that records every status code
//! - Body decoding (UTF-8 with a Latin-1 fallback)
//! - Error classification into the escalation taxonomy

use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors a fetch can end with
///
/// The variants double as escalation signals: a timeout or transport error
/// is worth retrying through a proxy, a TLS failure goes straight to the
/// browser, anything else is recorded as is.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("TLS failure: {0}")]
    Tls(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// True for failures worth retrying through the next proxy
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Every status code seen, in order (redirect hops included)
    pub status_codes: Vec<u16>,

    /// Target of the last redirect followed, if any
    pub redirect_url: Option<String>,

    /// Decoded body of the final response
    pub body: String,
}

impl FetchOutcome {
    /// Status code of the final response
    pub fn final_status(&self) -> Option<u16> {
        self.status_codes.last().copied()
    }

    /// True if the final response is a 403 or 503
    pub fn is_blocked(&self) -> bool {
        matches!(self.final_status(), Some(403) | Some(503))
    }
}

/// Fetches one page, optionally through a proxy
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`
    ///
    /// # Arguments
    ///
    /// * `url` - The page to fetch
    /// * `proxy` - Proxy to route through, or `None` for a direct fetch
    /// * `timeout` - Hard budget for the whole fetch, redirects included
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The User-Agent header value
/// * `proxy` - Optional proxy every request is routed through
/// * `timeout` - Connect and total request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &str,
    proxy: Option<&ProxyEndpoint>,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.proxy_url())?);
    }

    builder.build()
}

/// Direct or proxied fetcher backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    user_agent: String,
    max_redirects: usize,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, max_redirects: usize) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            max_redirects,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// Fetches a URL, following redirects by hand
    ///
    /// # Request Flow
    ///
    /// 1. GET the URL and record the status code
    /// 2. If the response redirects, resolve `Location` against the current
    ///    URL, remember it as the redirect target and repeat
    /// 3. Stop after `max_redirects` hops or on the first non-redirect
    ///
    /// The body of the last response read is returned. `timeout` bounds
    /// each request and the whole chain.
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        let client = build_http_client(&self.user_agent, proxy, timeout)
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {}", e)))?;
        let start =
            Url::parse(url).map_err(|e| FetchError::Other(format!("invalid URL {}: {}", url, e)))?;

        tokio::time::timeout(timeout, self.follow_redirects(&client, start, timeout))
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
    }
}

impl HttpFetcher {
    async fn follow_redirects(
        &self,
        client: &Client,
        mut current: Url,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        let mut outcome = FetchOutcome::default();

        loop {
            let response = client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| classify_error(e, timeout))?;

            outcome.status_codes.push(response.status().as_u16());

            let next = if response.status().is_redirection() {
                response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|location| current.join(location).ok())
            } else {
                None
            };

            let bytes = response
                .bytes()
                .await
                .map_err(|e| classify_error(e, timeout))?;
            outcome.body = decode_body(&bytes);

            match next {
                Some(next) if outcome.status_codes.len() <= self.max_redirects => {
                    tracing::trace!("Redirect {} -> {}", current, next);
                    outcome.redirect_url = Some(next.to_string());
                    current = next;
                }
                _ => break,
            }
        }

        Ok(outcome)
    }
}

/// Decodes a response body as UTF-8, falling back to Latin-1
pub fn decode_body(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Maps a `reqwest` error onto the escalation taxonomy
fn classify_error(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        return FetchError::Timeout(timeout);
    }

    let error = error.without_url();
    let description = error_chain(&error);
    if is_tls_failure(&description) {
        FetchError::Tls(description)
    } else if error.is_connect() || error.is_request() || error.is_body() {
        FetchError::Transport(description)
    } else {
        FetchError::Other(description)
    }
}

/// Joins an error and all of its sources into one line
fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

fn is_tls_failure(description: &str) -> bool {
    let lowered = description.to_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| lowered.contains(needle))
}
