//! Headless browser fetcher
//!
//! Launches a throwaway headless Chromium per fetch, routed through the given
//! proxy, and records the main-document response codes seen over the DevTools
//! protocol while the page loads and renders.

use crate::config::CheckerConfig;
use crate::crawler::fetcher::{FetchError, FetchOutcome, Fetcher};
use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived, ResourceType,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

static PROFILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fetcher that renders pages in headless Chromium
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    render_settle: Duration,
    executable: Option<PathBuf>,
}

impl BrowserFetcher {
    /// Creates a browser fetcher
    ///
    /// # Arguments
    ///
    /// * `render_settle` - Wait after navigation for client-side rendering
    pub fn new(render_settle: Duration) -> Self {
        Self {
            render_settle,
            executable: None,
        }
    }

    /// Creates a browser fetcher from the `[checker]` settings
    pub fn from_config(config: &CheckerConfig) -> Self {
        let fetcher = Self::new(config.render_settle());
        match &config.browser_executable {
            Some(path) => fetcher.with_executable(path.clone()),
            None => fetcher,
        }
    }

    /// Uses an explicit Chromium binary instead of auto-detection
    pub fn with_executable(mut self, path: PathBuf) -> Self {
        self.executable = Some(path);
        self
    }

    fn profile_dir() -> PathBuf {
        let n = PROFILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("linkwatch-chrome-{}-{}", std::process::id(), n))
    }

    async fn launch(
        &self,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
        profile: &Path,
    ) -> Result<(Browser, tokio::task::JoinHandle<()>), FetchError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(timeout)
            .user_data_dir(profile)
            .arg("--ignore-certificate-errors")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run");

        if let Some(proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.address()));
        }
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }

        let config = builder
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Other(format!("failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("Browser handler event error: {}", e);
                }
            }
        });

        Ok((browser, handler_task))
    }

    async fn render(
        &self,
        browser: &Browser,
        url: &str,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Other(format!("failed to open page: {}", e)))?;

        let codes = Arc::new(Mutex::new(Vec::new()));
        let listener = spawn_status_listener(&page, Arc::clone(&codes)).await?;

        let navigation = tokio::time::timeout(timeout, page.goto(url)).await;
        match navigation {
            Err(_) => {
                listener.abort();
                return Err(FetchError::Timeout(timeout));
            }
            Ok(Err(e)) => {
                listener.abort();
                return Err(FetchError::Transport(format!("navigation failed: {}", e)));
            }
            Ok(Ok(_)) => {}
        }

        tokio::time::sleep(self.render_settle).await;

        let body = page
            .content()
            .await
            .map_err(|e| FetchError::Other(format!("failed to read page content: {}", e)))?;

        listener.abort();
        let status_codes = codes
            .lock()
            .map(|events| ordered_status_chain(&events))
            .unwrap_or_default();
        let redirect_url = page
            .url()
            .await
            .ok()
            .flatten()
            .filter(|final_url| final_url.as_str() != url);

        Ok(FetchOutcome {
            status_codes,
            redirect_url,
            body,
        })
    }
}

/// Orders main-document status events by CDP timestamp; a `200` is kept once
///
/// Redirect and response events arrive on separate streams, so arrival order
/// says nothing about the order the browser saw them in.
fn ordered_status_chain(events: &[(f64, i64)]) -> Vec<u16> {
    let mut events = events.to_vec();
    events.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut chain = Vec::with_capacity(events.len());
    for (_, status) in events {
        let status = u16::try_from(status).unwrap_or(0);
        if status == 200 && chain.contains(&200) {
            continue;
        }
        chain.push(status);
    }
    chain
}

/// Records timestamped main-document status codes
async fn spawn_status_listener(
    page: &Page,
    codes: Arc<Mutex<Vec<(f64, i64)>>>,
) -> Result<tokio::task::JoinHandle<()>, FetchError> {
    let responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| FetchError::Other(format!("failed to listen for responses: {}", e)))?
        .map(|event| {
            (event.r#type == ResourceType::Document)
                .then(|| (*event.timestamp.inner(), event.response.status))
        });

    let redirects = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| FetchError::Other(format!("failed to listen for requests: {}", e)))?
        .map(|event| {
            let is_document = event.r#type.as_ref() == Some(&ResourceType::Document);
            match (&event.redirect_response, is_document) {
                (Some(response), true) => Some((*event.timestamp.inner(), response.status)),
                _ => None,
            }
        });

    let mut events = Box::pin(futures::stream::select(responses, redirects));

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let Some(event) = event else { continue };
            if let Ok(mut codes) = codes.lock() {
                codes.push(event);
            }
        }
    }))
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        let profile = Self::profile_dir();
        let (mut browser, handler_task) = self.launch(proxy, timeout, &profile).await?;

        tracing::debug!("Browser fetching {} via {:?}", url, proxy.map(|p| &p.label));
        let outcome = self.render(&browser, url, timeout).await;

        if let Err(e) = browser.close().await {
            tracing::debug!("Failed to close browser cleanly: {}", e);
        }
        handler_task.abort();

        if let Err(e) = tokio::fs::remove_dir_all(&profile).await {
            tracing::trace!("Could not remove browser profile {:?}: {}", profile, e);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_dirs_are_unique() {
        let a = BrowserFetcher::profile_dir();
        let b = BrowserFetcher::profile_dir();
        assert_ne!(a, b);
    }

    #[test]
    fn test_status_chain_follows_timestamps() {
        // The final response arrived before the redirect event it follows.
        let events = [(12.5, 200), (12.1, 301), (12.3, 302)];
        assert_eq!(ordered_status_chain(&events), vec![301, 302, 200]);
    }

    #[test]
    fn test_status_chain_keeps_one_200() {
        let events = [(1.0, 200), (2.0, 200), (0.5, 301)];
        assert_eq!(ordered_status_chain(&events), vec![301, 200]);
    }

    #[test]
    fn test_from_config_uses_configured_executable() {
        let config = CheckerConfig {
            render_settle_ms: 10,
            browser_executable: Some(PathBuf::from("/usr/bin/chromium")),
            ..CheckerConfig::default()
        };
        let fetcher = BrowserFetcher::from_config(&config);
        assert_eq!(fetcher.executable, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(fetcher.render_settle, Duration::from_millis(10));

        let detected = BrowserFetcher::from_config(&CheckerConfig::default());
        assert_eq!(detected.executable, None);
    }
}
