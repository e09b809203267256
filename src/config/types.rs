use crate::proxy::ProxyEndpoint;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Linkwatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub checker: CheckerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    pub database: DatabaseConfig,
    #[serde(default, rename = "proxy")]
    pub proxies: Vec<ProxyEndpoint>,
    #[serde(default)]
    pub tagger: TaggerConfig,
    #[serde(default)]
    pub ssl: SslConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Link checker behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Number of links handed to one checker batch
    #[serde(rename = "chunk-size")]
    pub chunk_size: usize,

    /// Simultaneous connections for the direct and proxy stages
    #[serde(rename = "max-connections")]
    pub max_connections: usize,

    /// Connect/read timeout on the first pass of a batch (milliseconds)
    #[serde(rename = "direct-timeout-ms")]
    pub direct_timeout_ms: u64,

    /// Connect/read timeout on proxy-retry passes (milliseconds)
    #[serde(rename = "proxy-timeout-ms")]
    pub proxy_timeout_ms: u64,

    /// Links rendered concurrently in the browser stage
    #[serde(rename = "browser-chunk-size")]
    pub browser_chunk_size: usize,

    /// Navigation budget for one browser fetch (milliseconds)
    #[serde(rename = "browser-timeout-ms")]
    pub browser_timeout_ms: u64,

    /// Delay after navigation for client-side rendering (milliseconds)
    #[serde(rename = "render-settle-ms")]
    pub render_settle_ms: u64,

    /// Maximum redirect hops followed by the HTTP fetcher
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,

    /// Age after which a green result is re-checked through the browser
    #[serde(rename = "stale-after-days")]
    pub stale_after_days: i64,

    /// Chromium binary for the browser stage; auto-detected when unset
    #[serde(rename = "browser-executable")]
    pub browser_executable: Option<PathBuf>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            max_connections: 5,
            direct_timeout_ms: 5_000,
            proxy_timeout_ms: 2_000,
            browser_chunk_size: 5,
            browser_timeout_ms: 30_000,
            render_settle_ms: 15_000,
            max_redirects: 20,
            stale_after_days: 30,
            browser_executable: None,
        }
    }
}

impl CheckerConfig {
    pub fn direct_timeout(&self) -> Duration {
        Duration::from_millis(self.direct_timeout_ms)
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_timeout_ms)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_millis(self.browser_timeout_ms)
    }

    pub fn render_settle(&self) -> Duration {
        Duration::from_millis(self.render_settle_ms)
    }
}

/// User agent sent by the HTTP fetcher
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    pub value: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database shared by all workers
    pub path: String,

    /// How long a writer waits on a locked database (milliseconds)
    #[serde(rename = "busy-timeout-ms", default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Donor-domain tagger configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    /// Analytics page template; `{domain}` is replaced by the donor domain
    #[serde(rename = "analytics-url")]
    pub analytics_url: String,

    /// Selector of the element holding the traffic-country legend
    #[serde(rename = "legend-selector")]
    pub legend_selector: String,

    /// Selector of the element holding last month's visits
    #[serde(rename = "visits-selector")]
    pub visits_selector: Option<String>,

    /// Age after which a held drain lock is considered abandoned
    #[serde(rename = "lock-lease-secs")]
    pub lock_lease_secs: i64,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            analytics_url: "https://www.similarweb.com/website/{domain}".to_string(),
            legend_selector: ".wa-geography__chart-legend".to_string(),
            visits_selector: Some(".engagement-list__item-value".to_string()),
            lock_lease_secs: 3_600,
        }
    }
}

impl TaggerConfig {
    pub fn analytics_url_for(&self, domain: &str) -> String {
        self.analytics_url.replace("{domain}", domain)
    }
}

/// Certificate expiry probe configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    #[serde(rename = "curl-path")]
    pub curl_path: String,

    #[serde(rename = "http-proxy")]
    pub http_proxy: Option<String>,

    #[serde(rename = "https-proxy")]
    pub https_proxy: Option<String>,
}

impl Default for SslConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            curl_path: "curl".to_string(),
            http_proxy: None,
            https_proxy: None,
        }
    }
}

/// Task worker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Sleep between polls of an empty task queue (milliseconds)
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Attempts before a failing task is parked as failed
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_attempts: 3,
        }
    }
}
