//! Integration tests for linkwatch
//!
//! These tests drive the real HTTP fetcher against wiremock servers and run
//! whole batches and worker loops against SQLite files in temp directories.
//! The browser is replaced by a stub so no Chromium is needed.

mod checker_tests;
mod fetcher_tests;
mod worker_tests;

use async_trait::async_trait;
use linkwatch::config::{parse_config, Config};
use linkwatch::crawler::{FetchError, FetchOutcome, Fetcher};
use linkwatch::proxy::ProxyEndpoint;
use linkwatch::storage::{SharedStorage, SqliteStorage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Browser stand-in that serves one body for every URL and records calls
pub struct StubBrowser {
    body: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl StubBrowser {
    pub fn serving(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            body: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StubBrowser {
    async fn fetch(
        &self,
        url: &str,
        _proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match &self.body {
            Some(body) => Ok(FetchOutcome {
                status_codes: vec![200],
                redirect_url: None,
                body: body.clone(),
            }),
            None => Err(FetchError::Timeout(timeout)),
        }
    }
}

/// Opens a fresh database file in a temp directory
pub fn temp_storage() -> (TempDir, SharedStorage) {
    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::new(&dir.path().join("linkwatch.db")).unwrap();
    (dir, Arc::new(Mutex::new(storage)))
}

/// Builds a configuration with short timeouts and the given extra TOML
pub fn test_config(extra: &str) -> Config {
    let toml = format!(
        r#"
[checker]
chunk-size = 10
direct-timeout-ms = 2000
proxy-timeout-ms = 500
render-settle-ms = 0

[database]
path = "unused.db"

[ssl]
curl-path = "/nonexistent/curl"

[worker]
poll-interval-ms = 10
max-attempts = 2
{}
"#,
        extra
    );
    parse_config(&toml).unwrap()
}
