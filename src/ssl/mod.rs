//! Certificate expiry probe
//!
//! For each persisted check result, the donor host's certificate is inspected
//! with `curl -vI` in a child process and the `expire date:` line of its
//! verbose output is written back onto the result. Probes never fail the
//! caller: errors are logged and the fields stay null.

use crate::config::{Config, SslConfig};
use crate::storage::{lock_storage, SharedStorage, Storage};
use crate::url::extract_domain;
use crate::Result;
use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{self, StreamExt};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Probes run concurrently by one worker
pub const PARALLEL_PROBES: usize = 5;

const EXPIRE_MARKER: &str = "expire date:";
const EXPIRE_FORMAT: &str = "%b %d %H:%M:%S %Y GMT";

/// Summary of one probe run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SslReport {
    pub updated: usize,
    pub failed: usize,
}

/// Extracts the certificate expiry from `curl -v` output
pub fn parse_expire_date(output: &str) -> Option<DateTime<Utc>> {
    let line = output.lines().find(|line| line.contains(EXPIRE_MARKER))?;
    let (_, date) = line.split_once(EXPIRE_MARKER)?;
    let date = date.split_whitespace().collect::<Vec<_>>().join(" ");

    NaiveDateTime::parse_from_str(&date, EXPIRE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Whole days from `now` until `expires`; negative once expired
pub fn days_left(expires: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    expires.signed_duration_since(now).num_days()
}

/// Runs certificate probes for check results
pub struct SslProbe {
    settings: SslConfig,
    storage: SharedStorage,
}

impl SslProbe {
    pub fn new(settings: SslConfig, storage: SharedStorage) -> Self {
        Self { settings, storage }
    }

    pub fn from_config(config: &Config, storage: SharedStorage) -> Self {
        Self::new(config.ssl.clone(), storage)
    }

    /// Probes the donor host of every result, at most [`PARALLEL_PROBES`] at a time
    pub async fn probe_results(&self, result_ids: &[i64]) -> Result<SslReport> {
        let outcomes: Vec<bool> = stream::iter(result_ids.iter().copied())
            .map(|result_id| async move {
                match self.probe_result(result_id).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("Certificate probe failed for result {}: {:#}", result_id, e);
                        false
                    }
                }
            })
            .buffer_unordered(PARALLEL_PROBES)
            .collect()
            .await;

        let updated = outcomes.iter().filter(|ok| **ok).count();
        let report = SslReport {
            updated,
            failed: outcomes.len() - updated,
        };
        tracing::info!(
            "Certificate probes finished: {} updated, {} failed",
            report.updated,
            report.failed
        );
        Ok(report)
    }

    async fn probe_result(&self, result_id: i64) -> anyhow::Result<()> {
        let host = self.host_for_result(result_id)?;
        let expires = self.expiry_for_host(&host).await?;
        let days = days_left(expires, Utc::now());

        let mut storage = lock_storage(&self.storage)?;
        storage.update_ssl_expiry(result_id, expires, days)?;
        tracing::debug!("Certificate of {} expires {} ({} days)", host, expires, days);
        Ok(())
    }

    fn host_for_result(&self, result_id: i64) -> anyhow::Result<String> {
        let storage = lock_storage(&self.storage)?;
        let record = storage.get_check_result(result_id)?;
        let link = storage.get_link(record.result.link_id)?;

        let host = match link.donor_domain_id {
            Some(domain_id) => storage.get_donor_domain(domain_id)?.name,
            None => extract_domain(&link.page_url),
        };
        if host.is_empty() {
            return Err(anyhow!("link {} has no donor host", link.id));
        }
        Ok(host)
    }

    /// Runs `curl -vI` against the host and parses the expiry line
    pub async fn expiry_for_host(&self, host: &str) -> anyhow::Result<DateTime<Utc>> {
        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let mut command = Command::new(&self.settings.curl_path);
        command
            .arg(format!("https://{}", host))
            .arg("-m")
            .arg(self.settings.timeout_secs.to_string())
            .arg("-vI")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(proxy) = &self.settings.http_proxy {
            command.env("http_proxy", proxy);
        }
        if let Some(proxy) = &self.settings.https_proxy {
            command.env("https_proxy", proxy);
        }

        let output = tokio::time::timeout(timeout + Duration::from_secs(1), command.output())
            .await
            .map_err(|_| anyhow!("curl for {} exceeded {:?}", host, timeout))?
            .with_context(|| format!("failed to run {}", self.settings.curl_path))?;

        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        parse_expire_date(&text).ok_or_else(|| {
            anyhow!(
                "no expire date in curl output for {} (exit status {})",
                host,
                output.status
            )
        })
    }
}
