//! Task worker - claims queued tasks and runs them

use crate::config::{Config, WorkerConfig};
use crate::crawler::{LinkChecker, StartMode};
use crate::dispatch::{ClaimedTask, Task, TaskQueue};
use crate::ssl::SslProbe;
use crate::storage::{lock_storage, LinkRecord, SharedStorage, SqliteStorage, Storage, StorageResult};
use crate::tagger::DomainTagger;
use crate::{LinkwatchError, Result};
use chrono::Utc;
use std::time::Duration;

/// Counts of tasks handled by one [`Worker::run`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub completed: usize,
    pub failed: usize,
}

/// Consumes the task queue
pub struct Worker {
    settings: WorkerConfig,
    stale_after_days: i64,
    storage: SharedStorage,
    checker: LinkChecker,
    tagger: DomainTagger,
    ssl: SslProbe,
}

impl Worker {
    /// Creates a worker with the real fetchers
    pub fn new(config: &Config, storage: SharedStorage) -> Self {
        Self::with_parts(
            config,
            storage.clone(),
            LinkChecker::from_config(config, storage.clone()),
            DomainTagger::from_config(config, storage.clone()),
            SslProbe::from_config(config, storage),
        )
    }

    /// Creates a worker from prebuilt components
    pub fn with_parts(
        config: &Config,
        storage: SharedStorage,
        checker: LinkChecker,
        tagger: DomainTagger,
        ssl: SslProbe,
    ) -> Self {
        Self {
            settings: config.worker.clone(),
            stale_after_days: config.checker.stale_after_days,
            storage,
            checker,
            tagger,
            ssl,
        }
    }

    /// Processes tasks until the queue is empty (`once`) or forever
    ///
    /// A failing task is re-queued until it has been attempted
    /// `max-attempts` times, then parked as failed.
    pub async fn run(&self, once: bool) -> Result<WorkerReport> {
        let mut report = WorkerReport::default();
        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms);

        tracing::info!("Worker started (once: {})", once);

        loop {
            let claimed = {
                let mut storage = lock_storage(&self.storage)?;
                storage.claim()
            };

            match claimed {
                Ok(Some(claimed)) => {
                    if self.handle(claimed).await? {
                        report.completed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Ok(None) if once => break,
                Ok(None) => tokio::time::sleep(poll_interval).await,
                Err(LinkwatchError::Payload(e)) => {
                    tracing::error!("Dropped undecodable task: {}", e);
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "Worker finished: {} tasks completed, {} failed",
            report.completed,
            report.failed
        );
        Ok(report)
    }

    /// Executes one claimed task and records its outcome
    ///
    /// # Returns
    ///
    /// `true` if the task completed
    async fn handle(&self, claimed: ClaimedTask) -> Result<bool> {
        tracing::info!(
            "Running task {} ({}, attempt {})",
            claimed.id,
            claimed.task.kind(),
            claimed.attempts
        );

        let outcome = self.execute(&claimed.task).await;

        let mut storage = lock_storage(&self.storage)?;
        match outcome {
            Ok(()) => {
                storage.complete(claimed.id)?;
                Ok(true)
            }
            Err(e) => {
                let status = storage.fail(claimed.id, &e.to_string(), self.settings.max_attempts)?;
                tracing::error!("Task {} failed ({}): {}", claimed.id, status.to_db_string(), e);
                Ok(false)
            }
        }
    }

    /// Runs a task
    pub async fn execute(&self, task: &Task) -> Result<()> {
        match task {
            Task::CheckLinkById { id } => {
                let links = self.load(|s| Ok(vec![s.get_link(*id)?]))?;
                self.check(&links, StartMode::Escalating).await
            }
            Task::CheckLinksByIdList { ids } => {
                let links = self.load(|s| s.get_links_by_ids(ids))?;
                self.check(&links, StartMode::Escalating).await
            }
            Task::CheckAllLinks => {
                let links = self.load(|s| s.get_all_links())?;
                self.check(&links, StartMode::Escalating).await
            }
            Task::CheckLinksByYear { year } => {
                let links = self.load(|s| s.get_links_by_year(*year))?;
                self.check(&links, StartMode::Escalating).await
            }
            Task::CheckLinksByIdListViaBrowser { ids } => {
                let links = self.load(|s| s.get_links_by_ids(ids))?;
                self.check(&links, StartMode::BrowserOnly).await
            }
            Task::CheckDaily => {
                let links = self.load(|s| s.get_links_for_daily_check())?;
                self.check(&links, StartMode::Escalating).await
            }
            Task::CheckStale => {
                let cutoff = Utc::now() - chrono::Duration::days(self.stale_after_days);
                let links = self.load(|s| s.get_stale_links(cutoff))?;
                self.check(&links, StartMode::BrowserOnly).await
            }
            Task::CheckDonorDomainsWithTagger { domain_ids } => {
                self.tagger.enqueue(domain_ids)?;
                self.tagger.run_drain_loop().await?;
                Ok(())
            }
            Task::ProbeSsl { result_ids } => {
                self.ssl.probe_results(result_ids).await?;
                Ok(())
            }
        }
    }

    fn load<F>(&self, query: F) -> Result<Vec<LinkRecord>>
    where
        F: FnOnce(&SqliteStorage) -> StorageResult<Vec<LinkRecord>>,
    {
        let storage = lock_storage(&self.storage)?;
        Ok(query(&storage)?)
    }

    async fn check(&self, links: &[LinkRecord], start: StartMode) -> Result<()> {
        if links.is_empty() {
            tracing::info!("No links to check");
            return Ok(());
        }
        let report = self.checker.check_links(links, start).await?;
        tracing::info!(
            "Checked {} links: {} green, {} red",
            report.result_ids.len(),
            report.green,
            report.red
        );
        Ok(())
    }
}
