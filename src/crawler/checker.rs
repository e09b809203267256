//! Link checker - batch orchestration and the escalation state machine
//!
//! Every link of a batch lives in an arena slot holding its [`LinkStage`] and
//! its latest provisional result. Stages run strictly in order:
//!
//! 1. Direct: every `Pending` link is fetched without a proxy
//! 2. Proxy: `PendingProxy` links are retried through each proxy of the
//!    rotation in turn until they produce an outcome
//! 3. Browser: `PendingBrowser` links are rendered in small chunks; this stage
//!    is terminal
//!
//! Once every slot is `Done` the results are persisted in one transaction and
//! follow-up tasks (tagging of new donor domains, certificate probes) are
//! queued.

use crate::config::{CheckerConfig, Config};
use crate::crawler::analyzer::{PageAnalysis, PageAnalyzer};
use crate::crawler::browser::BrowserFetcher;
use crate::crawler::chunk;
use crate::crawler::classifier::{classify, error_message};
use crate::crawler::fetcher::{FetchError, FetchOutcome, Fetcher, HttpFetcher};
use crate::dispatch::{Task, TaskQueue};
use crate::proxy::{ProxyEndpoint, ProxyRotator};
use crate::state::{CheckStatus, FetchMode, LinkStage};
use crate::storage::{lock_storage, CheckResult, LinkRecord, SharedStorage, Storage};
use crate::url::extract_domain;
use crate::{LinkwatchError, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Stage a batch starts its links in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Direct, then proxies, then browser
    Escalating,
    /// Straight to the browser stage
    BrowserOnly,
}

/// Everything needed to fetch and judge one link
#[derive(Debug, Clone)]
struct LinkTarget {
    link_id: i64,
    page_url: String,
    expected_href: String,
    anchor: String,
    page_domain: String,
    link_domain: String,
}

impl LinkTarget {
    fn from_record(link: &LinkRecord) -> Self {
        Self {
            link_id: link.id,
            page_url: link.page_url.clone(),
            expected_href: link.link_url.clone(),
            anchor: link.anchor.clone(),
            page_domain: extract_domain(&link.page_url),
            link_domain: extract_domain(&link.link_url),
        }
    }
}

#[derive(Debug)]
struct LinkSlot {
    target: LinkTarget,
    stage: LinkStage,
    result: Option<CheckResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escalation {
    Proxy,
    Browser,
}

/// Outcome of one fetch attempt for one link
#[derive(Debug)]
enum Verdict {
    Done(CheckResult),
    /// Provisional result kept in case no later stage produces one
    Escalate(Escalation, CheckResult),
}

/// Summary of a checked batch
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub result_ids: Vec<i64>,
    pub new_donor_domains: Vec<i64>,
    pub green: usize,
    pub red: usize,
}

impl BatchReport {
    fn merge(&mut self, other: BatchReport) {
        self.result_ids.extend(other.result_ids);
        self.new_donor_domains.extend(other.new_donor_domains);
        self.green += other.green;
        self.red += other.red;
    }
}

/// Checks batches of links
pub struct LinkChecker {
    settings: CheckerConfig,
    rotator: ProxyRotator,
    http: Arc<dyn Fetcher>,
    browser: Arc<dyn Fetcher>,
    storage: SharedStorage,
}

impl LinkChecker {
    /// Creates a checker from explicit parts
    ///
    /// # Arguments
    ///
    /// * `settings` - Timeouts, concurrency and chunk sizes
    /// * `rotator` - Proxy rotation used by the proxy and browser stages
    /// * `http` - Fetcher for the direct and proxy stages
    /// * `browser` - Fetcher for the browser stage
    /// * `storage` - Shared storage the results are persisted to
    pub fn new(
        settings: CheckerConfig,
        rotator: ProxyRotator,
        http: Arc<dyn Fetcher>,
        browser: Arc<dyn Fetcher>,
        storage: SharedStorage,
    ) -> Self {
        Self {
            settings,
            rotator,
            http,
            browser,
            storage,
        }
    }

    /// Creates a checker with the real HTTP and browser fetchers
    pub fn from_config(config: &Config, storage: SharedStorage) -> Self {
        let http = HttpFetcher::new(&config.user_agent.value, config.checker.max_redirects);
        let browser = BrowserFetcher::from_config(&config.checker);
        Self::new(
            config.checker.clone(),
            ProxyRotator::new(config.proxies.clone()),
            Arc::new(http),
            Arc::new(browser),
            storage,
        )
    }

    /// Checks `links` in batches of the configured chunk size
    pub async fn check_links(&self, links: &[LinkRecord], start: StartMode) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let batches = chunk(links, self.settings.chunk_size);
        let total = batches.len();

        for (index, batch) in batches.iter().enumerate() {
            tracing::info!("Checking batch {}/{} ({} links)", index + 1, total, batch.len());
            report.merge(self.check_batch(batch, start).await?);
        }

        Ok(report)
    }

    /// Checks one batch of links end to end
    ///
    /// Exactly one result is persisted per input link. Only a failure of the
    /// final transaction fails the batch.
    pub async fn check_batch(&self, links: &[LinkRecord], start: StartMode) -> Result<BatchReport> {
        if links.is_empty() {
            return Ok(BatchReport::default());
        }

        let new_donor_domains = self.prepare_domains(links)?;

        let initial = match start {
            StartMode::Escalating => LinkStage::Pending,
            StartMode::BrowserOnly => LinkStage::PendingBrowser,
        };
        let mut slots: Vec<LinkSlot> = links
            .iter()
            .map(|link| LinkSlot {
                target: LinkTarget::from_record(link),
                stage: initial,
                result: None,
            })
            .collect();

        self.run_direct_stage(&mut slots).await?;
        self.run_proxy_stage(&mut slots).await?;
        self.run_browser_stage(&mut slots).await?;

        let results = finalize(slots);
        let report = self.persist(&results, new_donor_domains)?;

        tracing::info!(
            "Batch finished: {} green, {} red, {} new donor domains",
            report.green,
            report.red,
            report.new_donor_domains.len()
        );
        Ok(report)
    }

    /// Resolves donor and acceptor domains, returning newly created donor IDs
    fn prepare_domains(&self, links: &[LinkRecord]) -> Result<Vec<i64>> {
        let mut storage = lock_storage(&self.storage)?;
        let mut created = Vec::new();

        for link in links {
            let donor_name = extract_domain(&link.page_url);
            let acceptor_name = extract_domain(&link.link_url);
            if donor_name.is_empty() || acceptor_name.is_empty() {
                tracing::warn!("Link {} has no usable domain, skipping domain assignment", link.id);
                continue;
            }

            let (donor, was_created) = storage.get_or_create_donor_domain(&donor_name)?;
            if was_created && !created.contains(&donor.id) {
                tracing::debug!("New donor domain {} ({})", donor.name, donor.id);
                created.push(donor.id);
            }
            let acceptor = storage.get_or_create_acceptor_domain(&acceptor_name)?;
            storage.assign_link_domains(link.id, donor.id, acceptor.id)?;
        }

        Ok(created)
    }

    async fn run_direct_stage(&self, slots: &mut [LinkSlot]) -> Result<()> {
        let pending = indices_in(slots, LinkStage::Pending);
        if pending.is_empty() {
            return Ok(());
        }
        tracing::debug!("Direct stage: {} links", pending.len());

        for &i in &pending {
            advance(&mut slots[i], LinkStage::DirectChecked)?;
        }

        let verdicts = self
            .run_pass(
                slots,
                &pending,
                FetchMode::Direct,
                None,
                self.settings.direct_timeout(),
                self.settings.max_connections,
            )
            .await;

        for (i, verdict) in verdicts {
            let next = match &verdict {
                Verdict::Done(_) => LinkStage::Done,
                Verdict::Escalate(Escalation::Proxy, _) if !self.rotator.is_empty() => {
                    LinkStage::PendingProxy
                }
                Verdict::Escalate(_, _) => LinkStage::PendingBrowser,
            };
            record(&mut slots[i], verdict);
            advance(&mut slots[i], next)?;
        }

        Ok(())
    }

    async fn run_proxy_stage(&self, slots: &mut [LinkSlot]) -> Result<()> {
        let mut proxy = self.rotator.next(None);

        while let Some(current) = proxy {
            let pending = indices_in(slots, LinkStage::PendingProxy);
            if pending.is_empty() {
                break;
            }
            tracing::info!("Retrying {} links via proxy {}", pending.len(), current);

            let verdicts = self
                .run_pass(
                    slots,
                    &pending,
                    FetchMode::Proxied,
                    Some(current),
                    self.settings.proxy_timeout(),
                    self.settings.max_connections,
                )
                .await;

            for (i, verdict) in verdicts {
                let next = match &verdict {
                    Verdict::Done(_) => Some(LinkStage::Done),
                    Verdict::Escalate(Escalation::Browser, _) => Some(LinkStage::PendingBrowser),
                    Verdict::Escalate(Escalation::Proxy, _) => None,
                };
                record(&mut slots[i], verdict);
                if let Some(next) = next {
                    advance(&mut slots[i], next)?;
                }
            }

            proxy = self.rotator.next(Some(current));
        }

        for i in indices_in(slots, LinkStage::PendingProxy) {
            tracing::debug!("Proxy rotation exhausted for link {}", slots[i].target.link_id);
            advance(&mut slots[i], LinkStage::PendingBrowser)?;
        }

        Ok(())
    }

    async fn run_browser_stage(&self, slots: &mut [LinkSlot]) -> Result<()> {
        let pending = indices_in(slots, LinkStage::PendingBrowser);
        if pending.is_empty() {
            return Ok(());
        }

        let proxy = self.rotator.first();
        let chunk_size = self.settings.browser_chunk_size.max(1);
        tracing::info!(
            "Browser stage: {} links in chunks of {} via {}",
            pending.len(),
            chunk_size,
            proxy.map(|p| p.label.as_str()).unwrap_or("no proxy")
        );

        for group in chunk(&pending, chunk_size) {
            let verdicts = self
                .run_pass(
                    slots,
                    &group,
                    FetchMode::Browser,
                    proxy,
                    self.settings.browser_timeout(),
                    chunk_size,
                )
                .await;

            for (i, verdict) in verdicts {
                record(&mut slots[i], verdict);
                advance(&mut slots[i], LinkStage::Done)?;
            }
        }

        Ok(())
    }

    /// Fetches the given slots concurrently, at most `limit` at a time
    async fn run_pass(
        &self,
        slots: &[LinkSlot],
        indices: &[usize],
        mode: FetchMode,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
        limit: usize,
    ) -> Vec<(usize, Verdict)> {
        let semaphore = Semaphore::new(limit.max(1));

        let checks = indices.iter().map(|&i| {
            let target = &slots[i].target;
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await;
                (i, self.check_link(target, mode, proxy, timeout).await)
            }
        });

        join_all(checks).await
    }

    fn fetcher_for(&self, mode: FetchMode) -> &dyn Fetcher {
        match mode {
            FetchMode::Direct | FetchMode::Proxied => self.http.as_ref(),
            FetchMode::Browser => self.browser.as_ref(),
        }
    }

    /// Fetches, analyzes and classifies one link
    async fn check_link(
        &self,
        target: &LinkTarget,
        mode: FetchMode,
        proxy: Option<&ProxyEndpoint>,
        timeout: Duration,
    ) -> Verdict {
        let label = proxy.map(|p| p.label.as_str());
        let fetched = self
            .fetcher_for(mode)
            .fetch(&target.page_url, proxy, timeout)
            .await;

        let outcome = match fetched {
            Ok(outcome) => outcome,
            Err(e) => {
                let result = error_result(target, &e, mode, label);
                if mode == FetchMode::Browser {
                    tracing::warn!("Browser fetch failed for link {}: {}", target.link_id, e);
                    return Verdict::Done(result);
                }
                if e.is_retryable() {
                    tracing::debug!("Link {}: {} (escalating to proxy)", target.link_id, e);
                    return Verdict::Escalate(Escalation::Proxy, result);
                }
                if matches!(e, FetchError::Tls(_)) {
                    tracing::debug!("Link {}: {} (escalating to browser)", target.link_id, e);
                    return Verdict::Escalate(Escalation::Browser, result);
                }
                return Verdict::Done(result);
            }
        };

        let analysis = PageAnalyzer::new(&target.expected_href, &target.page_domain, &target.link_domain)
            .analyze(&outcome.body);
        let result = page_result(target, &outcome, &analysis, mode, label);

        if mode != FetchMode::Browser && outcome.is_blocked() {
            tracing::debug!(
                "Link {} blocked with {:?} (escalating to browser)",
                target.link_id,
                outcome.final_status()
            );
            return Verdict::Escalate(Escalation::Browser, result);
        }

        if mode == FetchMode::Direct && outcome.final_status() == Some(200) && analysis.acceptor_absent() {
            tracing::debug!(
                "Link {} has no acceptor anchor in the raw page (render required)",
                target.link_id
            );
            return Verdict::Escalate(Escalation::Browser, result);
        }

        Verdict::Done(result)
    }

    /// Persists the batch and queues follow-up work
    fn persist(&self, results: &[CheckResult], new_donor_domains: Vec<i64>) -> Result<BatchReport> {
        let mut storage = lock_storage(&self.storage)?;
        let result_ids = storage.persist_check_results(results)?;

        let green = results.iter().filter(|r| r.status.is_green()).count();
        let report = BatchReport {
            red: results.len() - green,
            green,
            result_ids,
            new_donor_domains,
        };

        if !report.new_donor_domains.is_empty() {
            let task = Task::CheckDonorDomainsWithTagger {
                domain_ids: report.new_donor_domains.clone(),
            };
            if let Err(e) = storage.push(&task) {
                tracing::error!("Failed to queue tagging of new donor domains: {}", e);
            }
        }
        if !report.result_ids.is_empty() {
            let task = Task::ProbeSsl {
                result_ids: report.result_ids.clone(),
            };
            if let Err(e) = storage.push(&task) {
                tracing::error!("Failed to queue certificate probes: {}", e);
            }
        }

        Ok(report)
    }
}

fn indices_in(slots: &[LinkSlot], stage: LinkStage) -> Vec<usize> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.stage == stage)
        .map(|(i, _)| i)
        .collect()
}

fn advance(slot: &mut LinkSlot, next: LinkStage) -> Result<()> {
    if !slot.stage.can_transition_to(next) {
        return Err(LinkwatchError::InvalidTransition {
            link_id: slot.target.link_id,
            from: slot.stage,
            to: next,
        });
    }
    tracing::debug!("Link {}: {} -> {}", slot.target.link_id, slot.stage, next);
    slot.stage = next;
    Ok(())
}

fn record(slot: &mut LinkSlot, verdict: Verdict) {
    slot.result = Some(match verdict {
        Verdict::Done(result) | Verdict::Escalate(_, result) => result,
    });
}

/// Collects one result per slot, in input order
fn finalize(slots: Vec<LinkSlot>) -> Vec<CheckResult> {
    slots
        .into_iter()
        .map(|slot| match slot.result {
            Some(result) => result,
            None => {
                let message = error_message("no fetch outcome recorded", FetchMode::Direct, None);
                tracing::warn!("Link {} finished without an outcome", slot.target.link_id);
                empty_result(&slot.target, CheckStatus::Red, message, FetchMode::Direct, None)
            }
        })
        .collect()
}

fn page_result(
    target: &LinkTarget,
    outcome: &FetchOutcome,
    analysis: &PageAnalysis,
    mode: FetchMode,
    proxy_label: Option<&str>,
) -> CheckResult {
    let classification = classify(&outcome.status_codes, &target.anchor, analysis, mode, proxy_label);

    CheckResult {
        link_id: target.link_id,
        status: classification.status,
        message: classification.message,
        status_codes: outcome.status_codes.clone(),
        redirect_url: outcome.redirect_url.clone(),
        matching_anchor_count: analysis.matching_anchor_count,
        total_anchor_count: analysis.total_anchor_count,
        off_domain_anchor_count: analysis.off_domain_anchor_count,
        has_rel: analysis.has_rel,
        rel_nofollow: analysis.rel_nofollow(),
        rel_sponsored: analysis.rel_sponsored(),
        robots_noindex: analysis.robots_noindex,
        robots_nofollow: analysis.robots_nofollow,
        anchor_text_found: analysis.anchor_text_found.clone(),
        mode,
        proxy_label: proxy_label.map(str::to_string),
    }
}

fn error_result(
    target: &LinkTarget,
    error: &FetchError,
    mode: FetchMode,
    proxy_label: Option<&str>,
) -> CheckResult {
    let message = error_message(&error.to_string(), mode, proxy_label);
    empty_result(target, CheckStatus::Red, message, mode, proxy_label)
}

fn empty_result(
    target: &LinkTarget,
    status: CheckStatus,
    message: String,
    mode: FetchMode,
    proxy_label: Option<&str>,
) -> CheckResult {
    CheckResult {
        link_id: target.link_id,
        status,
        message,
        status_codes: Vec::new(),
        redirect_url: None,
        matching_anchor_count: 0,
        total_anchor_count: 0,
        off_domain_anchor_count: 0,
        has_rel: false,
        rel_nofollow: false,
        rel_sponsored: false,
        robots_noindex: false,
        robots_nofollow: false,
        anchor_text_found: None,
        mode,
        proxy_label: proxy_label.map(str::to_string),
    }
}
