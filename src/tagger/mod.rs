//! Donor-domain tagger
//!
//! Newly seen donor domains are queued in the shared database and drained by
//! at most one loop system-wide. For every domain the loop renders a
//! third-party analytics page to learn the traffic countries and monthly
//! visits, then fetches the domain's main page to detect its language.
//!
//! Both the queue and the "draining" flag live in SQLite, so any number of
//! worker processes may enqueue and attempt to drain concurrently.

mod dictionaries;
mod probes;

pub use dictionaries::{lookup_country, lookup_language, COUNTRIES, LANGUAGES};
pub use probes::{
    detect_language, match_countries, read_analytics_page, select_text, split_country_legend,
    AnalyticsReport,
};

use crate::config::{Config, TaggerConfig};
use crate::crawler::{BrowserFetcher, Fetcher, HttpFetcher};
use crate::proxy::ProxyRotator;
use crate::storage::{lock_storage, SharedStorage, Storage, TagProperty};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Summary of one drain-loop invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// False if another loop held the lock
    pub acquired: bool,
    pub processed: usize,
    pub failed_probes: usize,
    /// True if another loop took over an expired lease mid-drain
    pub lease_lost: bool,
}

/// What the drain loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextDomain {
    Domain(i64),
    Empty,
    LeaseLost,
}

/// Tags donor domains by country and language
pub struct DomainTagger {
    settings: TaggerConfig,
    rotator: ProxyRotator,
    http: Arc<dyn Fetcher>,
    browser: Arc<dyn Fetcher>,
    storage: SharedStorage,
    holder: String,
    http_timeout: Duration,
    browser_timeout: Duration,
}

impl DomainTagger {
    pub fn new(
        settings: TaggerConfig,
        rotator: ProxyRotator,
        http: Arc<dyn Fetcher>,
        browser: Arc<dyn Fetcher>,
        storage: SharedStorage,
    ) -> Self {
        let holder = format!(
            "pid-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        );
        Self {
            settings,
            rotator,
            http,
            browser,
            storage,
            holder,
            http_timeout: Duration::from_secs(5),
            browser_timeout: Duration::from_secs(30),
        }
    }

    /// Creates a tagger with the real fetchers and the checker's timeouts
    pub fn from_config(config: &Config, storage: SharedStorage) -> Self {
        let http = HttpFetcher::new(&config.user_agent.value, config.checker.max_redirects);
        let browser = BrowserFetcher::from_config(&config.checker);
        Self::new(
            config.tagger.clone(),
            ProxyRotator::new(config.proxies.clone()),
            Arc::new(http),
            Arc::new(browser),
            storage,
        )
        .with_timeouts(config.checker.direct_timeout(), config.checker.browser_timeout())
    }

    pub fn with_timeouts(mut self, http_timeout: Duration, browser_timeout: Duration) -> Self {
        self.http_timeout = http_timeout;
        self.browser_timeout = browser_timeout;
        self
    }

    /// Adds domain IDs to the pending queue, skipping those already queued
    ///
    /// # Returns
    ///
    /// Number of IDs actually added
    pub fn enqueue(&self, domain_ids: &[i64]) -> Result<usize> {
        let mut storage = lock_storage(&self.storage)?;
        let added = storage.enqueue_pending_domains(domain_ids)?;
        tracing::debug!("Queued {} of {} donor domains for tagging", added, domain_ids.len());
        Ok(added)
    }

    /// Drains the pending queue if no other loop is draining it
    ///
    /// # Loop Flow
    ///
    /// 1. Take the drain lock, or return at once if it is held
    /// 2. Pop and probe domains until the queue is empty, renewing the lease
    ///    before each one. If the lease was taken over, stop at once and
    ///    leave the lock and the queue to the new holder
    /// 3. Release the lock, then look at the queue again: an ID enqueued
    ///    between the last pop and the release would otherwise wait for the
    ///    next trigger
    ///
    /// Probe failures are logged and never stop the loop.
    pub async fn run_drain_loop(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        loop {
            if !self.try_acquire()? {
                if !report.acquired {
                    tracing::info!("Another drain loop is active, not starting a second one");
                }
                return Ok(report);
            }
            report.acquired = true;

            loop {
                match self.pop_next()? {
                    NextDomain::Domain(domain_id) => {
                        report.failed_probes += self.tag_domain(domain_id).await;
                        report.processed += 1;
                    }
                    NextDomain::Empty => break,
                    NextDomain::LeaseLost => {
                        tracing::warn!(
                            "Drain lock lease lost by {} after {} domains, stopping",
                            self.holder,
                            report.processed
                        );
                        report.lease_lost = true;
                        return Ok(report);
                    }
                }
            }

            if !self.release()? {
                tracing::warn!("Drain lock was no longer held by {}", self.holder);
            }

            if self.queue_is_empty()? {
                break;
            }
            tracing::debug!("Domains were queued while releasing, draining again");
        }

        tracing::info!(
            "Tagged {} donor domains ({} probe failures)",
            report.processed,
            report.failed_probes
        );
        Ok(report)
    }

    fn try_acquire(&self) -> Result<bool> {
        let mut storage = lock_storage(&self.storage)?;
        Ok(storage.try_acquire_drain_lock(&self.holder, self.settings.lock_lease_secs)?)
    }

    fn pop_next(&self) -> Result<NextDomain> {
        let mut storage = lock_storage(&self.storage)?;
        if !storage.renew_drain_lock(&self.holder)? {
            return Ok(NextDomain::LeaseLost);
        }
        Ok(match storage.pop_pending_domain()? {
            Some(domain_id) => NextDomain::Domain(domain_id),
            None => NextDomain::Empty,
        })
    }

    fn release(&self) -> Result<bool> {
        let mut storage = lock_storage(&self.storage)?;
        Ok(storage.release_drain_lock(&self.holder)?)
    }

    fn queue_is_empty(&self) -> Result<bool> {
        let storage = lock_storage(&self.storage)?;
        Ok(storage.pending_domains()?.is_empty())
    }

    /// Runs both probes for one domain, returning the number that failed
    async fn tag_domain(&self, domain_id: i64) -> usize {
        let mut failures = 0;

        if let Err(e) = self.probe_analytics(domain_id).await {
            tracing::warn!("Country probe failed for domain {}: {:#}", domain_id, e);
            failures += 1;
        }
        if let Err(e) = self.probe_language(domain_id).await {
            tracing::warn!("Language probe failed for domain {}: {:#}", domain_id, e);
            failures += 1;
        }

        failures
    }

    async fn probe_analytics(&self, domain_id: i64) -> anyhow::Result<()> {
        let domain = {
            let storage = lock_storage(&self.storage)?;
            storage.get_donor_domain(domain_id)?
        };

        let url = self.settings.analytics_url_for(&domain.name);
        let proxy = self.rotator.first();
        tracing::debug!("Country probe for {} via {:?}", domain.name, proxy.map(|p| &p.label));

        let html = probes::fetch_analytics_page(self.browser.as_ref(), &url, proxy, self.browser_timeout)
            .await?;
        let report = read_analytics_page(
            &html,
            &self.settings.legend_selector,
            self.settings.visits_selector.as_deref(),
        );

        let mut storage = lock_storage(&self.storage)?;
        if !report.countries.is_empty() {
            let mut tag_ids = Vec::with_capacity(report.countries.len());
            for (code, full_name) in &report.countries {
                tag_ids.push(storage.get_or_create_tag(code, full_name, TagProperty::Country)?.id);
            }
            storage.set_domain_tags(domain_id, TagProperty::Country, &tag_ids)?;
            tracing::info!("Domain {} country tags: {:?}", domain.name, report.countries);
        }
        if let Some(visits) = &report.visits {
            storage.set_domain_visits(domain_id, visits)?;
            tracing::debug!("Domain {} monthly visits: {}", domain.name, visits);
        }

        Ok(())
    }

    async fn probe_language(&self, domain_id: i64) -> anyhow::Result<()> {
        let (domain, country) = {
            let storage = lock_storage(&self.storage)?;
            let domain = storage.get_donor_domain(domain_id)?;
            let country = storage
                .get_domain_tags(domain_id, TagProperty::Country)?
                .into_iter()
                .next()
                .map(|tag| tag.name);
            (domain, country)
        };

        let proxy = match &country {
            Some(country) => self.rotator.best_for_country(country),
            None => self.rotator.first(),
        };

        let html = probes::fetch_main_page(
            self.http.as_ref(),
            self.browser.as_ref(),
            &self.rotator,
            &domain.name,
            proxy,
            self.http_timeout,
            self.browser_timeout,
        )
        .await?;

        let (name, full_name) = detect_language(&html)
            .ok_or_else(|| anyhow::anyhow!("no known language detected on {}", domain.name))?;

        let mut storage = lock_storage(&self.storage)?;
        let tag = storage.get_or_create_tag(name, full_name, TagProperty::Language)?;
        storage.set_domain_tags(domain_id, TagProperty::Language, &[tag.id])?;
        tracing::info!("Domain {} language tag: {}", domain.name, full_name);

        Ok(())
    }
}
