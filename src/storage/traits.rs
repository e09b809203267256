//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{CheckStatus, FetchMode};
use crate::storage::{
    AcceptorDomain, CheckResult, CheckResultRecord, DonorDomain, LinkRecord, Tag, TagProperty,
    TaskRecord, TaskStatus,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Link not found: {0}")]
    LinkNotFound(i64),

    #[error("Check result not found: {0}")]
    ResultNotFound(i64),

    #[error("Donor domain not found: {0}")]
    DomainNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the link checker,
/// the domain tagger and the task worker.
pub trait Storage {
    // ===== Links =====

    /// Registers a link placement, canonicalizing `link_url`
    ///
    /// # Returns
    ///
    /// The ID of the newly created link
    fn insert_link(&mut self, page_url: &str, link_url: &str, anchor: &str) -> StorageResult<i64>;

    /// Gets a link by ID
    fn get_link(&self, link_id: i64) -> StorageResult<LinkRecord>;

    /// Gets the links with the given IDs; unknown IDs are skipped
    fn get_links_by_ids(&self, ids: &[i64]) -> StorageResult<Vec<LinkRecord>>;

    /// Gets every link
    fn get_all_links(&self) -> StorageResult<Vec<LinkRecord>>;

    /// Gets links registered in the given calendar year
    fn get_links_by_year(&self, year: i32) -> StorageResult<Vec<LinkRecord>>;

    /// Gets links whose last result was not a browser check, plus browser-mode reds
    fn get_links_for_daily_check(&self) -> StorageResult<Vec<LinkRecord>>;

    /// Gets links whose last result is green and was produced before `cutoff`
    fn get_stale_links(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<LinkRecord>>;

    /// Points a link at its donor and acceptor domain rows
    fn assign_link_domains(
        &mut self,
        link_id: i64,
        donor_domain_id: i64,
        acceptor_domain_id: i64,
    ) -> StorageResult<()>;

    // ===== Check Results =====

    /// Persists results and advances each link's "last result" pointer
    ///
    /// All rows are written in a single transaction: either every result and
    /// pointer update is committed, or none is.
    ///
    /// # Returns
    ///
    /// The new result IDs, in input order
    fn persist_check_results(&mut self, results: &[CheckResult]) -> StorageResult<Vec<i64>>;

    /// Gets a persisted check result by ID
    fn get_check_result(&self, result_id: i64) -> StorageResult<CheckResultRecord>;

    /// Gets all results recorded for a link, oldest first
    fn get_results_for_link(&self, link_id: i64) -> StorageResult<Vec<CheckResultRecord>>;

    /// Records the certificate expiry found for a result's donor host
    fn update_ssl_expiry(
        &mut self,
        result_id: i64,
        expires_at: DateTime<Utc>,
        days_left: i64,
    ) -> StorageResult<()>;

    // ===== Domains and Tags =====

    /// Gets or creates a donor domain by name
    ///
    /// # Returns
    ///
    /// The domain and whether it was created by this call
    fn get_or_create_donor_domain(&mut self, name: &str) -> StorageResult<(DonorDomain, bool)>;

    /// Gets or creates an acceptor domain by name
    fn get_or_create_acceptor_domain(&mut self, name: &str) -> StorageResult<AcceptorDomain>;

    /// Gets a donor domain by ID
    fn get_donor_domain(&self, domain_id: i64) -> StorageResult<DonorDomain>;

    /// Gets or creates a tag, unique on `(name, property)`
    fn get_or_create_tag(
        &mut self,
        name: &str,
        full_name: &str,
        property: TagProperty,
    ) -> StorageResult<Tag>;

    /// Replaces a domain's tags of one property, leaving other properties untouched
    fn set_domain_tags(
        &mut self,
        domain_id: i64,
        property: TagProperty,
        tag_ids: &[i64],
    ) -> StorageResult<()>;

    /// Gets a domain's tags of one property
    fn get_domain_tags(&self, domain_id: i64, property: TagProperty) -> StorageResult<Vec<Tag>>;

    /// Stores the last-month visits figure scraped for a domain
    fn set_domain_visits(&mut self, domain_id: i64, visits: &str) -> StorageResult<()>;

    // ===== Pending Domain Queue =====

    /// Appends domain IDs not already queued
    ///
    /// # Returns
    ///
    /// Number of IDs actually added
    fn enqueue_pending_domains(&mut self, domain_ids: &[i64]) -> StorageResult<usize>;

    /// Removes and returns the oldest queued domain ID
    fn pop_pending_domain(&mut self) -> StorageResult<Option<i64>>;

    /// Gets the queued domain IDs in queue order
    fn pending_domains(&self) -> StorageResult<Vec<i64>>;

    /// Takes the system-wide drain lock
    ///
    /// Succeeds when the lock is free or its current lease is older than
    /// `lease_secs`.
    fn try_acquire_drain_lock(&mut self, holder: &str, lease_secs: i64) -> StorageResult<bool>;

    /// Refreshes the lease of a held drain lock
    fn renew_drain_lock(&mut self, holder: &str) -> StorageResult<bool>;

    /// Releases the drain lock if `holder` owns it
    fn release_drain_lock(&mut self, holder: &str) -> StorageResult<bool>;

    // ===== Task Queue =====

    /// Appends a task row
    fn push_task(&mut self, kind: &str, payload: &str) -> StorageResult<i64>;

    /// Claims the oldest queued task, marking it running
    fn claim_task(&mut self) -> StorageResult<Option<TaskRecord>>;

    /// Marks a task done
    fn complete_task(&mut self, task_id: i64) -> StorageResult<()>;

    /// Records a failure; re-queues the task until `max_attempts` is reached
    ///
    /// # Returns
    ///
    /// The task's new status
    fn fail_task(&mut self, task_id: i64, error: &str, max_attempts: u32)
        -> StorageResult<TaskStatus>;

    /// Gets a task by ID
    fn get_task(&self, task_id: i64) -> StorageResult<Option<TaskRecord>>;

    // ===== Statistics =====

    /// Counts links
    fn count_links(&self) -> StorageResult<u64>;

    /// Counts links never checked
    fn count_unchecked_links(&self) -> StorageResult<u64>;

    /// Counts links by last status and the fetch mode that produced it
    fn count_last_results(&self) -> StorageResult<HashMap<(FetchMode, CheckStatus), u64>>;

    /// Counts tasks by status
    fn count_tasks_by_status(&self) -> StorageResult<HashMap<TaskStatus, u64>>;
}
