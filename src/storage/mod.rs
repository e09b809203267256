//! Storage module for persisting link checks
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Link, donor domain and acceptor domain records
//! - Check result persistence with the "last result" pointer update
//! - The cross-process pending-domain queue and its drain lock
//! - The task queue consumed by worker processes

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::DatabaseConfig;
use crate::state::{CheckStatus, FetchMode};
use crate::LinkwatchError;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Storage handle shared between the tasks of one process
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Opens the database named by the configuration
///
/// # Arguments
///
/// * `config` - Database path and busy timeout
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(LinkwatchError)` - Failed to initialize storage
pub fn open_storage(config: &DatabaseConfig) -> Result<SqliteStorage, LinkwatchError> {
    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
    Ok(SqliteStorage::with_busy_timeout(
        Path::new(&config.path),
        busy_timeout,
    )?)
}

/// Locks a shared storage handle, mapping a poisoned mutex to a storage error
pub fn lock_storage(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|e| StorageError::Database(format!("storage mutex poisoned: {}", e)))
}

/// Represents a tracked backlink placement
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub id: i64,
    pub page_url: String,
    pub link_url: String,
    pub anchor: String,
    pub donor_domain_id: Option<i64>,
    pub acceptor_domain_id: Option<i64>,
    pub created_at: String,
    pub last_result_id: Option<i64>,
    pub last_status: Option<CheckStatus>,
    pub last_mode: Option<FetchMode>,
    pub last_checked_at: Option<String>,
}

/// Outcome of one verification pass, before it is persisted
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub link_id: i64,
    pub status: CheckStatus,
    pub message: String,
    pub status_codes: Vec<u16>,
    pub redirect_url: Option<String>,
    pub matching_anchor_count: u32,
    pub total_anchor_count: u32,
    pub off_domain_anchor_count: u32,
    pub has_rel: bool,
    pub rel_nofollow: bool,
    pub rel_sponsored: bool,
    pub robots_noindex: bool,
    pub robots_nofollow: bool,
    pub anchor_text_found: Option<String>,
    pub mode: FetchMode,
    pub proxy_label: Option<String>,
}

/// A persisted check result
#[derive(Debug, Clone)]
pub struct CheckResultRecord {
    pub id: i64,
    pub result: CheckResult,
    pub created_at: String,
    pub ssl_expires_at: Option<String>,
    pub ssl_days_left: Option<i64>,
}

/// A site hosting backlinks
#[derive(Debug, Clone)]
pub struct DonorDomain {
    pub id: i64,
    pub name: String,
    pub visits: Option<String>,
    pub created_at: String,
}

/// A site backlinks point at
#[derive(Debug, Clone)]
pub struct AcceptorDomain {
    pub id: i64,
    pub name: String,
}

/// Which donor-domain attribute a tag describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagProperty {
    Country,
    Language,
}

impl TagProperty {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::Language => "language",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "country" => Some(Self::Country),
            "language" => Some(Self::Language),
            _ => None,
        }
    }
}

/// A country or language tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub property: TagProperty,
}

/// A row of the task queue
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: i64,
    pub kind: String,
    pub payload: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Lifecycle of a queued task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_roundtrip() {
        for status in &[
            TaskStatus::Queued,
            TaskStatus::Running,
            TaskStatus::Done,
            TaskStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            let parsed = TaskStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_tag_property_roundtrip() {
        for property in &[TagProperty::Country, TagProperty::Language] {
            assert_eq!(
                TagProperty::from_db_string(property.to_db_string()),
                Some(*property)
            );
        }
        assert_eq!(TagProperty::from_db_string("invalid"), None);
    }

    #[test]
    fn test_lock_storage_on_healthy_mutex() {
        let storage: SharedStorage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        assert!(lock_storage(&storage).is_ok());
    }
}
