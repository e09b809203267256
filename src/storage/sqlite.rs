//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Every worker process opens its own connection to the same database file;
//! writes that must be atomic across processes run in `BEGIN IMMEDIATE`
//! transactions so SQLite's write lock serialises them.

use crate::state::{CheckStatus, FetchMode};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    AcceptorDomain, CheckResult, CheckResultRecord, DonorDomain, LinkRecord, Tag, TagProperty,
    TaskRecord, TaskStatus,
};
use crate::url::canonicalize_link_url;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const LINK_COLUMNS: &str = "id, page_url, link_url, anchor, donor_domain_id, acceptor_domain_id,
    created_at, last_result_id, last_status, last_mode, last_checked_at";

const RESULT_COLUMNS: &str = "id, link_id, status, message, status_codes, redirect_url,
    matching_anchor_count, total_anchor_count, off_domain_anchor_count, has_rel,
    rel_nofollow, rel_sponsored, robots_noindex, robots_nofollow, anchor_text_found,
    mode, proxy_label, created_at, ssl_expires_at, ssl_days_left";

const TASK_COLUMNS: &str = "id, kind, payload, status, attempts, error, created_at, updated_at";

/// Formats a timestamp the way every table stores it
///
/// Second precision with a `Z` suffix keeps stored values lexicographically
/// ordered, so range filters can compare strings directly.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance with the default busy timeout
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        Self::with_busy_timeout(path, Duration::from_millis(5_000))
    }

    /// Opens a database shared with other worker processes
    ///
    /// `busy_timeout` bounds how long a writer waits for another process to
    /// release the database lock before failing.
    pub fn with_busy_timeout(path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<LinkRecord> {
    let last_status: Option<String> = row.get(8)?;
    let last_mode: Option<String> = row.get(9)?;
    Ok(LinkRecord {
        id: row.get(0)?,
        page_url: row.get(1)?,
        link_url: row.get(2)?,
        anchor: row.get(3)?,
        donor_domain_id: row.get(4)?,
        acceptor_domain_id: row.get(5)?,
        created_at: row.get(6)?,
        last_result_id: row.get(7)?,
        last_status: last_status.as_deref().and_then(CheckStatus::from_db_string),
        last_mode: last_mode.as_deref().and_then(FetchMode::from_db_string),
        last_checked_at: row.get(10)?,
    })
}

fn row_to_result(row: &Row<'_>) -> rusqlite::Result<CheckResultRecord> {
    let codes: String = row.get(4)?;
    let status_codes: Vec<u16> = serde_json::from_str(&codes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    let status: String = row.get(2)?;
    let mode: String = row.get(15)?;

    Ok(CheckResultRecord {
        id: row.get(0)?,
        result: CheckResult {
            link_id: row.get(1)?,
            status: CheckStatus::from_db_string(&status).unwrap_or(CheckStatus::Red),
            message: row.get(3)?,
            status_codes,
            redirect_url: row.get(5)?,
            matching_anchor_count: row.get(6)?,
            total_anchor_count: row.get(7)?,
            off_domain_anchor_count: row.get(8)?,
            has_rel: row.get(9)?,
            rel_nofollow: row.get(10)?,
            rel_sponsored: row.get(11)?,
            robots_noindex: row.get(12)?,
            robots_nofollow: row.get(13)?,
            anchor_text_found: row.get(14)?,
            mode: FetchMode::from_db_string(&mode).unwrap_or(FetchMode::Direct),
            proxy_label: row.get(16)?,
        },
        created_at: row.get(17)?,
        ssl_expires_at: row.get(18)?,
        ssl_days_left: row.get(19)?,
    })
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status: String = row.get(3)?;
    Ok(TaskRecord {
        id: row.get(0)?,
        kind: row.get(1)?,
        payload: row.get(2)?,
        status: TaskStatus::from_db_string(&status).unwrap_or(TaskStatus::Failed),
        attempts: row.get(4)?,
        error: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_tag(row: &Row<'_>) -> rusqlite::Result<Tag> {
    let property: String = row.get(3)?;
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        full_name: row.get(2)?,
        property: TagProperty::from_db_string(&property).unwrap_or(TagProperty::Country),
    })
}

impl SqliteStorage {
    fn query_links(&self, filter: &str, params: &[&dyn rusqlite::ToSql]) -> StorageResult<Vec<LinkRecord>> {
        let sql = format!("SELECT {} FROM links {} ORDER BY id", LINK_COLUMNS, filter);
        let mut stmt = self.conn.prepare(&sql)?;
        let links = stmt
            .query_map(params, row_to_link)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }
}

impl Storage for SqliteStorage {
    // ===== Links =====

    fn insert_link(&mut self, page_url: &str, link_url: &str, anchor: &str) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO links (page_url, link_url, anchor, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![page_url, canonicalize_link_url(link_url), anchor, now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_link(&self, link_id: i64) -> StorageResult<LinkRecord> {
        let sql = format!("SELECT {} FROM links WHERE id = ?1", LINK_COLUMNS);
        self.conn
            .query_row(&sql, params![link_id], row_to_link)
            .optional()?
            .ok_or(StorageError::LinkNotFound(link_id))
    }

    fn get_links_by_ids(&self, ids: &[i64]) -> StorageResult<Vec<LinkRecord>> {
        let sql = format!("SELECT {} FROM links WHERE id = ?1", LINK_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        let mut links = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(link) = stmt.query_row(params![id], row_to_link).optional()? {
                links.push(link);
            }
        }
        Ok(links)
    }

    fn get_all_links(&self) -> StorageResult<Vec<LinkRecord>> {
        self.query_links("", &[])
    }

    fn get_links_by_year(&self, year: i32) -> StorageResult<Vec<LinkRecord>> {
        let year = format!("{:04}", year);
        self.query_links("WHERE substr(created_at, 1, 4) = ?1", &[&year])
    }

    fn get_links_for_daily_check(&self) -> StorageResult<Vec<LinkRecord>> {
        self.query_links(
            "WHERE last_result_id IS NULL OR last_mode <> ?2 OR last_status = ?1",
            &[
                &CheckStatus::Red.to_db_string(),
                &FetchMode::Browser.to_db_string(),
            ],
        )
    }

    fn get_stale_links(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<LinkRecord>> {
        let cutoff = timestamp(cutoff);
        self.query_links(
            "WHERE last_status = ?1 AND last_checked_at < ?2",
            &[&CheckStatus::Green.to_db_string(), &cutoff],
        )
    }

    fn assign_link_domains(
        &mut self,
        link_id: i64,
        donor_domain_id: i64,
        acceptor_domain_id: i64,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE links SET donor_domain_id = ?1, acceptor_domain_id = ?2 WHERE id = ?3",
            params![donor_domain_id, acceptor_domain_id, link_id],
        )?;
        if updated == 0 {
            return Err(StorageError::LinkNotFound(link_id));
        }
        Ok(())
    }

    // ===== Check Results =====

    fn persist_check_results(&mut self, results: &[CheckResult]) -> StorageResult<Vec<i64>> {
        let created_at = now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut ids = Vec::with_capacity(results.len());
        for result in results {
            let codes = serde_json::to_string(&result.status_codes)?;
            tx.execute(
                "INSERT INTO check_results (link_id, status, message, status_codes, redirect_url,
                 matching_anchor_count, total_anchor_count, off_domain_anchor_count, has_rel,
                 rel_nofollow, rel_sponsored, robots_noindex, robots_nofollow, anchor_text_found,
                 mode, proxy_label, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    result.link_id,
                    result.status.to_db_string(),
                    result.message,
                    codes,
                    result.redirect_url,
                    result.matching_anchor_count,
                    result.total_anchor_count,
                    result.off_domain_anchor_count,
                    result.has_rel,
                    result.rel_nofollow,
                    result.rel_sponsored,
                    result.robots_noindex,
                    result.robots_nofollow,
                    result.anchor_text_found,
                    result.mode.to_db_string(),
                    result.proxy_label,
                    created_at,
                ],
            )?;
            let result_id = tx.last_insert_rowid();

            let updated = tx.execute(
                "UPDATE links SET last_result_id = ?1, last_status = ?2, last_message = ?3,
                 last_mode = ?4, last_checked_at = ?5 WHERE id = ?6",
                params![
                    result_id,
                    result.status.to_db_string(),
                    result.message,
                    result.mode.to_db_string(),
                    created_at,
                    result.link_id,
                ],
            )?;
            if updated == 0 {
                return Err(StorageError::LinkNotFound(result.link_id));
            }

            ids.push(result_id);
        }

        tx.commit()?;
        Ok(ids)
    }

    fn get_check_result(&self, result_id: i64) -> StorageResult<CheckResultRecord> {
        let sql = format!("SELECT {} FROM check_results WHERE id = ?1", RESULT_COLUMNS);
        self.conn
            .query_row(&sql, params![result_id], row_to_result)
            .optional()?
            .ok_or(StorageError::ResultNotFound(result_id))
    }

    fn get_results_for_link(&self, link_id: i64) -> StorageResult<Vec<CheckResultRecord>> {
        let sql = format!(
            "SELECT {} FROM check_results WHERE link_id = ?1 ORDER BY id",
            RESULT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let results = stmt
            .query_map(params![link_id], row_to_result)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    fn update_ssl_expiry(
        &mut self,
        result_id: i64,
        expires_at: DateTime<Utc>,
        days_left: i64,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE check_results SET ssl_expires_at = ?1, ssl_days_left = ?2 WHERE id = ?3",
            params![timestamp(expires_at), days_left, result_id],
        )?;
        if updated == 0 {
            return Err(StorageError::ResultNotFound(result_id));
        }
        Ok(())
    }

    // ===== Domains and Tags =====

    fn get_or_create_donor_domain(&mut self, name: &str) -> StorageResult<(DonorDomain, bool)> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO donor_domains (name, created_at) VALUES (?1, ?2)",
            params![name, now()],
        )?;

        let domain = self.conn.query_row(
            "SELECT id, name, visits, created_at FROM donor_domains WHERE name = ?1",
            params![name],
            |row| {
                Ok(DonorDomain {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    visits: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )?;

        Ok((domain, inserted == 1))
    }

    fn get_or_create_acceptor_domain(&mut self, name: &str) -> StorageResult<AcceptorDomain> {
        self.conn.execute(
            "INSERT OR IGNORE INTO acceptor_domains (name) VALUES (?1)",
            params![name],
        )?;

        let domain = self.conn.query_row(
            "SELECT id, name FROM acceptor_domains WHERE name = ?1",
            params![name],
            |row| {
                Ok(AcceptorDomain {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )?;
        Ok(domain)
    }

    fn get_donor_domain(&self, domain_id: i64) -> StorageResult<DonorDomain> {
        self.conn
            .query_row(
                "SELECT id, name, visits, created_at FROM donor_domains WHERE id = ?1",
                params![domain_id],
                |row| {
                    Ok(DonorDomain {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        visits: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or(StorageError::DomainNotFound(domain_id))
    }

    fn get_or_create_tag(
        &mut self,
        name: &str,
        full_name: &str,
        property: TagProperty,
    ) -> StorageResult<Tag> {
        self.conn.execute(
            "INSERT OR IGNORE INTO tags (name, full_name, ref_property) VALUES (?1, ?2, ?3)",
            params![name, full_name, property.to_db_string()],
        )?;

        let tag = self.conn.query_row(
            "SELECT id, name, full_name, ref_property FROM tags WHERE name = ?1 AND ref_property = ?2",
            params![name, property.to_db_string()],
            row_to_tag,
        )?;
        Ok(tag)
    }

    fn set_domain_tags(
        &mut self,
        domain_id: i64,
        property: TagProperty,
        tag_ids: &[i64],
    ) -> StorageResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "DELETE FROM donor_domain_tags WHERE domain_id = ?1
             AND tag_id IN (SELECT id FROM tags WHERE ref_property = ?2)",
            params![domain_id, property.to_db_string()],
        )?;

        for tag_id in tag_ids {
            tx.execute(
                "INSERT OR IGNORE INTO donor_domain_tags (domain_id, tag_id) VALUES (?1, ?2)",
                params![domain_id, tag_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_domain_tags(&self, domain_id: i64, property: TagProperty) -> StorageResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name, t.full_name, t.ref_property
             FROM tags t JOIN donor_domain_tags dt ON dt.tag_id = t.id
             WHERE dt.domain_id = ?1 AND t.ref_property = ?2
             ORDER BY t.id",
        )?;
        let tags = stmt
            .query_map(params![domain_id, property.to_db_string()], row_to_tag)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn set_domain_visits(&mut self, domain_id: i64, visits: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE donor_domains SET visits = ?1 WHERE id = ?2",
            params![visits, domain_id],
        )?;
        if updated == 0 {
            return Err(StorageError::DomainNotFound(domain_id));
        }
        Ok(())
    }

    // ===== Pending Domain Queue =====

    fn enqueue_pending_domains(&mut self, domain_ids: &[i64]) -> StorageResult<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut added = 0;
        for domain_id in domain_ids {
            added += tx.execute(
                "INSERT OR IGNORE INTO pending_domains (domain_id) VALUES (?1)",
                params![domain_id],
            )?;
        }

        tx.commit()?;
        Ok(added)
    }

    fn pop_pending_domain(&mut self) -> StorageResult<Option<i64>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let front: Option<(i64, i64)> = tx
            .query_row(
                "SELECT position, domain_id FROM pending_domains ORDER BY position ASC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((position, _)) = front {
            tx.execute(
                "DELETE FROM pending_domains WHERE position = ?1",
                params![position],
            )?;
        }

        tx.commit()?;
        Ok(front.map(|(_, domain_id)| domain_id))
    }

    fn pending_domains(&self) -> StorageResult<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT domain_id FROM pending_domains ORDER BY position ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn try_acquire_drain_lock(&mut self, holder: &str, lease_secs: i64) -> StorageResult<bool> {
        let now = Utc::now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let acquired_at: Option<String> = tx
            .query_row(
                "SELECT acquired_at FROM tagger_lock WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let free = match acquired_at {
            None => true,
            Some(at) => match DateTime::parse_from_rfc3339(&at) {
                Ok(at) => {
                    now.signed_duration_since(at.with_timezone(&Utc))
                        > chrono::Duration::seconds(lease_secs)
                }
                Err(_) => true,
            },
        };

        if free {
            tx.execute(
                "INSERT OR REPLACE INTO tagger_lock (id, holder, acquired_at) VALUES (1, ?1, ?2)",
                params![holder, timestamp(now)],
            )?;
        }

        tx.commit()?;
        Ok(free)
    }

    fn renew_drain_lock(&mut self, holder: &str) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE tagger_lock SET acquired_at = ?1 WHERE id = 1 AND holder = ?2",
            params![now(), holder],
        )?;
        Ok(updated == 1)
    }

    fn release_drain_lock(&mut self, holder: &str) -> StorageResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM tagger_lock WHERE id = 1 AND holder = ?1",
            params![holder],
        )?;
        Ok(deleted == 1)
    }

    // ===== Task Queue =====

    fn push_task(&mut self, kind: &str, payload: &str) -> StorageResult<i64> {
        let now = now();
        self.conn.execute(
            "INSERT INTO tasks (kind, payload, status, attempts, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![kind, payload, TaskStatus::Queued.to_db_string(), now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn claim_task(&mut self) -> StorageResult<Option<TaskRecord>> {
        let now = now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let sql = format!(
            "SELECT {} FROM tasks WHERE status = ?1 ORDER BY id ASC LIMIT 1",
            TASK_COLUMNS
        );
        let task = tx
            .query_row(&sql, params![TaskStatus::Queued.to_db_string()], row_to_task)
            .optional()?;

        let claimed = match task {
            Some(mut task) => {
                tx.execute(
                    "UPDATE tasks SET status = ?1, attempts = attempts + 1, updated_at = ?2
                     WHERE id = ?3",
                    params![TaskStatus::Running.to_db_string(), now, task.id],
                )?;
                task.status = TaskStatus::Running;
                task.attempts += 1;
                task.updated_at = now;
                Some(task)
            }
            None => None,
        };

        tx.commit()?;
        Ok(claimed)
    }

    fn complete_task(&mut self, task_id: i64) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE tasks SET status = ?1, error = NULL, updated_at = ?2 WHERE id = ?3",
            params![TaskStatus::Done.to_db_string(), now(), task_id],
        )?;
        Ok(())
    }

    fn fail_task(
        &mut self,
        task_id: i64,
        error: &str,
        max_attempts: u32,
    ) -> StorageResult<TaskStatus> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let attempts: u32 = tx.query_row(
            "SELECT attempts FROM tasks WHERE id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;

        let status = if attempts >= max_attempts {
            TaskStatus::Failed
        } else {
            TaskStatus::Queued
        };

        tx.execute(
            "UPDATE tasks SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.to_db_string(), error, now(), task_id],
        )?;

        tx.commit()?;
        Ok(status)
    }

    fn get_task(&self, task_id: i64) -> StorageResult<Option<TaskRecord>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS);
        let task = self
            .conn
            .query_row(&sql, params![task_id], row_to_task)
            .optional()?;
        Ok(task)
    }

    // ===== Statistics =====

    fn count_links(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_unchecked_links(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM links WHERE last_result_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_last_results(&self) -> StorageResult<HashMap<(FetchMode, CheckStatus), u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT last_mode, last_status, COUNT(*) FROM links
             WHERE last_status IS NOT NULL GROUP BY last_mode, last_status",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = HashMap::new();
        for (mode, status, count) in rows {
            if let (Some(mode), Some(status)) = (
                FetchMode::from_db_string(&mode),
                CheckStatus::from_db_string(&status),
            ) {
                counts.insert((mode, status), count as u64);
            }
        }
        Ok(counts)
    }

    fn count_tasks_by_status(&self) -> StorageResult<HashMap<TaskStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            if let Some(status) = TaskStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(link_id: i64, status: CheckStatus, mode: FetchMode) -> CheckResult {
        CheckResult {
            link_id,
            status,
            message: "ok;\n".to_string(),
            status_codes: vec![301, 200],
            redirect_url: Some("https://donor.example/new".to_string()),
            matching_anchor_count: 1,
            total_anchor_count: 12,
            off_domain_anchor_count: 3,
            has_rel: false,
            rel_nofollow: false,
            rel_sponsored: false,
            robots_noindex: false,
            robots_nofollow: false,
            anchor_text_found: Some("Expected Anchor".to_string()),
            mode,
            proxy_label: None,
        }
    }

    fn storage_with_link() -> (SqliteStorage, i64) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let link_id = storage
            .insert_link(
                "https://donor.example/post",
                "https://acceptor.example",
                "Expected Anchor",
            )
            .unwrap();
        (storage, link_id)
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_insert_link_canonicalizes_url() {
        let (storage, link_id) = storage_with_link();
        let link = storage.get_link(link_id).unwrap();
        assert_eq!(link.link_url, "https://acceptor.example/");
        assert!(link.last_result_id.is_none());
    }

    #[test]
    fn test_get_missing_link() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_link(42),
            Err(StorageError::LinkNotFound(42))
        ));
    }

    #[test]
    fn test_get_links_by_ids_skips_unknown() {
        let (storage, link_id) = storage_with_link();
        let links = storage.get_links_by_ids(&[link_id, 999]).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].id, link_id);
    }

    #[test]
    fn test_persist_updates_last_result() {
        let (mut storage, link_id) = storage_with_link();

        let ids = storage
            .persist_check_results(&[sample_result(link_id, CheckStatus::Green, FetchMode::Direct)])
            .unwrap();
        assert_eq!(ids.len(), 1);

        let link = storage.get_link(link_id).unwrap();
        assert_eq!(link.last_result_id, Some(ids[0]));
        assert_eq!(link.last_status, Some(CheckStatus::Green));
        assert_eq!(link.last_mode, Some(FetchMode::Direct));

        let record = storage.get_check_result(ids[0]).unwrap();
        assert_eq!(record.result.status_codes, vec![301, 200]);
        assert_eq!(record.result.off_domain_anchor_count, 3);
        assert!(record.ssl_expires_at.is_none());
    }

    #[test]
    fn test_persist_is_atomic() {
        let (mut storage, link_id) = storage_with_link();

        let results = vec![
            sample_result(link_id, CheckStatus::Green, FetchMode::Direct),
            sample_result(9_999, CheckStatus::Red, FetchMode::Direct),
        ];
        assert!(storage.persist_check_results(&results).is_err());

        assert!(storage.get_results_for_link(link_id).unwrap().is_empty());
        assert!(storage.get_link(link_id).unwrap().last_result_id.is_none());
    }

    #[test]
    fn test_update_ssl_expiry() {
        let (mut storage, link_id) = storage_with_link();
        let ids = storage
            .persist_check_results(&[sample_result(link_id, CheckStatus::Green, FetchMode::Direct)])
            .unwrap();

        let expires = Utc::now() + chrono::Duration::days(30);
        storage.update_ssl_expiry(ids[0], expires, 30).unwrap();

        let record = storage.get_check_result(ids[0]).unwrap();
        assert_eq!(record.ssl_days_left, Some(30));
        assert!(record.ssl_expires_at.is_some());

        assert!(storage.update_ssl_expiry(12345, expires, 1).is_err());
    }

    #[test]
    fn test_daily_and_stale_queries() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let unchecked = storage.insert_link("https://d.example/1", "https://a.example/", "a").unwrap();
        let red_browser = storage.insert_link("https://d.example/2", "https://a.example/", "a").unwrap();
        let green = storage.insert_link("https://d.example/3", "https://a.example/", "a").unwrap();
        let red_direct = storage.insert_link("https://d.example/4", "https://a.example/", "a").unwrap();
        let green_browser = storage.insert_link("https://d.example/5", "https://a.example/", "a").unwrap();

        storage
            .persist_check_results(&[
                sample_result(red_browser, CheckStatus::Red, FetchMode::Browser),
                sample_result(green, CheckStatus::Green, FetchMode::Proxied),
                sample_result(red_direct, CheckStatus::Red, FetchMode::Direct),
                sample_result(green_browser, CheckStatus::Green, FetchMode::Browser),
            ])
            .unwrap();

        let daily: Vec<i64> = storage
            .get_links_for_daily_check()
            .unwrap()
            .iter()
            .map(|l| l.id)
            .collect();
        // Everything outside browser mode, plus browser-mode reds.
        assert_eq!(daily, vec![unchecked, red_browser, green, red_direct]);

        let future = Utc::now() + chrono::Duration::days(1);
        let stale: Vec<i64> = storage
            .get_stale_links(future)
            .unwrap()
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(stale, vec![green, green_browser]);

        let past = Utc::now() - chrono::Duration::days(1);
        assert!(storage.get_stale_links(past).unwrap().is_empty());
    }

    #[test]
    fn test_links_by_year() {
        let (storage, link_id) = storage_with_link();
        let year = chrono::Datelike::year(&Utc::now());

        let links = storage.get_links_by_year(year).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].id, link_id);
        assert!(storage.get_links_by_year(1999).unwrap().is_empty());
    }

    #[test]
    fn test_donor_domain_created_once() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let (first, created) = storage.get_or_create_donor_domain("donor.example").unwrap();
        assert!(created);

        let (second, created_again) = storage.get_or_create_donor_domain("donor.example").unwrap();
        assert!(!created_again);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_tags_are_unique_per_property() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let a = storage.get_or_create_tag("de", "Germany", TagProperty::Country).unwrap();
        let b = storage.get_or_create_tag("de", "Germany", TagProperty::Country).unwrap();
        let c = storage.get_or_create_tag("de", "German", TagProperty::Language).unwrap();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_set_domain_tags_keeps_other_property() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (domain, _) = storage.get_or_create_donor_domain("donor.example").unwrap();

        let de = storage.get_or_create_tag("de", "Germany", TagProperty::Country).unwrap();
        let at = storage.get_or_create_tag("at", "Austria", TagProperty::Country).unwrap();
        let german = storage.get_or_create_tag("de", "German", TagProperty::Language).unwrap();

        storage.set_domain_tags(domain.id, TagProperty::Language, &[german.id]).unwrap();
        storage.set_domain_tags(domain.id, TagProperty::Country, &[de.id]).unwrap();
        storage.set_domain_tags(domain.id, TagProperty::Country, &[at.id]).unwrap();

        let countries = storage.get_domain_tags(domain.id, TagProperty::Country).unwrap();
        assert_eq!(countries, vec![at]);

        let languages = storage.get_domain_tags(domain.id, TagProperty::Language).unwrap();
        assert_eq!(languages, vec![german]);
    }

    #[test]
    fn test_pending_queue_dedup() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let added = storage.enqueue_pending_domains(&[10, 20, 10]).unwrap();
        assert_eq!(added, 2);
        assert_eq!(storage.pending_domains().unwrap(), vec![10, 20]);

        assert_eq!(storage.pop_pending_domain().unwrap(), Some(10));
        assert_eq!(storage.pop_pending_domain().unwrap(), Some(20));
        assert_eq!(storage.pop_pending_domain().unwrap(), None);
    }

    #[test]
    fn test_drain_lock_is_exclusive() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        assert!(storage.try_acquire_drain_lock("worker-a", 3_600).unwrap());
        assert!(!storage.try_acquire_drain_lock("worker-b", 3_600).unwrap());

        assert!(!storage.release_drain_lock("worker-b").unwrap());
        assert!(storage.release_drain_lock("worker-a").unwrap());

        assert!(storage.try_acquire_drain_lock("worker-b", 3_600).unwrap());
    }

    #[test]
    fn test_expired_drain_lock_is_taken_over() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        assert!(storage.try_acquire_drain_lock("crashed", 3_600).unwrap());
        assert!(storage.try_acquire_drain_lock("rescuer", -1).unwrap());

        assert!(!storage.renew_drain_lock("crashed").unwrap());
        assert!(storage.renew_drain_lock("rescuer").unwrap());
    }

    #[test]
    fn test_task_claim_and_retry() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first = storage.push_task("check_all_links", "{}").unwrap();
        let second = storage.push_task("check_daily", "{}").unwrap();

        let claimed = storage.claim_task().unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.status, TaskStatus::Running);

        let status = storage.fail_task(first, "database is locked", 2).unwrap();
        assert_eq!(status, TaskStatus::Queued);

        let next = storage.claim_task().unwrap().unwrap();
        assert_eq!(next.id, first);
        assert_eq!(storage.fail_task(first, "again", 2).unwrap(), TaskStatus::Failed);

        let last = storage.claim_task().unwrap().unwrap();
        assert_eq!(last.id, second);
        storage.complete_task(second).unwrap();

        assert!(storage.claim_task().unwrap().is_none());

        let counts = storage.count_tasks_by_status().unwrap();
        assert_eq!(counts.get(&TaskStatus::Failed), Some(&1));
        assert_eq!(counts.get(&TaskStatus::Done), Some(&1));
    }

    #[test]
    fn test_count_last_results() {
        let (mut storage, link_id) = storage_with_link();
        let other = storage.insert_link("https://d.example/x", "https://a.example/", "a").unwrap();

        storage
            .persist_check_results(&[
                sample_result(link_id, CheckStatus::Green, FetchMode::Direct),
                sample_result(other, CheckStatus::Red, FetchMode::Browser),
            ])
            .unwrap();

        let counts = storage.count_last_results().unwrap();
        assert_eq!(counts.get(&(FetchMode::Direct, CheckStatus::Green)), Some(&1));
        assert_eq!(counts.get(&(FetchMode::Browser, CheckStatus::Red)), Some(&1));
        assert_eq!(storage.count_links().unwrap(), 2);
        assert_eq!(storage.count_unchecked_links().unwrap(), 0);
    }
}
