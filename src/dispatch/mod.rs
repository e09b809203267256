//! Task dispatch boundary
//!
//! Check batches, tagger runs and certificate probes are all expressed as
//! [`Task`] values pushed onto a queue that any number of worker processes
//! consume. The queue lives in the shared SQLite database.

mod worker;

pub use worker::{Worker, WorkerReport};

use crate::storage::{Storage, TaskStatus};
use crate::Result;
use serde::{Deserialize, Serialize};

/// A unit of work consumed by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum Task {
    CheckLinkById { id: i64 },
    CheckLinksByIdList { ids: Vec<i64> },
    CheckAllLinks,
    CheckLinksByYear { year: i32 },
    CheckLinksByIdListViaBrowser { ids: Vec<i64> },
    CheckDaily,
    CheckStale,
    CheckDonorDomainsWithTagger { domain_ids: Vec<i64> },
    ProbeSsl { result_ids: Vec<i64> },
}

impl Task {
    /// Short name stored alongside the payload
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckLinkById { .. } => "check_link_by_id",
            Self::CheckLinksByIdList { .. } => "check_links_by_id_list",
            Self::CheckAllLinks => "check_all_links",
            Self::CheckLinksByYear { .. } => "check_links_by_year",
            Self::CheckLinksByIdListViaBrowser { .. } => "check_links_by_id_list_via_browser",
            Self::CheckDaily => "check_daily",
            Self::CheckStale => "check_stale",
            Self::CheckDonorDomainsWithTagger { .. } => "check_donor_domains_with_tagger",
            Self::ProbeSsl { .. } => "probe_ssl",
        }
    }
}

/// A task claimed by a worker
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub id: i64,
    pub attempts: u32,
    pub task: Task,
}

/// Queue of serialized tasks
pub trait TaskQueue {
    /// Appends a task
    fn push(&mut self, task: &Task) -> Result<i64>;

    /// Claims the oldest queued task
    ///
    /// A row whose payload cannot be decoded is parked as failed and reported
    /// as an error.
    fn claim(&mut self) -> Result<Option<ClaimedTask>>;

    /// Marks a claimed task done
    fn complete(&mut self, task_id: i64) -> Result<()>;

    /// Records a failure; the task is re-queued until `max_attempts`
    fn fail(&mut self, task_id: i64, error: &str, max_attempts: u32) -> Result<TaskStatus>;
}

impl<S: Storage> TaskQueue for S {
    fn push(&mut self, task: &Task) -> Result<i64> {
        let payload = serde_json::to_string(task)?;
        let id = self.push_task(task.kind(), &payload)?;
        tracing::debug!("Queued task {} ({})", id, task.kind());
        Ok(id)
    }

    fn claim(&mut self) -> Result<Option<ClaimedTask>> {
        let record = match self.claim_task()? {
            Some(record) => record,
            None => return Ok(None),
        };

        match serde_json::from_str::<Task>(&record.payload) {
            Ok(task) => Ok(Some(ClaimedTask {
                id: record.id,
                attempts: record.attempts,
                task,
            })),
            Err(e) => {
                self.fail_task(record.id, &format!("undecodable payload: {}", e), 0)?;
                Err(e.into())
            }
        }
    }

    fn complete(&mut self, task_id: i64) -> Result<()> {
        self.complete_task(task_id)?;
        Ok(())
    }

    fn fail(&mut self, task_id: i64, error: &str, max_attempts: u32) -> Result<TaskStatus> {
        Ok(self.fail_task(task_id, error, max_attempts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    #[test]
    fn test_task_json_shape() {
        let json = serde_json::to_string(&Task::CheckLinksByYear { year: 2023 }).unwrap();
        assert_eq!(json, r#"{"kind":"check_links_by_year","args":{"year":2023}}"#);

        let unit = serde_json::to_string(&Task::CheckDaily).unwrap();
        assert_eq!(unit, r#"{"kind":"check_daily"}"#);
    }

    #[test]
    fn test_kind_matches_serde_tag() {
        let tasks = vec![
            Task::CheckLinkById { id: 1 },
            Task::CheckLinksByIdList { ids: vec![1, 2] },
            Task::CheckAllLinks,
            Task::CheckLinksByYear { year: 2024 },
            Task::CheckLinksByIdListViaBrowser { ids: vec![3] },
            Task::CheckDaily,
            Task::CheckStale,
            Task::CheckDonorDomainsWithTagger { domain_ids: vec![7] },
            Task::ProbeSsl { result_ids: vec![9] },
        ];

        for task in tasks {
            let value: serde_json::Value = serde_json::to_value(&task).unwrap();
            assert_eq!(value["kind"], task.kind());
        }
    }

    #[test]
    fn test_queue_roundtrip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let task = Task::CheckLinksByIdList { ids: vec![4, 5] };

        let id = storage.push(&task).unwrap();
        let claimed = storage.claim().unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.task, task);

        storage.complete(id).unwrap();
        assert!(storage.claim().unwrap().is_none());
    }

    #[test]
    fn test_undecodable_payload_is_parked() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage.push_task("mystery", "{not json").unwrap();

        assert!(storage.claim().is_err());
        let record = storage.get_task(id).unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(storage.claim().unwrap().is_none());
    }
}
