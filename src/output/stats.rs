//! Statistics from the link database
//!
//! This module extracts and displays check statistics from the storage layer.

use crate::state::{CheckStatus, FetchMode};
use crate::storage::{Storage, TaskStatus};
use crate::LinkwatchError;
use std::collections::HashMap;

/// Link check statistics summary
#[derive(Debug, Clone)]
pub struct CheckStatistics {
    /// Total number of tracked links
    pub total_links: u64,

    /// Links that have never been checked
    pub unchecked_links: u64,

    /// Latest result of each link, by fetch mode and status
    pub last_results: HashMap<(FetchMode, CheckStatus), u64>,

    /// Donor domains waiting for the tagger
    pub pending_domains: usize,

    /// Task queue rows by status
    pub tasks_by_status: HashMap<TaskStatus, u64>,
}

impl CheckStatistics {
    pub fn count(&self, mode: FetchMode, status: CheckStatus) -> u64 {
        self.last_results.get(&(mode, status)).copied().unwrap_or(0)
    }

    pub fn total_with_status(&self, status: CheckStatus) -> u64 {
        self.last_results
            .iter()
            .filter(|((_, s), _)| *s == status)
            .map(|(_, count)| count)
            .sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CheckStatistics)` - Successfully loaded statistics
/// * `Err(LinkwatchError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CheckStatistics, LinkwatchError> {
    Ok(CheckStatistics {
        total_links: storage.count_links()?,
        unchecked_links: storage.count_unchecked_links()?,
        last_results: storage.count_last_results()?,
        pending_domains: storage.pending_domains()?.len(),
        tasks_by_status: storage.count_tasks_by_status()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CheckStatistics) {
    println!("=== Link Check Statistics ===\n");

    println!("Overview:");
    println!("  Tracked links: {}", stats.total_links);
    println!("  Never checked: {}", stats.unchecked_links);
    println!("  Donor domains awaiting tagging: {}", stats.pending_domains);
    println!();

    println!("Last Results by Fetch Mode:");
    for mode in [FetchMode::Direct, FetchMode::Proxied, FetchMode::Browser] {
        println!(
            "  {}: {} green, {} red",
            mode,
            stats.count(mode, CheckStatus::Green),
            stats.count(mode, CheckStatus::Red)
        );
    }
    println!();

    if !stats.tasks_by_status.is_empty() {
        println!("Task Queue:");
        for status in [
            TaskStatus::Queued,
            TaskStatus::Running,
            TaskStatus::Done,
            TaskStatus::Failed,
        ] {
            if let Some(count) = stats.tasks_by_status.get(&status) {
                println!("  {}: {}", status.to_db_string(), count);
            }
        }
        println!();
    }

    let green = stats.total_with_status(CheckStatus::Green);
    let checked = green + stats.total_with_status(CheckStatus::Red);
    let green_rate = if checked > 0 {
        (green as f64 / checked as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Green Rate: {:.1}% ({} / {} checked links)",
        green_rate, green, checked
    );
}
