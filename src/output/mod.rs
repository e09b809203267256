//! Output module for operator-facing reports
//!
//! This module handles:
//! - Check statistics for the `stats` command
//! - The configuration summary printed by `dry-run`

pub mod stats;

pub use stats::{load_statistics, print_statistics, CheckStatistics};

use crate::config::Config;

/// Prints what a worker would do with `config`, without touching the network
pub fn print_dry_run(config: &Config, config_hash: &str) {
    println!("=== Dry Run ===\n");

    println!("Configuration:");
    println!("  Hash: {}", config_hash);
    println!("  Database: {}", config.database.path);
    println!();

    println!("Checker:");
    println!("  Chunk size: {}", config.checker.chunk_size);
    println!("  Max connections: {}", config.checker.max_connections);
    println!(
        "  Timeouts: direct {:?}, proxy {:?}, browser {:?}",
        config.checker.direct_timeout(),
        config.checker.proxy_timeout(),
        config.checker.browser_timeout()
    );
    println!("  Browser chunk size: {}", config.checker.browser_chunk_size);
    println!();

    println!("Proxy Rotation ({}):", config.proxies.len());
    for (position, proxy) in config.proxies.iter().enumerate() {
        println!("  {}. {}", position + 1, proxy);
    }
    println!();

    println!("Tagger:");
    println!("  Analytics page: {}", config.tagger.analytics_url);
    println!("  Lock lease: {}s", config.tagger.lock_lease_secs);
}
