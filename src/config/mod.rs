//! Configuration module for Linkwatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use linkwatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("linkwatch.toml")).unwrap();
//! println!("Batches hold {} links", config.checker.chunk_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CheckerConfig, Config, DatabaseConfig, SslConfig, TaggerConfig, UserAgentConfig,
    WorkerConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
