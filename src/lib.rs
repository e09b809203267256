//! Linkwatch: a backlink verification engine
//!
//! This crate re-visits previously placed backlinks to confirm they still exist,
//! still point at the right target and still carry the required attributes. Cheap
//! direct fetches escalate to proxied fetches and finally to a headless browser
//! only when the cheaper strategy is blocked. A companion tagger classifies donor
//! domains by traffic country and primary language.

pub mod config;
pub mod crawler;
pub mod dispatch;
pub mod output;
pub mod proxy;
pub mod ssl;
pub mod state;
pub mod storage;
pub mod tagger;
pub mod url;

use thiserror::Error;

/// Main error type for Linkwatch operations
#[derive(Debug, Error)]
pub enum LinkwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Task payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Invalid stage transition for link {link_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        link_id: i64,
        from: state::LinkStage,
        to: state::LinkStage,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector in config: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Linkwatch operations
pub type Result<T> = std::result::Result<T, LinkwatchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use proxy::{ProxyEndpoint, ProxyRotator};
pub use state::{CheckStatus, FetchMode, LinkStage};
pub use url::{canonicalize_link_url, extract_domain, normalize};
