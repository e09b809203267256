//! State module for tracking link checks
//!
//! # Components
//!
//! - `LinkStage`: Escalation stage of a link within one batch
//! - `CheckStatus`: Green/red classification of a finished check
//! - `FetchMode`: Which fetch strategy produced a result

mod link_state;

pub use link_state::{CheckStatus, FetchMode, LinkStage};
