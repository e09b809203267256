/// Link state definitions for tracking a link through one check batch
///
/// This module defines the escalation stages a link passes through, the
/// classification a finished check yields and the fetch strategy that produced it.
use std::fmt;

/// Represents the escalation stage of a link within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkStage {
    // ===== Active States =====
    /// Link has entered the batch and not been fetched yet
    Pending,

    /// Direct fetch finished; the outcome decides the next stage
    DirectChecked,

    /// Direct fetch timed out; waiting for the proxy rotation
    PendingProxy,

    /// Blocked, TLS failure or render required; waiting for the browser
    PendingBrowser,

    // ===== Terminal State =====
    /// A classification has been recorded for the link
    Done,
}

impl LinkStage {
    /// Returns true if moving from `self` to `next` is a legal escalation
    ///
    /// Stages only ever move forward: direct, then proxy, then browser.
    pub fn can_transition_to(&self, next: LinkStage) -> bool {
        use LinkStage::*;
        matches!(
            (self, next),
            (Pending, DirectChecked)
                | (Pending, PendingBrowser)
                | (DirectChecked, Done)
                | (DirectChecked, PendingProxy)
                | (DirectChecked, PendingBrowser)
                | (PendingProxy, Done)
                | (PendingProxy, PendingBrowser)
                | (PendingBrowser, Done)
        )
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::DirectChecked => "direct_checked",
            Self::PendingProxy => "pending_proxy",
            Self::PendingBrowser => "pending_browser",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for LinkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Classification of one check result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    Green,
    Red,
}

impl CheckStatus {
    pub fn is_green(&self) -> bool {
        matches!(self, Self::Green)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Red => "red",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "green" => Some(Self::Green),
            "red" => Some(Self::Red),
            _ => None,
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Fetch strategy, in increasing order of cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FetchMode {
    Direct,
    Proxied,
    Browser,
}

impl FetchMode {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Proxied => "proxied",
            Self::Browser => "browser",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "proxied" => Some(Self::Proxied),
            "browser" => Some(Self::Browser),
            _ => None,
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
