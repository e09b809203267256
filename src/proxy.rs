//! Proxy rotation
//!
//! The rotation is a fixed, ordered list of named endpoints loaded from the
//! `[[proxy]]` tables of the configuration. A rotator never holds a cursor of
//! its own: callers pass the endpoint they last used and get the following one.

use serde::Deserialize;
use std::fmt;

/// One named proxy endpoint
///
/// The label carries a geography hint (e.g. `"DE Germany, Berlin"`) that
/// [`ProxyRotator::best_for_country`] matches against.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyEndpoint {
    pub label: String,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    /// `host:port`, as passed to `--proxy-server`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `http://host:port`, as used by the HTTP client
    pub fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.address())
    }
}

/// Ordered, immutable proxy rotation
#[derive(Debug, Clone, Default)]
pub struct ProxyRotator {
    endpoints: Vec<ProxyEndpoint>,
}

impl ProxyRotator {
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self { endpoints }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn endpoints(&self) -> &[ProxyEndpoint] {
        &self.endpoints
    }

    /// Returns the first endpoint of the rotation, if any
    pub fn first(&self) -> Option<&ProxyEndpoint> {
        self.endpoints.first()
    }

    /// Returns the endpoint following `after` in rotation order
    ///
    /// # Arguments
    ///
    /// * `after` - The endpoint used last, or `None` to start the rotation
    ///
    /// # Returns
    ///
    /// * `Some(endpoint)` - The next endpoint to try
    /// * `None` - `after` was the last endpoint (or is not part of the rotation)
    pub fn next(&self, after: Option<&ProxyEndpoint>) -> Option<&ProxyEndpoint> {
        match after {
            None => self.endpoints.first(),
            Some(current) => {
                let position = self.endpoints.iter().position(|p| p == current)?;
                self.endpoints.get(position + 1)
            }
        }
    }

    /// Returns the first endpoint whose label contains `country`, else the
    /// first endpoint of the rotation
    pub fn best_for_country(&self, country: &str) -> Option<&ProxyEndpoint> {
        self.endpoints
            .iter()
            .find(|p| p.label.contains(country))
            .or_else(|| self.endpoints.first())
    }
}
