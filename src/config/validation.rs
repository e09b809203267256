use crate::config::types::{CheckerConfig, Config, DatabaseConfig, SslConfig, TaggerConfig};
use crate::proxy::ProxyEndpoint;
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_checker_config(&config.checker)?;
    validate_database_config(&config.database)?;
    validate_proxies(&config.proxies)?;
    validate_tagger_config(&config.tagger)?;
    validate_ssl_config(&config.ssl)?;

    if config.worker.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates link checker configuration
fn validate_checker_config(config: &CheckerConfig) -> Result<(), ConfigError> {
    if config.chunk_size < 1 {
        return Err(ConfigError::Validation(format!(
            "chunk_size must be >= 1, got {}",
            config.chunk_size
        )));
    }

    if config.max_connections < 1 || config.max_connections > 100 {
        return Err(ConfigError::Validation(format!(
            "max_connections must be between 1 and 100, got {}",
            config.max_connections
        )));
    }

    if config.browser_chunk_size < 1 {
        return Err(ConfigError::Validation(format!(
            "browser_chunk_size must be >= 1, got {}",
            config.browser_chunk_size
        )));
    }

    for (name, value) in [
        ("direct_timeout_ms", config.direct_timeout_ms),
        ("proxy_timeout_ms", config.proxy_timeout_ms),
        ("browser_timeout_ms", config.browser_timeout_ms),
    ] {
        if value < 100 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 100ms, got {}ms",
                name, value
            )));
        }
    }

    if config.stale_after_days < 0 {
        return Err(ConfigError::Validation(format!(
            "stale_after_days must not be negative, got {}",
            config.stale_after_days
        )));
    }

    Ok(())
}

fn validate_database_config(config: &DatabaseConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "database path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates the proxy rotation entries
fn validate_proxies(proxies: &[ProxyEndpoint]) -> Result<(), ConfigError> {
    for proxy in proxies {
        if proxy.label.trim().is_empty() {
            return Err(ConfigError::Validation(
                "proxy label cannot be empty".to_string(),
            ));
        }

        if proxy.host.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "proxy '{}' has an empty host",
                proxy.label
            )));
        }

        if proxy.port == 0 {
            return Err(ConfigError::Validation(format!(
                "proxy '{}' has port 0",
                proxy.label
            )));
        }
    }
    Ok(())
}

fn validate_tagger_config(config: &TaggerConfig) -> Result<(), ConfigError> {
    if !config.analytics_url.contains("{domain}") {
        return Err(ConfigError::Validation(format!(
            "analytics_url must contain a {{domain}} placeholder, got '{}'",
            config.analytics_url
        )));
    }

    Url::parse(&config.analytics_url_for("example.com"))
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid analytics_url: {}", e)))?;

    validate_selector(&config.legend_selector)?;
    if let Some(selector) = &config.visits_selector {
        validate_selector(selector)?;
    }

    if config.lock_lease_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "lock_lease_secs must be >= 1, got {}",
            config.lock_lease_secs
        )));
    }

    Ok(())
}

fn validate_ssl_config(config: &SslConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "ssl timeout_secs must be >= 1".to_string(),
        ));
    }
    if config.curl_path.is_empty() {
        return Err(ConfigError::Validation(
            "ssl curl_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidSelector(selector.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(label: &str, host: &str, port: u16) -> ProxyEndpoint {
        ProxyEndpoint {
            label: label.to_string(),
            host: host.to_string(),
            port,
        }
    }

    #[test]
    fn test_validate_proxies() {
        assert!(validate_proxies(&[proxy("US", "10.0.0.1", 3128)]).is_ok());
        assert!(validate_proxies(&[]).is_ok());

        assert!(validate_proxies(&[proxy("", "10.0.0.1", 3128)]).is_err());
        assert!(validate_proxies(&[proxy("US", " ", 3128)]).is_err());
        assert!(validate_proxies(&[proxy("US", "10.0.0.1", 0)]).is_err());
    }

    #[test]
    fn test_validate_tagger_config() {
        assert!(validate_tagger_config(&TaggerConfig::default()).is_ok());

        let missing_placeholder = TaggerConfig {
            analytics_url: "https://analytics.example/site".to_string(),
            ..TaggerConfig::default()
        };
        assert!(validate_tagger_config(&missing_placeholder).is_err());

        let bad_selector = TaggerConfig {
            legend_selector: "<<<".to_string(),
            ..TaggerConfig::default()
        };
        assert!(matches!(
            validate_tagger_config(&bad_selector),
            Err(ConfigError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_validate_checker_timeouts() {
        let config = CheckerConfig {
            proxy_timeout_ms: 50,
            ..CheckerConfig::default()
        };
        assert!(validate_checker_config(&config).is_err());
        assert!(validate_checker_config(&CheckerConfig::default()).is_ok());
    }
}
