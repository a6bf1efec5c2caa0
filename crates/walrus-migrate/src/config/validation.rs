//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Destination validation
    if config.walrus.aggregator_url.trim().is_empty() {
        return Err(MigrateError::Config(
            "walrus.aggregator_url is required".into(),
        ));
    }
    if config.walrus.publisher_url.trim().is_empty() {
        return Err(MigrateError::Config("walrus.publisher_url is required".into()));
    }
    for (field, url) in [
        ("walrus.aggregator_url", &config.walrus.aggregator_url),
        ("walrus.publisher_url", &config.walrus.publisher_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(MigrateError::Config(format!(
                "{} must be an http(s) URL, got '{}'",
                field, url
            )));
        }
    }
    if config.walrus.epochs == 0 {
        return Err(MigrateError::Config("walrus.epochs must be at least 1".into()));
    }

    // Source validation
    if config.source.region.trim().is_empty() {
        return Err(MigrateError::Config("source.region is required".into()));
    }

    // Transfer config validation - only check if explicitly set.
    // Concurrency is clamped when the batch starts.
    if let Some(0) = config.transfer.http_timeout_secs {
        return Err(MigrateError::Config(
            "transfer.http_timeout_secs must be at least 1".into(),
        ));
    }

    Ok(())
}
