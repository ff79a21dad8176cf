use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - APS credentials are present
/// - Server port is not 0
/// - Poll interval and processing limit are not 0
/// - Bucket key follows the storage naming rules
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.aps.client_id.trim().is_empty() || config.aps.client_secret.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "aps.client_id and aps.client_secret must be set".to_string(),
        ));
    }

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.poller.interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "poller.interval_ms cannot be 0".to_string(),
        ));
    }

    if config.automation.time_limit_secs == 0 {
        return Err(ConfigError::ValidationError(
            "automation.time_limit_secs cannot be 0".to_string(),
        ));
    }

    if !is_valid_bucket_key(&config.storage.bucket_key) {
        return Err(ConfigError::ValidationError(format!(
            "storage.bucket_key '{}' must be 3-128 characters of [-_.a-z0-9]",
            config.storage.bucket_key
        )));
    }

    Ok(())
}

fn is_valid_bucket_key(key: &str) -> bool {
    (3..=128).contains(&key.len())
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}
