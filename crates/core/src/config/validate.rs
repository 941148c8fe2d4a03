use super::{types::Config, ConfigError};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.server.max_upload_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "server.max_upload_bytes must be greater than 0".to_string(),
        ));
    }

    if config.storage.uploads_dir == config.storage.converted_dir {
        return Err(ConfigError::ValidationError(
            "storage.uploads_dir and storage.converted_dir must differ".to_string(),
        ));
    }

    if config.worker.workers == 0 {
        return Err(ConfigError::ValidationError(
            "worker.workers must be at least 1".to_string(),
        ));
    }

    if config.worker.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "worker.poll_interval_ms must be greater than 0".to_string(),
        ));
    }

    if config.queue.backoff_multiplier < 1.0 || !config.queue.backoff_multiplier.is_finite() {
        return Err(ConfigError::ValidationError(format!(
            "queue.backoff_multiplier must be >= 1.0, got {}",
            config.queue.backoff_multiplier
        )));
    }

    if config.queue.max_delay_ms < config.queue.initial_delay_ms {
        return Err(ConfigError::ValidationError(
            "queue.max_delay_ms cannot be smaller than queue.initial_delay_ms".to_string(),
        ));
    }

    Ok(())
}
