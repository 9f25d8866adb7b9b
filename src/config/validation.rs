use crate::config::types::{Config, InspectorConfig, OutputConfig, UserAgentConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_inspector_config(&config.inspector)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates inspector configuration
fn validate_inspector_config(config: &InspectorConfig) -> Result<(), ConfigError> {
    if config.fetch_concurrency < 1 || config.fetch_concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "fetch_concurrency must be between 1 and 64, got {}",
            config.fetch_concurrency
        )));
    }

    if config.question_concurrency < 1 || config.question_concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "question_concurrency must be between 1 and 64, got {}",
            config.question_concurrency
        )));
    }

    if config.fetch_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_ms must be >= 100ms, got {}ms",
            config.fetch_timeout_ms
        )));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max_redirects must be <= 20, got {}",
            config.max_redirects
        )));
    }

    if config.jitter_max_ms < config.jitter_min_ms {
        return Err(ConfigError::Validation(format!(
            "jitter_max_ms ({}) must be >= jitter_min_ms ({})",
            config.jitter_max_ms, config.jitter_min_ms
        )));
    }

    if config.max_text_length <= config.min_text_length {
        return Err(ConfigError::Validation(format!(
            "max_text_length ({}) must be greater than min_text_length ({})",
            config.max_text_length, config.min_text_length
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    Ok(())
}

/// Validates the user agent pool
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.pool.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent pool cannot be empty".to_string(),
        ));
    }

    for agent in &config.pool {
        if agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user-agent pool entries cannot be blank".to_string(),
            ));
        }
        // Must be usable as an HTTP header value
        if reqwest::header::HeaderValue::from_str(agent).is_err() {
            return Err(ConfigError::Validation(format!(
                "user-agent '{}' is not a valid header value",
                agent
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.runs_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "runs_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}
