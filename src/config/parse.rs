use super::types::*;
use crate::config::{env_placeholder, expand_env_vars};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("log_group is required")]
    LogGroupNameRequired,

    #[error("log_stream cannot be empty")]
    LogStreamNameRequired,

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Read, expand, parse and validate the config at `path`. Errors name the file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml).map_err(|e| match e {
        ConfigError::YamlParse(inner) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), inner),
        )),
        other => other,
    })
}

/// Parse and validate a config from YAML text.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let expanded = expand_env_vars(yaml);
    check_unexpanded_vars(&expanded)?;

    let config: Config = serde_yaml::from_str(&expanded)?;
    validate_config(&config)?;
    Ok(config)
}

/// Any `$env{NAME}` left after expansion names an unset variable.
fn check_unexpanded_vars(yaml: &str) -> Result<(), ConfigError> {
    // Commented-out references are never parsed, so they may stay unset.
    let mut unexpanded_vars: Vec<String> = yaml
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(|line| env_placeholder().captures_iter(line))
        .map(|cap| cap[1].to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let placeholders: Vec<String> = unexpanded_vars
        .iter()
        .map(|name| format!("$env{{{}}}", name))
        .collect();
    Err(ConfigError::Validation(format!(
        "environment variable(s) not set: {} (export them or replace the placeholders with values)",
        placeholders.join(", ")
    )))
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    match config.log_group.as_deref() {
        None => return Err(ConfigError::LogGroupNameRequired),
        Some(group) if group.trim().is_empty() => return Err(ConfigError::LogGroupNameRequired),
        Some(_) => {}
    }

    if let Some(stream) = config.log_stream.as_deref() {
        if stream.trim().is_empty() {
            return Err(ConfigError::LogStreamNameRequired);
        }
    }

    let mut errors = Vec::new();
    validate_delivery(&config.delivery, &mut errors);

    if let Some(credentials) = &config.credentials {
        if credentials.access_key_id.is_empty() {
            errors.push("credentials.access_key_id cannot be empty".to_string());
        }
        if credentials.secret_access_key.is_empty() {
            errors.push("credentials.secret_access_key cannot be empty".to_string());
        }
    }

    if let Some(endpoint) = &config.endpoint {
        if reqwest::Url::parse(endpoint).is_err() {
            errors.push(format!("endpoint '{}' is not a valid URL", endpoint));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_delivery(delivery: &DeliveryConfig, errors: &mut Vec<String>) {
    if delivery.max_batch_size == 0 || delivery.max_batch_size > MAX_EVENTS_PER_BATCH {
        errors.push(format!(
            "delivery.max_batch_size must be between 1 and {}, got {}",
            MAX_EVENTS_PER_BATCH, delivery.max_batch_size
        ));
    }

    if delivery.open_timeout.is_zero() {
        errors.push("delivery.open_timeout must be greater than zero".to_string());
    }

    if delivery.read_timeout.is_zero() {
        errors.push("delivery.read_timeout must be greater than zero".to_string());
    }

    if delivery.shutdown_timeout.is_zero() {
        errors.push("delivery.shutdown_timeout must be greater than zero".to_string());
    }
}
