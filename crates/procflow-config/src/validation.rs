// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures configuration values are consistent and within valid ranges
//! before any endpoint is bound or process spawned.

use crate::{ConfigError, ConfigResult, EngineConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &EngineConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_value_ranges(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_required_fields(config: &EngineConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.transport.host.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "transport.host".to_string(),
        });
    }
    if config.load_balancer.worker_type.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "load_balancer.worker_type".to_string(),
        });
    }
}

fn validate_value_ranges(config: &EngineConfig, errors: &mut Vec<ConfigValidationError>) {
    let non_zero = [
        ("transport.send_hwm", config.transport.send_hwm as u64),
        ("transport.recv_hwm", config.transport.recv_hwm as u64),
        ("transport.worker_send_hwm", config.transport.worker_send_hwm as u64),
        ("transport.poll_interval_ms", config.transport.poll_interval_ms),
        ("load_balancer.workers", config.load_balancer.workers as u64),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
    }

    if config.pool.handshake_backoff_ms >= config.pool.handshake_timeout_ms {
        errors.push(ConfigValidationError::InvalidValue {
            field: "pool.handshake_backoff_ms".to_string(),
            reason: format!(
                "must be smaller than pool.handshake_timeout_ms ({})",
                config.pool.handshake_timeout_ms
            ),
        });
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("must be one of {}", LOG_LEVELS.join(", ")),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = EngineConfig::default();
        config.transport.host = String::new();

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("transport.host"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = EngineConfig::default();
        config.load_balancer.workers = 0;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("load_balancer.workers"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_backoff_must_be_below_timeout() {
        let mut config = EngineConfig::default();
        config.pool.handshake_backoff_ms = 100;
        config.pool.handshake_timeout_ms = 100;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("pool.handshake_backoff_ms"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_unknown_log_level() {
        let mut config = EngineConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(validate_config(&config).is_err());

        config.logging.level = "DEBUG".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
