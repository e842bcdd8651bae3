// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{validate_config, ConfigError, ConfigResult, EngineConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "procflow.toml";

/// Find the procflow configuration file
///
/// Search order:
/// 1. `PROCFLOW_CONFIG_PATH` environment variable
/// 2. Current working directory: `./procflow.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("PROCFLOW_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by PROCFLOW_CONFIG_PATH not found: {}",
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();

    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "procflow configuration file '{}' not found in any of these locations:\n{}\n\nSet PROCFLOW_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides keyed by dotted path
///
/// # Errors
///
/// Returns error if config file is not found, contains invalid TOML, or fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<EngineConfig> {
    let config_file = if let Some(path) = config_path {
        path.to_path_buf()
    } else {
        find_config_file()?
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: EngineConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    validate_config(&config)?;
    Ok(config)
}

fn parse_into<T: std::str::FromStr>(value: &str, target: &mut T) {
    if let Ok(parsed) = value.parse::<T>() {
        *target = parsed;
    }
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `PROCFLOW_HOST` -> `transport.host`
/// - `PROCFLOW_POLL_INTERVAL_MS` -> `transport.poll_interval_ms`
/// - `PROCFLOW_TERMINATE_GRACE_MS` -> `supervisor.terminate_grace_ms`
/// - `PROCFLOW_HANDSHAKE_TIMEOUT_MS` -> `pool.handshake_timeout_ms`
/// - `PROCFLOW_LB_WORKERS` -> `load_balancer.workers`
/// - `PROCFLOW_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut EngineConfig) {
    if let Ok(value) = env::var("PROCFLOW_HOST") {
        config.transport.host = value;
    }
    if let Ok(value) = env::var("PROCFLOW_POLL_INTERVAL_MS") {
        parse_into(&value, &mut config.transport.poll_interval_ms);
    }
    if let Ok(value) = env::var("PROCFLOW_TERMINATE_GRACE_MS") {
        parse_into(&value, &mut config.supervisor.terminate_grace_ms);
    }
    if let Ok(value) = env::var("PROCFLOW_HANDSHAKE_TIMEOUT_MS") {
        parse_into(&value, &mut config.pool.handshake_timeout_ms);
    }
    if let Ok(value) = env::var("PROCFLOW_LB_WORKERS") {
        parse_into(&value, &mut config.load_balancer.workers);
    }
    if let Ok(value) = env::var("PROCFLOW_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of dotted keys, e.g. `{"pool.handshake_timeout_ms": "500"}`
pub fn apply_cli_overrides(config: &mut EngineConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("transport.host") {
        config.transport.host = value.clone();
    }
    if let Some(value) = cli_args.get("transport.send_hwm") {
        parse_into(value, &mut config.transport.send_hwm);
    }
    if let Some(value) = cli_args.get("transport.recv_hwm") {
        parse_into(value, &mut config.transport.recv_hwm);
    }
    if let Some(value) = cli_args.get("transport.worker_send_hwm") {
        parse_into(value, &mut config.transport.worker_send_hwm);
    }
    if let Some(value) = cli_args.get("transport.poll_interval_ms") {
        parse_into(value, &mut config.transport.poll_interval_ms);
    }
    if let Some(value) = cli_args.get("supervisor.terminate_grace_ms") {
        parse_into(value, &mut config.supervisor.terminate_grace_ms);
    }
    if let Some(value) = cli_args.get("pool.handshake_backoff_ms") {
        parse_into(value, &mut config.pool.handshake_backoff_ms);
    }
    if let Some(value) = cli_args.get("pool.handshake_timeout_ms") {
        parse_into(value, &mut config.pool.handshake_timeout_ms);
    }
    if let Some(value) = cli_args.get("load_balancer.workers") {
        parse_into(value, &mut config.load_balancer.workers);
    }
    if let Some(value) = cli_args.get("load_balancer.stop_grace_ms") {
        parse_into(value, &mut config.load_balancer.stop_grace_ms);
    }
    if let Some(value) = cli_args.get("load_balancer.worker_type") {
        config.load_balancer.worker_type = value.clone();
    }
    if let Some(value) = cli_args.get("logging.level") {
        config.logging.level = value.clone();
    }
    if let Some(value) = cli_args.get("logging.file_logging") {
        config.logging.file_logging =
            value.to_lowercase() == "true" || value == "1" || value.to_lowercase() == "yes";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("PROCFLOW_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("PROCFLOW_CONFIG_PATH");

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing_file() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("PROCFLOW_CONFIG_PATH", "/definitely/not/here/procflow.toml");
        let result = find_config_file();
        env::remove_var("PROCFLOW_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::remove_var("PROCFLOW_HOST");
        env::remove_var("PROCFLOW_LB_WORKERS");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("procflow.toml");

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[load_balancer]").unwrap();
        writeln!(file, "workers = 3").unwrap();
        writeln!(file, "[supervisor]").unwrap();
        writeln!(file, "terminate_grace_ms = 500").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.load_balancer.workers, 3);
        assert_eq!(config.supervisor.terminate_grace_ms, 500);
        assert_eq!(config.transport.host, "127.0.0.1");
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("procflow.toml");
        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[pool").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = EngineConfig::default();

        env::set_var("PROCFLOW_HOST", "10.1.1.1");
        env::set_var("PROCFLOW_LB_WORKERS", "7");
        env::set_var("PROCFLOW_TERMINATE_GRACE_MS", "not-a-number");

        apply_environment_overrides(&mut config);

        env::remove_var("PROCFLOW_HOST");
        env::remove_var("PROCFLOW_LB_WORKERS");
        env::remove_var("PROCFLOW_TERMINATE_GRACE_MS");

        assert_eq!(config.transport.host, "10.1.1.1");
        assert_eq!(config.load_balancer.workers, 7);
        // Unparseable values are ignored
        assert_eq!(config.supervisor.terminate_grace_ms, 2000);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = EngineConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("pool.handshake_timeout_ms".to_string(), "750".to_string());
        cli_args.insert("logging.level".to_string(), "debug".to_string());
        cli_args.insert("logging.file_logging".to_string(), "yes".to_string());

        apply_cli_overrides(&mut config, &cli_args);

        assert_eq!(config.pool.handshake_timeout_ms, 750);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.file_logging);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("procflow.toml");

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[transport]").unwrap();
        writeln!(file, "host = \"file-host\"").unwrap();
        writeln!(file, "[load_balancer]").unwrap();
        writeln!(file, "workers = 2").unwrap();

        env::set_var("PROCFLOW_HOST", "env-host");
        env::set_var("PROCFLOW_LB_WORKERS", "5");

        let mut cli_args = HashMap::new();
        cli_args.insert("transport.host".to_string(), "cli-host".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("PROCFLOW_HOST");
        env::remove_var("PROCFLOW_LB_WORKERS");

        // CLI wins for host, env wins for workers (no CLI override)
        assert_eq!(config.transport.host, "cli-host");
        assert_eq!(config.load_balancer.workers, 5);
    }
}
