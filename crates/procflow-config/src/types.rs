// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `procflow.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub transport: TransportSettings,
    pub supervisor: SupervisorConfig,
    pub pool: PoolConfig,
    pub load_balancer: LoadBalancerConfig,
    pub logging: LoggingConfig,
}

/// Channel endpoint settings shared by every manager and worker
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Interface every endpoint binds to (ports are always OS-assigned)
    pub host: String,
    pub send_hwm: u32,
    pub recv_hwm: u32,
    /// Outstanding-message limit for the daemon ventilator and worker result senders
    pub worker_send_hwm: u32,
    /// Reactor poll timeout
    pub poll_interval_ms: u64,
    /// How long a closing worker socket keeps flushing its last acknowledgments
    pub linger_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            send_hwm: 1000,
            recv_hwm: 1000,
            worker_send_hwm: 10,
            poll_interval_ms: 100,
            linger_ms: 1000,
        }
    }
}

impl TransportSettings {
    /// Wildcard bind address on the configured host, e.g. `tcp://127.0.0.1:*`
    pub fn bind_address(&self) -> String {
        format!("tcp://{}:*", self.host)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

/// Process supervisor settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long terminated workers get to exit before they are killed
    pub terminate_grace_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            terminate_grace_ms: 2000,
        }
    }
}

impl SupervisorConfig {
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

/// Worker-pool startup synchronization settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    pub handshake_backoff_ms: u64,
    pub handshake_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            handshake_backoff_ms: 10,
            handshake_timeout_ms: 30_000,
        }
    }
}

impl PoolConfig {
    pub fn handshake_backoff(&self) -> Duration {
        Duration::from_millis(self.handshake_backoff_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// LRU load balancer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub workers: usize,
    /// Upper bound on waiting for stop acknowledgments once termination starts
    pub stop_grace_ms: u64,
    /// Prefix of the socket identity each pool worker uses
    pub worker_type: String,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            stop_grace_ms: 3000,
            worker_type: "Worker".to_string(),
        }
    }
}

impl LoadBalancerConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    pub file_logging: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [pool]
            handshake_timeout_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.pool.handshake_timeout_ms, 500);
        assert_eq!(config.pool.handshake_backoff_ms, 10);
        assert_eq!(config.transport.worker_send_hwm, 10);
        assert_eq!(config.load_balancer.worker_type, "Worker");
    }

    #[test]
    fn test_bind_address() {
        let settings = TransportSettings::default();
        assert_eq!(settings.bind_address(), "tcp://127.0.0.1:*");
    }

    #[test]
    fn test_json_roundtrip_of_sections() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.supervisor.terminate_grace_ms, 2000);
    }
}
