// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Endpoint configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{TransportError, TransportResult};

/// Whether an endpoint owns its address or attaches to a peer's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointMode {
    Bind,
    Connect,
}

/// Generic endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Address to bind or connect; empty for a connect-mode endpoint that
    /// attaches to peers later (see `Subscriber::connect_to`)
    pub address: String,

    pub mode: EndpointMode,

    /// High water mark for send buffer (0 = unlimited)
    pub send_hwm: u32,

    /// High water mark for receive buffer (0 = unlimited)
    pub recv_hwm: u32,

    /// Linger time on close (None = immediate)
    pub linger: Option<Duration>,

    /// Socket identity, used by REQ workers behind a ROUTER
    pub identity: Option<Vec<u8>>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            address: "tcp://127.0.0.1:*".to_string(),
            mode: EndpointMode::Bind,
            send_hwm: 1000,
            recv_hwm: 1000,
            linger: None,
            identity: None,
        }
    }
}

impl TransportConfig {
    /// Endpoint that binds `address` (wildcard ports allowed)
    pub fn bind(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            mode: EndpointMode::Bind,
            ..Default::default()
        }
    }

    /// Endpoint that connects to `address`
    pub fn connect(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            mode: EndpointMode::Connect,
            ..Default::default()
        }
    }

    /// Connect-mode endpoint with no initial peer
    pub fn detached() -> Self {
        Self::connect(String::new())
    }

    pub fn with_send_hwm(mut self, hwm: u32) -> Self {
        self.send_hwm = hwm;
        self
    }

    pub fn with_recv_hwm(mut self, hwm: u32) -> Self {
        self.recv_hwm = hwm;
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = Some(linger);
        self
    }

    pub fn with_identity(mut self, identity: impl Into<Vec<u8>>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> TransportResult<()> {
        if self.mode == EndpointMode::Bind && self.address.is_empty() {
            return Err(TransportError::InvalidConfig(
                "Bind address cannot be empty".to_string(),
            ));
        }

        if !self.address.is_empty() && !self.address.contains("://") {
            return Err(TransportError::InvalidConfig(format!(
                "Address '{}' has no transport scheme",
                self.address
            )));
        }

        if let Some(identity) = &self.identity {
            // ZMQ reserves identities starting with a zero byte
            if identity.is_empty() || identity.len() > 255 || identity[0] == 0 {
                return Err(TransportError::InvalidConfig(
                    "Identity must be 1-255 bytes and not start with 0x00".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_requires_address() {
        assert!(TransportConfig::bind("").validate().is_err());
        assert!(TransportConfig::bind("tcp://127.0.0.1:*").validate().is_ok());
    }

    #[test]
    fn test_detached_is_valid() {
        let config = TransportConfig::detached();
        assert_eq!(config.mode, EndpointMode::Connect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheme_required() {
        assert!(TransportConfig::connect("127.0.0.1:5555").validate().is_err());
    }

    #[test]
    fn test_identity_rules() {
        let ok = TransportConfig::connect("tcp://127.0.0.1:1").with_identity("Worker-1");
        assert!(ok.validate().is_ok());

        let bad = TransportConfig::connect("tcp://127.0.0.1:1").with_identity(vec![0u8, 1]);
        assert!(bad.validate().is_err());
    }
}
