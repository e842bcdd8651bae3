// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Common error types for all endpoints

use thiserror::Error;

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Operation timed out")]
    Timeout,

    /// A non-blocking operation could not complete now
    #[error("Operation would block")]
    WouldBlock,

    #[error("Transport is not running")]
    NotRunning,

    #[error("Transport is already running")]
    AlreadyRunning,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("ZMQ error: {0}")]
    Zmq(zmq::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TransportError {
    /// Normal "nothing yet" conditions of timed or non-blocking calls
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Timeout | Self::WouldBlock)
    }
}

impl From<zmq::Error> for TransportError {
    fn from(err: zmq::Error) -> Self {
        match err {
            zmq::Error::EAGAIN => Self::WouldBlock,
            _ => Self::Zmq(err),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
