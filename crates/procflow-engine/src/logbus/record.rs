// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Log wire types

use serde::{Deserialize, Serialize};

/// One worker log event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// `TRACE` .. `ERROR`
    pub level: String,
    /// Which process emitted it, e.g. `demo-worker-3`
    pub component: String,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

impl LogRecord {
    pub fn new(level: impl Into<String>, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            component: component.into(),
            message: message.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Publisher registration traffic on the collector's info channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "address", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogControl {
    Connect(String),
    Disconnect(String),
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_json() {
        let json = serde_json::to_string(&LogControl::Connect("tcp://127.0.0.1:4100".into())).unwrap();
        assert_eq!(json, r#"{"op":"CONNECT","address":"tcp://127.0.0.1:4100"}"#);
        assert_eq!(
            serde_json::from_str::<LogControl>(r#"{"op":"STOP"}"#).unwrap(),
            LogControl::Stop
        );
    }

    #[test]
    fn test_record_timestamp() {
        let record = LogRecord::new("INFO", "worker-1", "hello");
        assert!(record.timestamp_ms > 0);
    }
}
