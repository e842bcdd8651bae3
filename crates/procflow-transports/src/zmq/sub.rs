// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ SUB endpoint
//!
//! Pool workers subscribe to their worker id; the log collector subscribes to
//! everything and attaches to publishers as they announce themselves.

use tracing::debug;

use super::socket::SocketCore;
use crate::common::{TransportError, TransportResult};
use crate::traits::Subscriber;

/// ZMQ SUB socket implementation (subscriber)
pub struct ZmqSub {
    core: SocketCore,
}

zmq_endpoint!(ZmqSub, ::zmq::SUB, "SUB", "zmq-sub");
zmq_envelope_receiver!(ZmqSub);

impl Subscriber for ZmqSub {
    fn subscribe(&self, prefix: &[u8]) -> TransportResult<()> {
        self.core.with_socket(|socket| Ok(socket.set_subscribe(prefix)?))
    }

    fn unsubscribe(&self, prefix: &[u8]) -> TransportResult<()> {
        self.core.with_socket(|socket| Ok(socket.set_unsubscribe(prefix)?))
    }

    fn connect_to(&self, address: &str) -> TransportResult<()> {
        self.core.with_socket(|socket| {
            socket
                .connect(address)
                .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", address, e)))?;
            debug!("🦀 [ZMQ-SUB] Connected to {}", address);
            Ok(())
        })
    }

    fn disconnect_from(&self, address: &str) -> TransportResult<()> {
        self.core.with_socket(|socket| {
            socket
                .disconnect(address)
                .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", address, e)))?;
            debug!("🦀 [ZMQ-SUB] Disconnected from {}", address);
            Ok(())
        })
    }
}
