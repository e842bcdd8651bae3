// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Worker-side log publisher

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use procflow_config::TransportSettings;
use procflow_transports::prelude::*;

use super::record::{LogControl, LogRecord};
use crate::error::{EngineError, EngineResult};

/// A PUB endpoint on an ephemeral port, announced to the collector
///
/// Records are published without blocking; when nobody is subscribed, or the
/// collector falls behind, they are dropped.
pub struct LogPublisher {
    publisher: ZmqPub,
    notifier: ZmqPush,
    address: String,
    closed: AtomicBool,
}

impl LogPublisher {
    /// Bind the publisher and send `CONNECT <address>` to `collector`
    pub fn new(context: Arc<zmq::Context>, collector: &str, transport: &TransportSettings) -> EngineResult<Self> {
        let mut publisher = ZmqPub::new(
            Arc::clone(&context),
            TransportConfig::bind(transport.bind_address()).with_send_hwm(transport.send_hwm),
        )?;
        publisher.start()?;
        let address = publisher
            .endpoint()
            .ok_or(EngineError::Transport(TransportError::NotRunning))?;

        let mut notifier = ZmqPush::new(
            context,
            TransportConfig::connect(collector).with_linger(transport.linger()),
        )?;
        notifier.start()?;
        notifier.send_envelope(&Envelope::json(None, &LogControl::Connect(address.clone()))?)?;

        Ok(Self {
            publisher,
            notifier,
            address,
            closed: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn publish(&self, record: &LogRecord) -> EngineResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.publisher.try_send_envelope(&Envelope::json(None, record)?)?;
        Ok(())
    }

    /// Send `DISCONNECT <address>`; later calls do nothing
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(envelope) = Envelope::json(None, &LogControl::Disconnect(self.address.clone())) {
            let _ = self.notifier.send_envelope(&envelope);
        }
    }
}

impl Drop for LogPublisher {
    fn drop(&mut self) {
        self.close();
    }
}
