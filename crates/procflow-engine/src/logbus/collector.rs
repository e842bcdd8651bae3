// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Controller-side log collector

use crossbeam::channel::Sender;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use procflow_config::EngineConfig;
use procflow_transports::prelude::*;

use super::record::{LogControl, LogRecord};
use crate::error::{EngineError, EngineResult};

pub struct LogCollector;

impl LogCollector {
    /// Bind the info channel and start collecting on a background thread
    ///
    /// Every record is re-emitted through `tracing` under the
    /// `procflow::worker` target and, when `forward` is set, also sent there.
    pub fn spawn(config: &EngineConfig, forward: Option<Sender<LogRecord>>) -> EngineResult<LogCollectorHandle> {
        let context = Arc::new(zmq::Context::new());
        let transport = &config.transport;

        let mut info = ZmqPull::new(Arc::clone(&context), TransportConfig::bind(transport.bind_address()))?;
        info.start()?;
        let info_endpoint = info
            .endpoint()
            .ok_or(EngineError::Transport(TransportError::NotRunning))?;

        let mut records = ZmqSub::new(
            Arc::clone(&context),
            TransportConfig::detached().with_recv_hwm(transport.recv_hwm),
        )?;
        records.start()?;
        records.subscribe(b"")?;

        let mut stopper = ZmqPush::new(context, TransportConfig::connect(info_endpoint.clone()))?;
        stopper.start()?;

        let poll_interval = transport.poll_interval();
        let thread = thread::Builder::new()
            .name("procflow-log-collector".to_string())
            .spawn(move || {
                let mut collector = Collector {
                    records,
                    info,
                    forward,
                    publishers: HashSet::new(),
                };
                collector.run(poll_interval);
            })?;

        info!("🦀 [LOGS] Collecting worker logs; publishers announce on {}", info_endpoint);
        Ok(LogCollectorHandle {
            info_endpoint,
            stopper,
            thread: Some(thread),
        })
    }
}

/// Owner of the collector thread; dropping it stops the thread
pub struct LogCollectorHandle {
    info_endpoint: String,
    stopper: ZmqPush,
    thread: Option<JoinHandle<()>>,
}

impl LogCollectorHandle {
    /// Address workers pass as `--logging`
    pub fn info_endpoint(&self) -> &str {
        &self.info_endpoint
    }

    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        match Envelope::json(None, &LogControl::Stop) {
            Ok(envelope) => {
                if let Err(e) = self.stopper.send_envelope(&envelope) {
                    error!("🦀 [LOGS] Failed to stop collector: {}", e);
                    return;
                }
            }
            Err(e) => {
                error!("🦀 [LOGS] Failed to encode stop: {}", e);
                return;
            }
        }
        let _ = thread.join();
    }
}

impl Drop for LogCollectorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Collector {
    records: ZmqSub,
    info: ZmqPull,
    forward: Option<Sender<LogRecord>>,
    /// Publisher addresses currently subscribed to
    publishers: HashSet<String>,
}

impl Collector {
    fn run(&mut self, poll_interval: std::time::Duration) {
        debug!("🦀 [LOGS] Collector started");
        loop {
            let ready = match poll_readable(
                &[&self.records as &dyn Pollable, &self.info],
                Some(poll_interval),
            ) {
                Ok(ready) => ready,
                Err(e) => {
                    error!("🦀 [LOGS] Poll failed: {}", e);
                    break;
                }
            };
            if ready[0] {
                self.drain_records();
            }
            if ready[1] && !self.drain_info() {
                break;
            }
        }
        debug!("🦀 [LOGS] Collector stopped");
    }

    fn drain_records(&mut self) {
        loop {
            let record = match self.records.try_recv_envelope() {
                Ok(Some(envelope)) => envelope.decode::<LogRecord>(),
                Ok(None) => return,
                Err(e) => {
                    error!("🦀 [LOGS] Receive failed: {}", e);
                    return;
                }
            };
            match record {
                Ok(record) => self.emit(record),
                Err(e) => warn!("🦀 [LOGS] Malformed log record: {}", e),
            }
        }
    }

    /// Returns `false` on STOP
    fn drain_info(&mut self) -> bool {
        loop {
            let control = match self.info.try_recv_envelope() {
                Ok(Some(envelope)) => envelope.decode::<LogControl>(),
                Ok(None) => return true,
                Err(e) => {
                    error!("🦀 [LOGS] Info receive failed: {}", e);
                    return true;
                }
            };
            match control {
                Ok(LogControl::Stop) => return false,
                Ok(LogControl::Connect(address)) => self.connect(address),
                Ok(LogControl::Disconnect(address)) => self.disconnect(&address),
                Err(e) => warn!("🦀 [LOGS] Malformed info message: {}", e),
            }
        }
    }

    fn connect(&mut self, address: String) {
        if self.publishers.contains(&address) {
            return;
        }
        match self.records.connect_to(&address) {
            Ok(()) => {
                debug!("🦀 [LOGS] Subscribed to {}", address);
                self.publishers.insert(address);
            }
            Err(e) => error!("🦀 [LOGS] Cannot subscribe to {}: {}", address, e),
        }
    }

    fn disconnect(&mut self, address: &str) {
        if !self.publishers.remove(address) {
            return;
        }
        if let Err(e) = self.records.disconnect_from(address) {
            debug!("🦀 [LOGS] Disconnect from {} failed: {}", address, e);
        }
    }

    fn emit(&self, record: LogRecord) {
        let component = record.component.as_str();
        let message = record.message.as_str();
        match record.level.as_str() {
            "ERROR" => error!(target: "procflow::worker", component, "{}", message),
            "WARN" => warn!(target: "procflow::worker", component, "{}", message),
            "INFO" => info!(target: "procflow::worker", component, "{}", message),
            "DEBUG" => debug!(target: "procflow::worker", component, "{}", message),
            _ => trace!(target: "procflow::worker", component, "{}", message),
        }
        if let Some(forward) = &self.forward {
            let _ = forward.send(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logbus::LogPublisher;
    use crossbeam::channel;
    use std::time::{Duration, Instant};

    #[test]
    fn test_publisher_records_reach_collector() {
        let config = EngineConfig::default();
        let (tx, rx) = channel::unbounded();
        let mut handle = LogCollector::spawn(&config, Some(tx)).unwrap();

        let context = Arc::new(zmq::Context::new());
        let publisher = LogPublisher::new(context, handle.info_endpoint(), &config.transport).unwrap();

        // Records published before the subscription is live are dropped
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut received = None;
        while received.is_none() && Instant::now() < deadline {
            publisher
                .publish(&LogRecord::new("WARN", "unit-worker", "disk almost full"))
                .unwrap();
            received = rx.recv_timeout(Duration::from_millis(50)).ok();
        }

        let record = received.unwrap();
        assert_eq!(record.component, "unit-worker");
        assert_eq!(record.level, "WARN");
        assert_eq!(record.message, "disk almost full");

        publisher.close();
        handle.stop();
    }

    #[test]
    fn test_duplicate_connect_and_unknown_disconnect_are_ignored() {
        let context = Arc::new(zmq::Context::new());
        let mut records = ZmqSub::new(Arc::clone(&context), TransportConfig::detached()).unwrap();
        records.start().unwrap();
        let mut info = ZmqPull::new(context, TransportConfig::bind("inproc://collector-test")).unwrap();
        info.start().unwrap();

        let mut collector = Collector {
            records,
            info,
            forward: None,
            publishers: HashSet::new(),
        };
        collector.connect("tcp://127.0.0.1:45999".to_string());
        collector.connect("tcp://127.0.0.1:45999".to_string());
        assert_eq!(collector.publishers.len(), 1);

        collector.disconnect("tcp://127.0.0.1:1");
        assert_eq!(collector.publishers.len(), 1);

        collector.disconnect("tcp://127.0.0.1:45999");
        assert!(collector.publishers.is_empty());
    }
}
