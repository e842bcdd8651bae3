// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # procflow - Multi-process worker orchestration
//!
//! procflow runs application work in separate worker processes and talks to
//! them over ZeroMQ channels. A controller picks one of three dispatch models:
//!
//! - **Single daemon**: one long-lived worker fed a serial record stream
//! - **Pool broadcast**: workers started on demand, addressed by id, with
//!   pause / resume / stop and a synchronized startup
//! - **LRU load balancer**: interchangeable workers behind a balancer process,
//!   each request going to the least recently used idle worker
//!
//! Worker results stream back to a result sink; worker logs can be
//! aggregated into the controller's log stream.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! procflow = "0.1"  # Default: engine
//! ```
//!
//! ```rust,no_run
//! use procflow::prelude::*;
//!
//! let config = EngineConfig::default();
//! let (sink, events, reactor) = ResultSink::spawn(
//!     config,
//!     Box::new(SingleDaemon::new()),
//!     WorkerCommand::new("my-worker"),
//! )?;
//!
//! sink.start()?;
//! sink.send_to_worker(None, b"record".to_vec())?;
//! if let Ok(SinkEvent::Result { record, .. }) = events.recv() {
//!     println!("{} bytes back", record.len());
//! }
//! sink.stop()?;
//! reactor.join().ok();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Feature Flags
//!
//! - **`engine`** (default): supervisor, managers, sink, load balancer, log bus
//! - **`file-logging`**: rotating log files in addition to the console
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: procflow-config, procflow-observability    │
//! │  (TOML + env overrides, tracing setup)                  │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  I/O: procflow-transports                               │
//! │  (ZMQ endpoints, [worker_id, tag, body] envelopes)      │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Orchestration: procflow-engine                         │
//! │  (supervisor, sink, managers, balancer, worker agent)   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

// Re-export foundation
pub use procflow_config as config;
pub use procflow_observability as observability;

// Re-export I/O layer
pub use procflow_transports as transports;

// Re-export orchestration
#[cfg(feature = "engine")]
pub use procflow_engine as engine;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::config::{load_config, EngineConfig};
    pub use crate::transports::{Command, Envelope, WorkerId};

    #[cfg(feature = "engine")]
    pub use crate::engine::{
        AgentArgs, AgentContext, AgentMode, DispatchStrategy, Directive, LoadBalancerManager,
        LogCollector, PoolBroadcast, ResultSink, SinkEvent, SinkHandle, SingleDaemon,
        StopRequested, WorkOutcome, WorkerAgent, WorkerCommand, WorkerTask,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
