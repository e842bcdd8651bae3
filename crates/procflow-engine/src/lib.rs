// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # procflow-engine
//!
//! Orchestrates pools of worker processes over ZeroMQ channels.
//!
//! ## Controller side
//!
//! - [`sink::ResultSink`] runs one reactor thread per manager, collecting
//!   results and driving a [`manager::Manager`] from directives sent through
//!   its [`sink::SinkHandle`]
//! - [`manager::SingleDaemon`] streams records to one worker;
//!   [`manager::PoolBroadcast`] addresses a pool of workers by id
//! - [`load_balancer`] dispatches requests to the least recently used idle
//!   worker, running in its own process
//! - [`logbus::LogCollector`] aggregates worker logs
//!
//! ## Worker side
//!
//! A worker binary flattens [`agent::AgentArgs`] into its CLI, connects a
//! [`agent::WorkerAgent`] and implements [`agent::WorkerTask`].
//!
//! ```no_run
//! use procflow_engine::manager::PoolBroadcast;
//! use procflow_engine::sink::{ResultSink, SinkEvent};
//! use procflow_engine::supervisor::WorkerCommand;
//!
//! let config = procflow_config::EngineConfig::default();
//! let (sink, events, reactor) = ResultSink::spawn(
//!     config,
//!     Box::new(PoolBroadcast::new()),
//!     WorkerCommand::new("my-worker"),
//! )?;
//!
//! sink.start_worker(1, b"first record".to_vec())?;
//! sink.stop()?;
//! while let Ok(event) = events.recv() {
//!     if event == SinkEvent::Terminated {
//!         break;
//!     }
//! }
//! reactor.join().ok();
//! # Ok::<(), procflow_engine::error::EngineError>(())
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod agent;
pub mod error;
pub mod load_balancer;
pub mod logbus;
pub mod manager;
pub mod protocol;
pub mod sink;
pub mod supervisor;

pub use agent::{AgentArgs, AgentContext, AgentExit, AgentMode, StopRequested, WorkOutcome, WorkerAgent, WorkerTask};
pub use error::{EngineError, EngineResult};
pub use load_balancer::{LoadBalancer, LoadBalancerManager};
pub use logbus::{LogCollector, LogCollectorHandle};
pub use manager::{DispatchStrategy, PoolBroadcast, SingleDaemon};
pub use protocol::{Directive, Record, WorkerLifecycleState};
pub use sink::{ResultSink, SinkEvent, SinkHandle};
pub use supervisor::{Supervisor, TerminationReport, WorkerCommand};

pub use procflow_transports::WorkerId;
