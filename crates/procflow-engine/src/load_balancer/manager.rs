// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Running the balancer as its own process
//!
//! The controller side binds a REQ and a PUSH endpoint and launches the
//! balancer binary. The balancer connects back, receives the worker count,
//! starts its pool and replies with its frontend address. STOP travels on
//! the PUSH channel.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

use procflow_config::EngineConfig;
use procflow_transports::prelude::*;

use super::LoadBalancer;
use crate::error::{EngineError, EngineResult};
use crate::supervisor::{Supervisor, TerminationReport, WorkerCommand};

const BALANCER_ID: WorkerId = 0;

fn endpoint<T: Transport>(transport: &T) -> EngineResult<String> {
    transport
        .endpoint()
        .ok_or(EngineError::Transport(TransportError::NotRunning))
}

/// Command line of the balancer process
#[derive(Debug, Clone, Parser)]
#[command(name = "procflow-balancer", about = "procflow LRU load balancer")]
pub struct BalancerArgs {
    /// Manager's request endpoint (worker count in, frontend address out)
    #[arg(long)]
    pub receive: String,

    /// Result sink the workers send to
    #[arg(long)]
    pub send: String,

    /// Manager's control endpoint
    #[arg(long)]
    pub controller: String,

    /// Log collector address, passed on to workers
    #[arg(long)]
    pub logging: Option<String>,

    /// Worker program
    #[arg(long)]
    pub worker: PathBuf,

    /// Extra argument for every worker (repeatable)
    #[arg(long = "worker-arg", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,
}

/// Body of the balancer binary
pub fn run_balancer_process(args: BalancerArgs, config: EngineConfig) -> EngineResult<TerminationReport> {
    let context = Arc::new(zmq::Context::new());
    let handshake_timeout = config.pool.handshake_timeout();

    let mut balancer = LoadBalancer::new(
        Arc::clone(&context),
        config,
        WorkerCommand::new(args.worker).args(args.worker_args),
        args.send,
        TransportConfig::connect(args.controller),
        args.logging,
    )?;

    let mut manager = ZmqRep::new(context, TransportConfig::connect(args.receive))?;
    manager.start()?;

    let request = manager
        .recv_request_timeout(handshake_timeout)
        .map_err(|e| match e {
            TransportError::Timeout => EngineError::HandshakeTimeout("balancer worker count".to_string()),
            other => other.into(),
        })?;
    let workers: usize = request.decode()?;

    balancer.start_workers(workers)?;
    manager.reply(&Envelope::json(None, &balancer.frontend_endpoint()?)?)?;

    balancer.run()
}

/// Controller-side handle of a balancer process
pub struct LoadBalancerManager {
    config: EngineConfig,
    supervisor: Supervisor,
    controller: ZmqPush,
    requester: ZmqReq,
    balancer_program: WorkerCommand,
    sink_endpoint: String,
    log_endpoint: Option<String>,
    frontend: Option<String>,
}

impl LoadBalancerManager {
    /// `balancer_program` is the balancer binary with its `--worker` options
    pub fn new(
        config: EngineConfig,
        balancer_program: WorkerCommand,
        sink_endpoint: impl Into<String>,
        log_endpoint: Option<String>,
    ) -> EngineResult<Self> {
        let context = Arc::new(zmq::Context::new());
        let bind = config.transport.bind_address();

        let mut controller = ZmqPush::new(Arc::clone(&context), TransportConfig::bind(bind.clone()))?;
        controller.start()?;
        let mut requester = ZmqReq::new(context, TransportConfig::bind(bind))?;
        requester.start()?;

        Ok(Self {
            supervisor: Supervisor::new("balancer-manager", config.supervisor.terminate_grace()),
            config,
            controller,
            requester,
            balancer_program,
            sink_endpoint: sink_endpoint.into(),
            log_endpoint,
            frontend: None,
        })
    }

    /// Launch the balancer with `workers` workers; returns its frontend address
    pub fn start(&mut self, workers: usize) -> EngineResult<String> {
        if let Some(frontend) = &self.frontend {
            return Ok(frontend.clone());
        }

        let mut command = self
            .balancer_program
            .clone()
            .flag("--receive", endpoint(&self.requester)?)
            .flag("--send", self.sink_endpoint.clone())
            .flag("--controller", endpoint(&self.controller)?);
        if let Some(logging) = &self.log_endpoint {
            command = command.flag("--logging", logging.clone());
        }
        self.supervisor.spawn_or_abort(BALANCER_ID, &command);

        let reply = self
            .requester
            .request_timeout(&Envelope::json(None, &workers)?, self.config.pool.handshake_timeout())
            .map_err(|e| match e {
                TransportError::Timeout => EngineError::HandshakeTimeout("balancer frontend address".to_string()),
                other => other.into(),
            })?;
        let frontend: String = reply.decode()?;

        info!("🦀 [LRU] Balancer with {} worker(s) accepting requests on {}", workers, frontend);
        self.frontend = Some(frontend.clone());
        Ok(frontend)
    }

    pub fn frontend_endpoint(&self) -> Option<&str> {
        self.frontend.as_deref()
    }

    /// Ask the balancer to stop its workers and exit
    pub fn stop(&self) -> EngineResult<()> {
        self.controller
            .send_envelope(&Envelope::command(None, Command::Stop))?;
        Ok(())
    }

    pub fn is_running(&mut self) -> bool {
        self.supervisor.is_alive(BALANCER_ID)
    }

    /// Wait for the balancer process to exit; kills it after `timeout`.
    /// Returns `true` when it exited on its own.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.supervisor.is_alive(BALANCER_ID) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let exited = !self.supervisor.is_alive(BALANCER_ID);
        self.supervisor.reap(BALANCER_ID, Duration::ZERO);
        exited
    }
}
