// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! LRU load balancer
//!
//! Stateless request dispatch over a fixed pool of interchangeable workers:
//!
//! ```text
//!  requesters ─► PULL frontend ─┐                 ┌─► REQ worker 0 ─┐
//!                               ├─ LRU ─► ROUTER ─┼─► REQ worker 1 ─┼─► PUSH ─► result sink
//!  manager ───► PULL controller ┘                 └─► REQ worker n ─┘
//! ```
//!
//! Workers announce READY on connect and after every request; the frontend
//! is only read while some worker is idle. STOP on the controller stops idle
//! workers at once and busy ones when they next reply. The reactor halts when
//! every worker acknowledged, or when the stop grace expires. Workers found
//! dead on an idle poll are logged and dropped from the queue.

mod lru;
mod manager;

pub use lru::{LruQueue, ReplyAction};
pub use manager::{run_balancer_process, BalancerArgs, LoadBalancerManager};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use procflow_config::EngineConfig;
use procflow_transports::prelude::*;

use crate::agent::AgentArgs;
use crate::error::{EngineError, EngineResult};
use crate::supervisor::{Supervisor, TerminationReport, WorkerCommand};

pub struct LoadBalancer {
    config: EngineConfig,
    frontend: ZmqPull,
    backend: ZmqRouter,
    controller: ZmqPull,
    queue: LruQueue,
    supervisor: Supervisor,
    worker_program: WorkerCommand,
    sink_endpoint: String,
    log_endpoint: Option<String>,
}

impl LoadBalancer {
    /// Bind frontend and backend; `controller` is where STOP will arrive from
    pub fn new(
        context: Arc<zmq::Context>,
        config: EngineConfig,
        worker_program: WorkerCommand,
        sink_endpoint: String,
        controller: TransportConfig,
        log_endpoint: Option<String>,
    ) -> EngineResult<Self> {
        let transport = &config.transport;

        let mut frontend = ZmqPull::new(
            Arc::clone(&context),
            TransportConfig::bind(transport.bind_address()).with_recv_hwm(transport.recv_hwm),
        )?;
        frontend.start()?;
        let mut backend = ZmqRouter::new(Arc::clone(&context), TransportConfig::bind(transport.bind_address()))?;
        backend.start()?;
        let mut controller = ZmqPull::new(context, controller)?;
        controller.start()?;

        Ok(Self {
            supervisor: Supervisor::new("load-balancer", config.supervisor.terminate_grace()),
            config,
            frontend,
            backend,
            controller,
            queue: LruQueue::new(),
            worker_program,
            sink_endpoint,
            log_endpoint,
        })
    }

    pub fn frontend_endpoint(&self) -> EngineResult<String> {
        self.frontend
            .endpoint()
            .ok_or(EngineError::Transport(TransportError::NotRunning))
    }

    pub fn controller_endpoint(&self) -> Option<String> {
        self.controller.endpoint()
    }

    /// Launch workers `0..count` against the backend
    pub fn start_workers(&mut self, count: usize) -> EngineResult<()> {
        let backend = self
            .backend
            .endpoint()
            .ok_or(EngineError::Transport(TransportError::NotRunning))?;

        for worker_id in 0..count as WorkerId {
            let args = AgentArgs {
                request: Some(backend.clone()),
                send: Some(self.sink_endpoint.clone()),
                identity: Some(worker_id),
                worker_type: Some(self.config.load_balancer.worker_type.clone()),
                logging: self.log_endpoint.clone(),
                ..Default::default()
            };
            self.supervisor
                .spawn_or_abort(worker_id, &args.apply(self.worker_program.clone()));
        }
        info!("🦀 [LRU] Started {} worker(s) behind {}", count, backend);
        Ok(())
    }

    /// Dispatch until shutdown, then terminate the pool
    pub fn run(mut self) -> EngineResult<TerminationReport> {
        let poll_interval = self.config.transport.poll_interval();
        let stop_grace = self.config.load_balancer.stop_grace();
        let mut stop_deadline: Option<Instant> = None;

        loop {
            let ready = if self.queue.accepting() {
                poll_readable(
                    &[&self.backend as &dyn Pollable, &self.controller, &self.frontend],
                    Some(poll_interval),
                )?
            } else {
                poll_readable(&[&self.backend as &dyn Pollable, &self.controller], Some(poll_interval))?
            };

            if ready[0] {
                self.drain_backend()?;
            }
            if ready[1] && self.drain_controller()? && stop_deadline.is_none() {
                stop_deadline = Some(Instant::now() + stop_grace);
            }
            if ready.get(2).copied().unwrap_or(false) {
                self.drain_frontend()?;
            }
            if !ready.contains(&true) {
                self.sweep_exited_workers();
            }

            if self.queue.all_stopped() {
                info!("🦀 [LRU] All workers stopped");
                break;
            }
            if stop_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(
                    "🦀 [LRU] Stop grace of {:?} expired with {} worker(s) unacknowledged",
                    stop_grace,
                    self.supervisor.len().saturating_sub(self.queue.stopped().len())
                );
                break;
            }
        }

        let report = self
            .supervisor
            .force_terminate_all(self.config.supervisor.terminate_grace());
        debug!("🦀 [LRU] Pool cleanup: {:?}", report);
        Ok(report)
    }

    /// Log and forget workers that exited without acknowledging STOP
    ///
    /// They are not restarted; the pool keeps serving with the survivors.
    fn sweep_exited_workers(&mut self) {
        for worker_id in self.supervisor.exited_workers() {
            let identity = create_identity(&self.config.load_balancer.worker_type, worker_id);
            if self.queue.forget(&identity) {
                warn!("🦀 [LRU] Worker {} exited while busy; its request is lost", worker_id);
            } else {
                warn!("🦀 [LRU] Worker {} exited unexpectedly", worker_id);
            }
            self.supervisor.reap(worker_id, Duration::ZERO);
        }
    }

    fn drain_backend(&mut self) -> EngineResult<()> {
        loop {
            let (identity, reply) = match self.backend.try_recv_routed() {
                Ok(Some(routed)) => routed,
                Ok(None) => return Ok(()),
                Err(TransportError::InvalidMessage(e)) => {
                    error!("🦀 [LRU] Protocol violation on backend: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match self.queue.on_worker_reply(identity, &reply) {
                ReplyAction::Idle => {}
                ReplyAction::SendStop(identity) => {
                    self.backend
                        .send_routed(&identity, &Envelope::command(None, Command::Stop))?;
                }
                ReplyAction::Stopped(Some(worker_id)) => {
                    self.supervisor
                        .reap(worker_id, self.config.supervisor.terminate_grace());
                }
                ReplyAction::Stopped(None) => {}
            }
        }
    }

    /// Returns `true` when STOP was received
    fn drain_controller(&mut self) -> EngineResult<bool> {
        let mut stop = false;
        while let Some(envelope) = self.controller.try_recv_envelope()? {
            if !envelope.is_command(Command::Stop) {
                error!("🦀 [LRU] Protocol violation on controller: {:?}", envelope.payload);
                continue;
            }
            if self.queue.is_terminating() {
                continue;
            }
            let idle = self.queue.begin_termination();
            info!("🦀 [LRU] Stopping; {} idle worker(s) stop now", idle.len());
            for identity in idle {
                self.backend
                    .send_routed(&identity, &Envelope::command(None, Command::Stop))?;
            }
            stop = true;
        }
        Ok(stop)
    }

    fn drain_frontend(&mut self) -> EngineResult<()> {
        while self.queue.accepting() {
            let request = match self.frontend.try_recv_envelope() {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(TransportError::InvalidMessage(e)) => {
                    error!("🦀 [LRU] Malformed request: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(identity) = self.queue.dispatch() {
                self.backend.send_routed(&identity, &request)?;
            }
        }
        Ok(())
    }
}
