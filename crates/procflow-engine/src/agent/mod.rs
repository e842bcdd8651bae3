// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Worker Agent
//!
//! The worker-process side of every protocol. A worker binary parses
//! [`AgentArgs`], connects a [`WorkerAgent`] in one of three modes and hands it
//! a [`WorkerTask`]:
//!
//! - **Daemon**: serial stream of records from a PULL ventilator
//! - **Pool**: START / sync handshake, then records and pause/resume/stop on
//!   SUB channels filtered by worker id
//! - **LoadBalanced**: REQ socket behind the balancer's ROUTER; each reply
//!   announces the worker is idle again
//!
//! [`WorkerAgent::run`] returns once the worker stopped or finished; the
//! binary then exits normally.

mod args;
mod context;

pub use args::AgentArgs;
pub use context::{AgentContext, StopRequested};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use procflow_config::{apply_environment_overrides, EngineConfig};
use procflow_transports::prelude::*;

use crate::error::{EngineError, EngineResult};
use crate::protocol::{Record, WorkerLifecycleState, DAEMON_WORKER_ID};
use context::Inbound;

/// What a task wants after handling one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Work exhausted: emit FINISHED and exit
    Finished,
    /// Wait for the next record
    Idle,
}

/// How [`WorkerAgent::run`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentExit {
    Stopped,
    Finished,
}

/// Domain work plugged into an agent
pub trait WorkerTask {
    /// Handle one record, streaming results through `ctx`
    ///
    /// Long-running work should call
    /// [`AgentContext::check_for_controller_directive`] between units of work
    /// and propagate its `Err(StopRequested)`.
    fn do_work(&mut self, ctx: &mut AgentContext, record: Record) -> Result<WorkOutcome, StopRequested>;

    /// Runs once before the STOPPED acknowledgment is sent
    fn cleanup_pre_stop(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentCapabilities {
    pub requires_handshake: bool,
    pub requires_subscription_filter: bool,
    pub request_reply_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    Daemon,
    Pool,
    LoadBalanced,
}

impl AgentMode {
    pub fn capabilities(self) -> AgentCapabilities {
        match self {
            AgentMode::Daemon => AgentCapabilities {
                requires_handshake: false,
                requires_subscription_filter: false,
                request_reply_mode: false,
            },
            AgentMode::Pool => AgentCapabilities {
                requires_handshake: true,
                requires_subscription_filter: true,
                request_reply_mode: false,
            },
            AgentMode::LoadBalanced => AgentCapabilities {
                requires_handshake: false,
                requires_subscription_filter: false,
                request_reply_mode: true,
            },
        }
    }
}

/// Engine settings for a worker process: defaults plus `PROCFLOW_*` overrides
///
/// Workers inherit the controller's environment, so both sides agree on
/// intervals and limits without shipping a config file around.
pub fn worker_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    apply_environment_overrides(&mut config);
    config
}

fn required<T: Clone>(value: &Option<T>, name: &'static str) -> EngineResult<T> {
    value.clone().ok_or(EngineError::MissingArgument(name))
}

fn started<T: Transport>(mut endpoint: T) -> EngineResult<T> {
    endpoint.start()?;
    Ok(endpoint)
}

pub struct WorkerAgent {
    mode: AgentMode,
    capabilities: AgentCapabilities,
    ctx: AgentContext,
    sync_client: Option<ZmqReq>,
    handshake_timeout: Duration,
}

impl WorkerAgent {
    /// Open every channel `mode` needs from the addresses in `args`
    ///
    /// The agent owns a private ZMQ context. It is terminated when the agent
    /// is dropped at the end of [`WorkerAgent::run`], which holds the process
    /// until the final STOPPED or FINISHED has left the sender (bounded by
    /// `transport.linger_ms`).
    pub fn connect(mode: AgentMode, args: &AgentArgs, config: &EngineConfig) -> EngineResult<Self> {
        let capabilities = mode.capabilities();
        let transport = &config.transport;
        let context = Arc::new(zmq::Context::new());

        let sink = required(&args.send, "--send")?;
        let sender = started(ZmqPush::new(
            Arc::clone(&context),
            TransportConfig::connect(sink)
                .with_send_hwm(transport.worker_send_hwm)
                .with_linger(transport.linger()),
        )?)?;

        let mut controller = None;
        let mut sync_client = None;

        let (worker_id, inbound) = match mode {
            AgentMode::Daemon => {
                let address = required(&args.receive, "--receive")?;
                let pull = started(ZmqPull::new(
                    Arc::clone(&context),
                    TransportConfig::connect(address).with_recv_hwm(transport.worker_send_hwm),
                )?)?;
                (DAEMON_WORKER_ID, Inbound::Pull(pull))
            }
            AgentMode::Pool => {
                let worker_id = required(&args.filter, "--filter")?;
                let topic = Envelope::topic_for(worker_id);

                let receiver = started(ZmqSub::new(
                    Arc::clone(&context),
                    TransportConfig::connect(required(&args.receive, "--receive")?),
                )?)?;
                receiver.subscribe(&topic)?;

                let control = started(ZmqSub::new(
                    Arc::clone(&context),
                    TransportConfig::connect(required(&args.controller, "--controller")?),
                )?)?;
                control.subscribe(&topic)?;
                controller = Some(control);

                sync_client = Some(started(ZmqReq::new(
                    Arc::clone(&context),
                    TransportConfig::connect(required(&args.syncclient, "--syncclient")?),
                )?)?);

                (worker_id, Inbound::Sub(receiver))
            }
            AgentMode::LoadBalanced => {
                let worker_id = required(&args.identity, "--identity")?;
                let worker_type = args
                    .worker_type
                    .clone()
                    .unwrap_or_else(|| config.load_balancer.worker_type.clone());
                let requester = started(ZmqReq::new(
                    Arc::clone(&context),
                    TransportConfig::connect(required(&args.request, "--request")?)
                        .with_identity(create_identity(&worker_type, worker_id))
                        .with_linger(transport.linger()),
                )?)?;
                (worker_id, Inbound::Requester(requester))
            }
        };

        debug!(
            worker_id,
            "🦀 [AGENT] Connected as {:?} worker", mode
        );

        Ok(Self {
            mode,
            capabilities,
            ctx: AgentContext {
                worker_id,
                sender,
                inbound,
                controller,
                backlog: VecDeque::new(),
                state: WorkerLifecycleState::Spawned,
                poll_interval: transport.poll_interval(),
            },
            sync_client,
            handshake_timeout: config.pool.handshake_timeout(),
        })
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    pub fn worker_id(&self) -> WorkerId {
        self.ctx.worker_id
    }

    /// Serve records until stopped or finished
    pub fn run<T: WorkerTask>(mut self, task: &mut T) -> EngineResult<AgentExit> {
        if self.capabilities.request_reply_mode {
            return self.run_balanced(task);
        }

        if self.capabilities.requires_handshake {
            self.ctx.enter(WorkerLifecycleState::Synchronizing);
            if !self.synchronize()? {
                return self.stop(task);
            }
        }
        self.ctx.enter(WorkerLifecycleState::Ready);
        info!("🦀 [AGENT] Worker {} ready", self.ctx.worker_id);

        loop {
            let record = match self.ctx.wait_for_record() {
                Ok(record) => record,
                Err(StopRequested) => return self.stop(task),
            };
            self.ctx.enter(WorkerLifecycleState::Running);

            match task.do_work(&mut self.ctx, record) {
                Ok(WorkOutcome::Idle) => continue,
                Ok(WorkOutcome::Finished) => return self.finish(),
                Err(StopRequested) => return self.stop(task),
            }
        }
    }

    /// Wait for START, then complete the sync request/reply.
    /// Returns `false` when a STOP arrived first.
    fn synchronize(&mut self) -> EngineResult<bool> {
        let worker_id = self.ctx.worker_id;
        let deadline = Instant::now() + self.handshake_timeout;

        loop {
            if Instant::now() >= deadline {
                return Err(EngineError::HandshakeTimeout(format!("worker {} start", worker_id)));
            }
            let envelope = match self.ctx.inbound.recv_timeout(self.ctx.poll_interval) {
                Ok(envelope) => envelope,
                Err(e) if e.is_unavailable() => continue,
                Err(e) => return Err(e.into()),
            };
            if envelope.worker_id != Some(worker_id) {
                continue;
            }
            match envelope.as_command() {
                Some(Command::Start) => break,
                Some(Command::Stop) => return Ok(false),
                _ => error!(
                    "🦀 [AGENT] Worker {} protocol violation: expected START, got {:?}",
                    worker_id, envelope.payload
                ),
            }
        }

        let sync_client = self
            .sync_client
            .as_ref()
            .ok_or(EngineError::MissingArgument("--syncclient"))?;
        sync_client
            .request_timeout(&Envelope::data(Some(worker_id), Vec::new()), self.handshake_timeout)
            .map_err(|e| match e {
                TransportError::Timeout => {
                    EngineError::HandshakeTimeout(format!("worker {} sync", worker_id))
                }
                other => other.into(),
            })?;

        debug!("🦀 [AGENT] Worker {} synchronized", worker_id);
        Ok(true)
    }

    fn run_balanced<T: WorkerTask>(mut self, task: &mut T) -> EngineResult<AgentExit> {
        let worker_id = self.ctx.worker_id;
        self.ctx.enter(WorkerLifecycleState::Ready);
        info!("🦀 [AGENT] Worker {} ready", worker_id);

        let mut reply = Envelope::command(Some(worker_id), Command::Ready);
        loop {
            let request = match &self.ctx.inbound {
                Inbound::Requester(requester) => requester.request(&reply)?,
                _ => return Err(EngineError::Protocol("load-balanced worker without request channel".into())),
            };

            match request.payload {
                Payload::Command(Command::Stop) => return self.stop_balanced(task),
                Payload::Data(record) => {
                    self.ctx.enter(WorkerLifecycleState::Running);
                    if let Err(StopRequested) = task.do_work(&mut self.ctx, record) {
                        return self.stop_balanced(task);
                    }
                }
                Payload::Command(other) => error!(
                    "🦀 [AGENT] Worker {} protocol violation: unexpected {} request",
                    worker_id, other
                ),
            }
            reply = Envelope::command(Some(worker_id), Command::Ready);
        }
    }

    fn stop<T: WorkerTask>(mut self, task: &mut T) -> EngineResult<AgentExit> {
        self.ctx.enter(WorkerLifecycleState::Stopping);
        task.cleanup_pre_stop();
        self.ctx
            .sender
            .send_envelope(&Envelope::command(Some(self.ctx.worker_id), Command::Stopped))?;
        self.ctx.enter(WorkerLifecycleState::Stopped);
        info!("🦀 [AGENT] Worker {} stopped", self.ctx.worker_id);
        Ok(AgentExit::Stopped)
    }

    /// The balancer expects the acknowledgment as the reply on the request channel
    fn stop_balanced<T: WorkerTask>(mut self, task: &mut T) -> EngineResult<AgentExit> {
        self.ctx.enter(WorkerLifecycleState::Stopping);
        task.cleanup_pre_stop();
        if let Inbound::Requester(requester) = &self.ctx.inbound {
            requester.send_request(&Envelope::command(Some(self.ctx.worker_id), Command::Stopped))?;
        }
        self.ctx.enter(WorkerLifecycleState::Stopped);
        info!("🦀 [AGENT] Worker {} stopped", self.ctx.worker_id);
        Ok(AgentExit::Stopped)
    }

    fn finish(mut self) -> EngineResult<AgentExit> {
        self.ctx
            .sender
            .send_envelope(&Envelope::command(Some(self.ctx.worker_id), Command::Finished))?;
        self.ctx.enter(WorkerLifecycleState::Finished);
        info!("🦀 [AGENT] Worker {} finished", self.ctx.worker_id);
        Ok(AgentExit::Finished)
    }
}
