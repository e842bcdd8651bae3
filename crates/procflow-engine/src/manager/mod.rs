// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Managers: lifecycle bookkeeping plus a pluggable dispatch strategy
//!
//! A [`Manager`] is driven by the [`crate::sink::ResultSink`] reactor. The
//! shared [`ManagerCore`] owns the supervisor, the per-worker lifecycle table
//! and the shutdown flag; a [`DispatchStrategy`] owns the outbound channels and
//! decides how directives reach workers.

mod daemon;
mod pool;

pub use daemon::SingleDaemon;
pub use pool::PoolBroadcast;

use crossbeam::channel::Sender;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use procflow_config::EngineConfig;
use procflow_transports::prelude::*;

use crate::agent::AgentArgs;
use crate::error::{EngineError, EngineResult};
use crate::protocol::{Directive, Record, WorkerLifecycleState};
use crate::sink::SinkEvent;
use crate::supervisor::{Supervisor, WorkerCommand};

/// How directives reach workers
///
/// Operations a strategy has no notion of (pausing a daemon, starting a
/// second one) are logged and ignored.
pub trait DispatchStrategy: Send {
    fn name(&self) -> &'static str;

    /// Bind the outbound endpoints; runs before any worker is launched
    fn open(&mut self, context: &Arc<zmq::Context>, config: &EngineConfig) -> EngineResult<()>;

    fn start(&mut self, core: &mut ManagerCore) -> EngineResult<()> {
        let _ = core;
        unsupported(self.name(), "start")
    }

    fn start_worker(&mut self, core: &mut ManagerCore, worker_id: WorkerId, initial: Record) -> EngineResult<()> {
        let _ = (core, worker_id, initial);
        unsupported(self.name(), "start_worker")
    }

    fn send_to_worker(
        &mut self,
        core: &mut ManagerCore,
        worker_id: Option<WorkerId>,
        data: Record,
    ) -> EngineResult<()>;

    fn stop_worker(&mut self, core: &mut ManagerCore, worker_id: WorkerId) -> EngineResult<()> {
        let _ = (core, worker_id);
        unsupported(self.name(), "stop_worker")
    }

    /// Ask every live worker to stop; the sink halts once all acknowledged
    fn stop(&mut self, core: &mut ManagerCore) -> EngineResult<()>;

    fn pause(&mut self, core: &mut ManagerCore, worker_id: Option<WorkerId>) -> EngineResult<()> {
        let _ = (core, worker_id);
        unsupported(self.name(), "pause")
    }

    fn resume(&mut self, core: &mut ManagerCore, worker_id: Option<WorkerId>) -> EngineResult<()> {
        let _ = (core, worker_id);
        unsupported(self.name(), "resume")
    }
}

fn unsupported(strategy: &str, operation: &str) -> EngineResult<()> {
    warn!("🦀 [MANAGER] {} does not support {}", strategy, operation);
    Ok(())
}

/// State shared by every strategy
pub struct ManagerCore {
    config: EngineConfig,
    supervisor: Supervisor,
    workers: HashMap<WorkerId, WorkerLifecycleState>,
    /// Dead workers seen at one idle poll; crashed if still unacknowledged at the next
    suspects: HashSet<WorkerId>,
    terminating: bool,
    worker_program: WorkerCommand,
    results_endpoint: String,
    log_endpoint: Option<String>,
    kill: ZmqPush,
    events: Sender<SinkEvent>,
}

impl ManagerCore {
    pub(crate) fn new(
        context: &Arc<zmq::Context>,
        config: EngineConfig,
        label: &str,
        worker_program: WorkerCommand,
        results_endpoint: String,
        log_endpoint: Option<String>,
        events: Sender<SinkEvent>,
    ) -> EngineResult<Self> {
        let mut kill = ZmqPush::new(Arc::clone(context), TransportConfig::connect(results_endpoint.clone()))?;
        kill.start()?;

        Ok(Self {
            supervisor: Supervisor::new(label, config.supervisor.terminate_grace()),
            config,
            workers: HashMap::new(),
            suspects: HashSet::new(),
            terminating: false,
            worker_program,
            results_endpoint,
            log_endpoint,
            kill,
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn results_endpoint(&self) -> &str {
        &self.results_endpoint
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    pub fn set_terminating(&mut self) {
        self.terminating = true;
    }

    /// The worker program with `args` plus the sink and log addresses appended
    pub fn worker_command(&self, args: AgentArgs) -> WorkerCommand {
        let args = AgentArgs {
            send: Some(self.results_endpoint.clone()),
            logging: self.log_endpoint.clone(),
            ..args
        };
        args.apply(self.worker_program.clone())
    }

    /// Spawn a worker process; failing to do so ends the controller process
    pub fn launch(&mut self, worker_id: WorkerId, command: &WorkerCommand) {
        self.supervisor.spawn_or_abort(worker_id, command);
        self.workers.insert(worker_id, WorkerLifecycleState::Spawned);
        self.suspects.remove(&worker_id);
    }

    pub fn state(&self, worker_id: WorkerId) -> Option<WorkerLifecycleState> {
        self.workers.get(&worker_id).copied()
    }

    /// Tracked worker ids in ascending order
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.workers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn accepts_data(&self, worker_id: WorkerId) -> bool {
        self.state(worker_id).is_some_and(WorkerLifecycleState::accepts_data)
    }

    pub fn is_alive(&mut self, worker_id: WorkerId) -> bool {
        self.supervisor.is_alive(worker_id)
    }

    /// Record a lifecycle move; illegal moves are logged and ignored
    pub fn transition(&mut self, worker_id: WorkerId, to: WorkerLifecycleState) -> bool {
        let Some(state) = self.workers.get_mut(&worker_id) else {
            warn!("🦀 [MANAGER] Transition of unknown worker {} to {:?}", worker_id, to);
            return false;
        };
        match state.transition(worker_id, to) {
            Ok(()) => true,
            Err(e) => {
                error!("🦀 [MANAGER] {}", e);
                false
            }
        }
    }

    /// Break the sink out of its poll loop right away
    pub fn terminate_sink(&self) {
        if let Err(e) = self.kill.send_envelope(&Envelope::command(None, Command::Kill)) {
            error!("🦀 [SINK] Failed to inject kill envelope: {}", e);
        }
    }

    /// Give up on a worker that never acknowledged
    pub fn crash_worker(&mut self, worker_id: WorkerId) {
        self.workers.remove(&worker_id);
        self.suspects.remove(&worker_id);
        self.supervisor.reap(worker_id, std::time::Duration::ZERO);
        warn!("🦀 [MANAGER] Worker {} stopped unexpectedly", worker_id);
        self.emit(SinkEvent::WorkerCrashed(worker_id));
    }

    pub(crate) fn emit(&self, event: SinkEvent) {
        // The application may have dropped its receiver
        let _ = self.events.send(event);
    }

    /// Handle STOPPED / FINISHED. Returns `true` once shutdown is complete.
    pub(crate) fn acknowledge(&mut self, worker_id: WorkerId, command: Command) -> bool {
        let (target, event) = match command {
            Command::Finished => (WorkerLifecycleState::Finished, SinkEvent::WorkerFinished(worker_id)),
            _ => (WorkerLifecycleState::Stopped, SinkEvent::WorkerStopped(worker_id)),
        };

        match self.workers.remove(&worker_id) {
            Some(mut state) => {
                if let Err(e) = state.transition(worker_id, target) {
                    warn!("🦀 [MANAGER] {}", e);
                }
                self.suspects.remove(&worker_id);
                self.supervisor.reap(worker_id, self.config.supervisor.terminate_grace());
                debug!("🦀 [MANAGER] Worker {} acknowledged {}", worker_id, command);
                self.emit(event);
            }
            None => warn!("🦀 [MANAGER] {} from untracked worker {}", command, worker_id),
        }

        self.shutdown_complete()
    }

    /// Idle-poll liveness sweep while terminating. Returns `true` once
    /// shutdown is complete.
    pub(crate) fn check_for_crashed(&mut self) -> bool {
        for worker_id in self.worker_ids() {
            if self.supervisor.is_alive(worker_id) {
                self.suspects.remove(&worker_id);
            } else if !self.suspects.insert(worker_id) {
                self.crash_worker(worker_id);
            }
        }
        self.shutdown_complete()
    }

    fn shutdown_complete(&self) -> bool {
        self.terminating && self.workers.is_empty()
    }

    /// Kill every worker without waiting for acknowledgments
    pub(crate) fn terminate(&mut self) {
        self.terminating = true;
        let report = self
            .supervisor
            .force_terminate_all(self.config.supervisor.terminate_grace());
        info!("🦀 [MANAGER] Terminated all workers: {:?}", report);
        self.workers.clear();
        self.suspects.clear();
        self.terminate_sink();
    }

    /// Final cleanup once the reactor loop has exited
    ///
    /// Tracked workers whose process is already gone are reported as crashed;
    /// the rest are terminated without an event.
    pub(crate) fn shutdown(&mut self) {
        for worker_id in self.worker_ids() {
            if !self.supervisor.is_alive(worker_id) {
                self.crash_worker(worker_id);
            }
        }
        if !self.supervisor.is_empty() {
            let report = self
                .supervisor
                .force_terminate_all(self.config.supervisor.terminate_grace());
            debug!("🦀 [MANAGER] Final cleanup: {:?}", report);
        }
        self.workers.clear();
        self.emit(SinkEvent::Terminated);
    }
}

/// A strategy plus the shared core, driven by directives
pub struct Manager {
    pub(crate) core: ManagerCore,
    strategy: Box<dyn DispatchStrategy>,
}

impl Manager {
    pub(crate) fn new(core: ManagerCore, strategy: Box<dyn DispatchStrategy>) -> Self {
        Self { core, strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn handle(&mut self, directive: Directive) -> EngineResult<()> {
        debug!("🦀 [MANAGER] [{}] {:?}", self.strategy.name(), directive);
        let core = &mut self.core;
        match directive {
            Directive::Start => self.strategy.start(core),
            Directive::StartWorker { worker_id, initial } => {
                self.strategy.start_worker(core, worker_id, initial)
            }
            Directive::SendToWorker { worker_id, data } => {
                self.strategy.send_to_worker(core, worker_id, data)
            }
            Directive::StopWorker { worker_id } => self.strategy.stop_worker(core, worker_id),
            Directive::Stop => self.strategy.stop(core),
            Directive::Pause { worker_id } => self.strategy.pause(core, worker_id),
            Directive::Resume { worker_id } => self.strategy.resume(core, worker_id),
            Directive::Terminate => {
                core.terminate();
                Ok(())
            }
        }
    }
}

/// Bind an endpoint on the configured host's wildcard port
pub(crate) fn bound<T: Transport>(endpoint: TransportResult<T>) -> EngineResult<T> {
    let mut endpoint = endpoint?;
    endpoint.start()?;
    Ok(endpoint)
}

/// Resolved address of a started endpoint
pub(crate) fn endpoint_of<T: Transport>(endpoint: &Option<T>) -> EngineResult<String> {
    endpoint
        .as_ref()
        .and_then(Transport::endpoint)
        .ok_or(EngineError::Transport(TransportError::NotRunning))
}
