// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Dynamic worker pool over PUB/SUB with a synchronized startup

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use procflow_config::EngineConfig;
use procflow_transports::prelude::*;

use super::{bound, endpoint_of, DispatchStrategy, ManagerCore};
use crate::agent::AgentArgs;
use crate::error::{EngineError, EngineResult};
use crate::protocol::{Record, WorkerLifecycleState};

/// Workers started one at a time, addressed by id on two broadcast channels
///
/// - ventilator (PUB): START, data records and STOP, topic = worker id
/// - controller (PUB): PAUSE / RESUME / STOP, topic = worker id
/// - sync (REP): answers each worker's single startup request
#[derive(Default)]
pub struct PoolBroadcast {
    ventilator: Option<ZmqPub>,
    controller: Option<ZmqPub>,
    sync: Option<ZmqRep>,
}

impl PoolBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(channel: &Option<ZmqPub>, envelope: &Envelope) -> EngineResult<()> {
        channel
            .as_ref()
            .ok_or(EngineError::Transport(TransportError::NotRunning))?
            .send_envelope(envelope)?;
        Ok(())
    }

    /// Repeat START until the worker's sync request arrives.
    /// Returns `false` if the worker died or the timeout expired first.
    fn handshake(&self, core: &mut ManagerCore, worker_id: WorkerId) -> EngineResult<bool> {
        let sync = self
            .sync
            .as_ref()
            .ok_or(EngineError::Transport(TransportError::NotRunning))?;
        let pool = &core.config().pool;
        let (backoff, timeout) = (pool.handshake_backoff(), pool.handshake_timeout());
        let deadline = Instant::now() + timeout;
        let start = Envelope::command(Some(worker_id), Command::Start);

        loop {
            // PUB drops messages until the subscriber has joined, hence the repeats
            Self::publish(&self.ventilator, &start)?;

            match sync.recv_request_timeout(backoff) {
                Ok(request) => {
                    sync.reply(&Envelope::data(None, Vec::new()))?;
                    if request.worker_id == Some(worker_id) {
                        return Ok(true);
                    }
                    warn!(
                        "🦀 [POOL] Stale sync request from {:?} while starting worker {}",
                        request.worker_id, worker_id
                    );
                }
                Err(e) if e.is_unavailable() => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                error!("🦀 [POOL] Worker {} did not synchronize within {:?}", worker_id, timeout);
                return Ok(false);
            }
            if !core.is_alive(worker_id) {
                error!("🦀 [POOL] Worker {} exited during startup", worker_id);
                return Ok(false);
            }
        }
    }

    fn send_stop(&self, core: &mut ManagerCore, worker_id: WorkerId) -> EngineResult<()> {
        let stop = Envelope::command(Some(worker_id), Command::Stop);
        // Controller reaches a paused or busy worker, the ventilator an idle one
        Self::publish(&self.controller, &stop)?;
        Self::publish(&self.ventilator, &stop)?;
        core.transition(worker_id, WorkerLifecycleState::Stopping);
        Ok(())
    }

    fn targets(core: &ManagerCore, worker_id: Option<WorkerId>) -> Vec<WorkerId> {
        match worker_id {
            Some(id) => vec![id],
            None => core.worker_ids(),
        }
    }
}

impl DispatchStrategy for PoolBroadcast {
    fn name(&self) -> &'static str {
        "pool-broadcast"
    }

    fn open(&mut self, context: &Arc<zmq::Context>, config: &EngineConfig) -> EngineResult<()> {
        let transport = &config.transport;
        let publisher = || {
            TransportConfig::bind(transport.bind_address()).with_send_hwm(transport.send_hwm)
        };

        self.ventilator = Some(bound(ZmqPub::new(Arc::clone(context), publisher()))?);
        self.controller = Some(bound(ZmqPub::new(Arc::clone(context), publisher()))?);
        self.sync = Some(bound(ZmqRep::new(
            Arc::clone(context),
            TransportConfig::bind(transport.bind_address()),
        ))?);
        Ok(())
    }

    fn start_worker(&mut self, core: &mut ManagerCore, worker_id: WorkerId, initial: Record) -> EngineResult<()> {
        if core.is_terminating() {
            warn!("🦀 [POOL] Not starting worker {} during shutdown", worker_id);
            return Ok(());
        }
        if let Some(state) = core.state(worker_id) {
            warn!("🦀 [POOL] Worker {} already exists ({:?})", worker_id, state);
            return Ok(());
        }

        let command = core.worker_command(AgentArgs {
            receive: Some(endpoint_of(&self.ventilator)?),
            controller: Some(endpoint_of(&self.controller)?),
            syncclient: Some(endpoint_of(&self.sync)?),
            filter: Some(worker_id),
            ..Default::default()
        });
        core.launch(worker_id, &command);
        core.transition(worker_id, WorkerLifecycleState::Synchronizing);

        if !self.handshake(core, worker_id)? {
            core.crash_worker(worker_id);
            return Ok(());
        }
        core.transition(worker_id, WorkerLifecycleState::Ready);

        Self::publish(&self.ventilator, &Envelope::data(Some(worker_id), initial))?;
        core.transition(worker_id, WorkerLifecycleState::Running);
        info!("🦀 [POOL] Worker {} started", worker_id);
        Ok(())
    }

    fn send_to_worker(
        &mut self,
        core: &mut ManagerCore,
        worker_id: Option<WorkerId>,
        data: Record,
    ) -> EngineResult<()> {
        for id in Self::targets(core, worker_id) {
            if !core.accepts_data(id) {
                error!("🦀 [POOL] Refusing data for worker {} ({:?})", id, core.state(id));
                continue;
            }
            Self::publish(&self.ventilator, &Envelope::data(Some(id), data.clone()))?;
            if core.state(id) == Some(WorkerLifecycleState::Ready) {
                core.transition(id, WorkerLifecycleState::Running);
            }
        }
        Ok(())
    }

    fn stop_worker(&mut self, core: &mut ManagerCore, worker_id: WorkerId) -> EngineResult<()> {
        if !core.accepts_data(worker_id) {
            debug!("🦀 [POOL] Worker {} is not running ({:?})", worker_id, core.state(worker_id));
            return Ok(());
        }
        self.send_stop(core, worker_id)
    }

    fn stop(&mut self, core: &mut ManagerCore) -> EngineResult<()> {
        core.set_terminating();

        let mut awaiting = 0;
        for worker_id in core.worker_ids() {
            if core.state(worker_id) == Some(WorkerLifecycleState::Stopping) {
                awaiting += 1;
            } else if core.accepts_data(worker_id) && core.is_alive(worker_id) {
                self.send_stop(core, worker_id)?;
                awaiting += 1;
            }
        }

        info!("🦀 [POOL] Stopping; awaiting {} acknowledgment(s)", awaiting);
        if awaiting == 0 {
            core.terminate_sink();
        }
        Ok(())
    }

    fn pause(&mut self, core: &mut ManagerCore, worker_id: Option<WorkerId>) -> EngineResult<()> {
        for id in Self::targets(core, worker_id) {
            if core.state(id) != Some(WorkerLifecycleState::Running) {
                debug!("🦀 [POOL] Not pausing worker {} ({:?})", id, core.state(id));
                continue;
            }
            Self::publish(&self.controller, &Envelope::command(Some(id), Command::Pause))?;
            core.transition(id, WorkerLifecycleState::Paused);
        }
        Ok(())
    }

    fn resume(&mut self, core: &mut ManagerCore, worker_id: Option<WorkerId>) -> EngineResult<()> {
        for id in Self::targets(core, worker_id) {
            if core.state(id) != Some(WorkerLifecycleState::Paused) {
                debug!("🦀 [POOL] Not resuming worker {} ({:?})", id, core.state(id));
                continue;
            }
            Self::publish(&self.controller, &Envelope::command(Some(id), Command::Resume))?;
            core.transition(id, WorkerLifecycleState::Running);
        }
        Ok(())
    }
}
