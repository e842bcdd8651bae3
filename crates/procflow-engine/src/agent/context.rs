// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Worker-side channel state handed to [`super::WorkerTask`]s

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use procflow_transports::prelude::*;

use crate::error::EngineResult;
use crate::protocol::{Record, WorkerLifecycleState};

/// The manager asked this worker to stop; unwind to the agent loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stop requested")]
pub struct StopRequested;

/// Where work arrives from
pub(crate) enum Inbound {
    /// Daemon ventilator
    Pull(ZmqPull),
    /// Pool ventilator, filtered on the worker id
    Sub(ZmqSub),
    /// Load balancer backend
    Requester(ZmqReq),
}

impl Inbound {
    fn try_recv(&self) -> TransportResult<Option<Envelope>> {
        match self {
            Inbound::Pull(pull) => pull.try_recv_envelope(),
            Inbound::Sub(sub) => sub.try_recv_envelope(),
            Inbound::Requester(_) => Ok(None),
        }
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> TransportResult<Envelope> {
        match self {
            Inbound::Pull(pull) => pull.recv_envelope_timeout(timeout),
            Inbound::Sub(sub) => sub.recv_envelope_timeout(timeout),
            Inbound::Requester(_) => Err(TransportError::InvalidConfig(
                "request channel has no standalone receive".to_string(),
            )),
        }
    }

    fn pollable(&self) -> &dyn Pollable {
        match self {
            Inbound::Pull(pull) => pull,
            Inbound::Sub(sub) => sub,
            Inbound::Requester(req) => req,
        }
    }
}

pub struct AgentContext {
    pub(crate) worker_id: WorkerId,
    pub(crate) sender: ZmqPush,
    pub(crate) inbound: Inbound,
    pub(crate) controller: Option<ZmqSub>,
    pub(crate) backlog: VecDeque<Record>,
    pub(crate) state: WorkerLifecycleState,
    pub(crate) poll_interval: Duration,
}

impl AgentContext {
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn state(&self) -> WorkerLifecycleState {
        self.state
    }

    /// Stream one result record to the sink
    ///
    /// Blocks while the sender's outstanding-message limit is reached.
    pub fn send_result(&self, record: &[u8]) -> EngineResult<()> {
        self.sender
            .send_envelope(&Envelope::data(Some(self.worker_id), record.to_vec()))?;
        Ok(())
    }

    /// Stream `value` as a JSON result record
    pub fn send_record<T: Serialize>(&self, value: &T) -> EngineResult<()> {
        self.sender
            .send_envelope(&Envelope::json(Some(self.worker_id), value)?)?;
        Ok(())
    }

    /// Cooperative checkpoint
    ///
    /// Returns immediately when nothing is pending. A pause blocks here until
    /// the matching resume; a stop (also while paused) surfaces as
    /// `Err(StopRequested)`. Daemon workers peek their work channel instead
    /// and keep any queued records for [`AgentContext::next_task`].
    pub fn check_for_controller_directive(&mut self) -> Result<(), StopRequested> {
        if self.controller.is_some() {
            return self.drain_controller();
        }
        if let Inbound::Pull(_) = self.inbound {
            return self.drain_inbound();
        }
        Ok(())
    }

    /// Next queued record, without blocking
    ///
    /// Records seen at earlier checkpoints are served first, in arrival order.
    pub fn next_task(&mut self) -> Result<Option<Record>, StopRequested> {
        if let Some(record) = self.backlog.pop_front() {
            return Ok(Some(record));
        }
        if self.controller.is_some() {
            self.drain_controller()?;
        }
        self.drain_inbound()?;
        Ok(self.backlog.pop_front())
    }

    /// Block until a record arrives, honoring directives meanwhile
    pub(crate) fn wait_for_record(&mut self) -> Result<Record, StopRequested> {
        loop {
            if let Some(record) = self.next_task()? {
                return Ok(record);
            }

            let polled = match &self.controller {
                Some(controller) => poll_readable(
                    &[self.inbound.pollable(), controller as &dyn Pollable],
                    Some(self.poll_interval),
                ),
                None => poll_readable(&[self.inbound.pollable()], Some(self.poll_interval)),
            };
            if let Err(e) = polled {
                error!("🦀 [AGENT] Worker {} poll failed: {}", self.worker_id, e);
                return Err(StopRequested);
            }
        }
    }

    pub(crate) fn enter(&mut self, next: WorkerLifecycleState) {
        if self.state == next {
            return;
        }
        if let Err(e) = self.state.transition(self.worker_id, next) {
            error!("🦀 [AGENT] {}", e);
        }
    }

    /// Exact id match; the subscription prefix lets "12" through to worker 1
    fn addressed_to_me(&self, envelope: &Envelope) -> bool {
        match self.inbound {
            Inbound::Sub(_) => envelope.worker_id == Some(self.worker_id),
            _ => true,
        }
    }

    fn drain_inbound(&mut self) -> Result<(), StopRequested> {
        loop {
            let envelope = match self.inbound.try_recv() {
                Ok(Some(envelope)) => envelope,
                Ok(None) => return Ok(()),
                Err(e) => {
                    error!("🦀 [AGENT] Worker {} receive failed: {}", self.worker_id, e);
                    return Ok(());
                }
            };
            if !self.addressed_to_me(&envelope) {
                continue;
            }
            match envelope.payload {
                Payload::Data(record) => self.backlog.push_back(record),
                Payload::Command(Command::Stop) => return Err(StopRequested),
                // Duplicates from the startup handshake
                Payload::Command(Command::Start) => {}
                Payload::Command(other) => error!(
                    "🦀 [AGENT] Worker {} protocol violation: unexpected {} on work channel",
                    self.worker_id, other
                ),
            }
        }
    }

    fn drain_controller(&mut self) -> Result<(), StopRequested> {
        loop {
            let received = match &self.controller {
                Some(controller) => controller.try_recv_envelope(),
                None => return Ok(()),
            };
            let envelope = match received {
                Ok(Some(envelope)) => envelope,
                Ok(None) => return Ok(()),
                Err(e) => {
                    error!("🦀 [AGENT] Worker {} control receive failed: {}", self.worker_id, e);
                    return Ok(());
                }
            };
            if envelope.worker_id != Some(self.worker_id) {
                continue;
            }
            match envelope.as_command() {
                Some(Command::Pause) => self.wait_while_paused()?,
                Some(Command::Stop) => return Err(StopRequested),
                Some(Command::Resume) => debug!("🦀 [AGENT] Worker {} resumed while not paused", self.worker_id),
                _ => error!(
                    "🦀 [AGENT] Worker {} protocol violation: {:?} on control channel",
                    self.worker_id, envelope.payload
                ),
            }
        }
    }

    fn wait_while_paused(&mut self) -> Result<(), StopRequested> {
        let running = self.state == WorkerLifecycleState::Running;
        if running {
            self.enter(WorkerLifecycleState::Paused);
        }
        debug!("🦀 [AGENT] Worker {} paused", self.worker_id);

        loop {
            let received = match &self.controller {
                Some(controller) => controller.recv_envelope_timeout(self.poll_interval),
                None => return Ok(()),
            };
            let envelope = match received {
                Ok(envelope) => envelope,
                Err(e) if e.is_unavailable() => continue,
                Err(e) => {
                    error!("🦀 [AGENT] Worker {} lost its control channel: {}", self.worker_id, e);
                    return Err(StopRequested);
                }
            };
            if envelope.worker_id != Some(self.worker_id) {
                continue;
            }
            match envelope.as_command() {
                Some(Command::Resume) => {
                    if running {
                        self.enter(WorkerLifecycleState::Running);
                    }
                    debug!("🦀 [AGENT] Worker {} resumed", self.worker_id);
                    return Ok(());
                }
                Some(Command::Stop) => return Err(StopRequested),
                Some(Command::Pause) => {}
                _ => error!(
                    "🦀 [AGENT] Worker {} protocol violation: expected RESUME or STOP, got {:?}",
                    self.worker_id, envelope.payload
                ),
            }
        }
    }
}
