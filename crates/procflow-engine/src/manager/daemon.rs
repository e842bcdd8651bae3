// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Single long-lived worker fed over a PUSH ventilator

use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

use procflow_config::EngineConfig;
use procflow_transports::prelude::*;

use super::{bound, endpoint_of, DispatchStrategy, ManagerCore};
use crate::agent::AgentArgs;
use crate::error::EngineResult;
use crate::protocol::{Record, WorkerLifecycleState, DAEMON_WORKER_ID};

/// One daemon worker receiving an ordered record stream
///
/// The ventilator's send high-water mark bounds how many records can be
/// outstanding. A full queue holds `send_to_worker` back for as long as the
/// daemon process is alive; a dead daemon is reported as crashed instead.
#[derive(Default)]
pub struct SingleDaemon {
    ventilator: Option<ZmqPush>,
}

impl SingleDaemon {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DispatchStrategy for SingleDaemon {
    fn name(&self) -> &'static str {
        "single-daemon"
    }

    fn open(&mut self, context: &Arc<zmq::Context>, config: &EngineConfig) -> EngineResult<()> {
        let transport = &config.transport;
        self.ventilator = Some(bound(ZmqPush::new(
            Arc::clone(context),
            TransportConfig::bind(transport.bind_address()).with_send_hwm(transport.worker_send_hwm),
        ))?);
        Ok(())
    }

    fn start(&mut self, core: &mut ManagerCore) -> EngineResult<()> {
        if core.state(DAEMON_WORKER_ID).is_some() {
            warn!("🦀 [DAEMON] Daemon worker already started");
            return Ok(());
        }

        let command = core.worker_command(AgentArgs {
            receive: Some(endpoint_of(&self.ventilator)?),
            ..Default::default()
        });
        core.launch(DAEMON_WORKER_ID, &command);
        core.transition(DAEMON_WORKER_ID, WorkerLifecycleState::Ready);
        Ok(())
    }

    fn send_to_worker(
        &mut self,
        core: &mut ManagerCore,
        worker_id: Option<WorkerId>,
        data: Record,
    ) -> EngineResult<()> {
        if let Some(id) = worker_id.filter(|id| *id != DAEMON_WORKER_ID) {
            warn!("🦀 [DAEMON] Ignoring worker id {}; the daemon is worker {}", id, DAEMON_WORKER_ID);
        }
        if !core.accepts_data(DAEMON_WORKER_ID) {
            error!(
                "🦀 [DAEMON] Refusing data: daemon worker is {:?}",
                core.state(DAEMON_WORKER_ID)
            );
            return Ok(());
        }

        let Some(ventilator) = &self.ventilator else {
            return Ok(());
        };
        let envelope = Envelope::data(None, data);
        let backoff = core.config().transport.poll_interval();
        loop {
            match ventilator.try_send_envelope(&envelope) {
                Ok(()) => break,
                Err(TransportError::WouldBlock) => {
                    if !core.is_alive(DAEMON_WORKER_ID) {
                        warn!("🦀 [DAEMON] Daemon worker exited; dropping record");
                        core.crash_worker(DAEMON_WORKER_ID);
                        return Ok(());
                    }
                    thread::sleep(backoff);
                }
                Err(e) => return Err(e.into()),
            }
        }
        if core.state(DAEMON_WORKER_ID) == Some(WorkerLifecycleState::Ready) {
            core.transition(DAEMON_WORKER_ID, WorkerLifecycleState::Running);
        }
        Ok(())
    }

    fn stop(&mut self, core: &mut ManagerCore) -> EngineResult<()> {
        core.set_terminating();

        if !core.is_alive(DAEMON_WORKER_ID) {
            core.terminate_sink();
            return Ok(());
        }

        let Some(ventilator) = &self.ventilator else {
            core.terminate_sink();
            return Ok(());
        };
        match ventilator.try_send_envelope(&Envelope::command(None, Command::Stop)) {
            Ok(()) => {
                core.transition(DAEMON_WORKER_ID, WorkerLifecycleState::Stopping);
                info!("🦀 [DAEMON] Stop requested");
            }
            Err(TransportError::WouldBlock) => {
                warn!("🦀 [DAEMON] Daemon not accepting messages; terminating sink");
                core.terminate_sink();
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
