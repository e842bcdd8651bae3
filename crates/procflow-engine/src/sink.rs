// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Result Sink
//!
//! One reactor thread per manager. It polls the worker result stream and the
//! application's directive channel, forwards results as [`SinkEvent`]s and
//! drives the [`Manager`] until every worker acknowledged shutdown.
//!
//! ```text
//!  application ──SinkHandle──► inproc PUSH ─► PULL ┐
//!                                                  ├─ reactor ─► crossbeam ─► application
//!  workers ──────────────────► tcp PUSH ───► PULL ┘
//! ```

use crossbeam::channel::{self, Receiver};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use procflow_config::EngineConfig;
use procflow_transports::prelude::*;

use crate::error::{EngineError, EngineResult};
use crate::manager::{DispatchStrategy, Manager, ManagerCore};
use crate::protocol::{Directive, Record};
use crate::supervisor::WorkerCommand;

static SINK_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// What the application hears back from its workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Result { worker_id: WorkerId, record: Record },
    WorkerStopped(WorkerId),
    WorkerFinished(WorkerId),
    /// Exited or failed to start without acknowledging
    WorkerCrashed(WorkerId),
    /// The reactor has exited; no further events follow
    Terminated,
}

/// Application side of a running sink
///
/// Cheap to share across threads; every call is a non-blocking handoff to the
/// reactor. A full directive queue yields [`EngineError::SinkBusy`] and the
/// directive may be retried.
pub struct SinkHandle {
    control: ZmqPush,
    kill: ZmqPush,
    results_endpoint: String,
    running: Arc<AtomicBool>,
}

impl SinkHandle {
    pub fn send(&self, directive: Directive) -> EngineResult<()> {
        if !self.is_running() {
            return Err(EngineError::SinkClosed);
        }
        match self.control.try_send_envelope(&Envelope::json(None, &directive)?) {
            Ok(()) => Ok(()),
            Err(TransportError::WouldBlock) => Err(EngineError::SinkBusy),
            Err(e) => Err(e.into()),
        }
    }

    pub fn start(&self) -> EngineResult<()> {
        self.send(Directive::Start)
    }

    pub fn start_worker(&self, worker_id: WorkerId, initial: Record) -> EngineResult<()> {
        self.send(Directive::StartWorker { worker_id, initial })
    }

    pub fn send_to_worker(&self, worker_id: Option<WorkerId>, data: Record) -> EngineResult<()> {
        self.send(Directive::SendToWorker { worker_id, data })
    }

    pub fn stop_worker(&self, worker_id: WorkerId) -> EngineResult<()> {
        self.send(Directive::StopWorker { worker_id })
    }

    pub fn stop(&self) -> EngineResult<()> {
        self.send(Directive::Stop)
    }

    pub fn pause(&self, worker_id: Option<WorkerId>) -> EngineResult<()> {
        self.send(Directive::Pause { worker_id })
    }

    pub fn resume(&self, worker_id: Option<WorkerId>) -> EngineResult<()> {
        self.send(Directive::Resume { worker_id })
    }

    pub fn terminate(&self) -> EngineResult<()> {
        self.send(Directive::Terminate)
    }

    /// Break the reactor out of its loop ahead of any queued directives;
    /// workers are force-terminated on the way out
    pub fn kill(&self) -> EngineResult<()> {
        self.kill
            .send_envelope(&Envelope::command(None, Command::Kill))?;
        Ok(())
    }

    /// Where workers send results
    pub fn results_endpoint(&self) -> &str {
        &self.results_endpoint
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct ResultSink;

impl ResultSink {
    /// Bind the sink and strategy endpoints, then start the reactor thread
    ///
    /// `worker_program` is the worker binary (plus any fixed arguments); the
    /// strategy appends the channel addresses each worker needs.
    pub fn spawn(
        config: EngineConfig,
        strategy: Box<dyn DispatchStrategy>,
        worker_program: WorkerCommand,
    ) -> EngineResult<(SinkHandle, Receiver<SinkEvent>, JoinHandle<()>)> {
        Self::spawn_with_log_collector(config, strategy, worker_program, None)
    }

    /// As [`ResultSink::spawn`], with workers publishing their logs to the
    /// collector at `log_endpoint`
    pub fn spawn_with_log_collector(
        config: EngineConfig,
        mut strategy: Box<dyn DispatchStrategy>,
        worker_program: WorkerCommand,
        log_endpoint: Option<String>,
    ) -> EngineResult<(SinkHandle, Receiver<SinkEvent>, JoinHandle<()>)> {
        let context = Arc::new(zmq::Context::new());
        let transport = &config.transport;
        let label = strategy.name();

        let mut results = ZmqPull::new(
            Arc::clone(&context),
            TransportConfig::bind(transport.bind_address()).with_recv_hwm(transport.recv_hwm),
        )?;
        results.start()?;
        let results_endpoint = results
            .endpoint()
            .ok_or(EngineError::Transport(TransportError::NotRunning))?;

        let control_address = format!(
            "inproc://procflow-sink-{}",
            SINK_SEQUENCE.fetch_add(1, Ordering::SeqCst)
        );
        let mut control = ZmqPull::new(Arc::clone(&context), TransportConfig::bind(control_address.clone()))?;
        control.start()?;
        let mut control_sender = ZmqPush::new(Arc::clone(&context), TransportConfig::connect(control_address))?;
        control_sender.start()?;
        let mut kill = ZmqPush::new(Arc::clone(&context), TransportConfig::connect(results_endpoint.clone()))?;
        kill.start()?;

        strategy.open(&context, &config)?;

        let (events_tx, events_rx) = channel::unbounded();
        let core = ManagerCore::new(
            &context,
            config,
            label,
            worker_program,
            results_endpoint.clone(),
            log_endpoint,
            events_tx,
        )?;
        let manager = Manager::new(core, strategy);

        let running = Arc::new(AtomicBool::new(true));
        let reactor_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name(format!("procflow-sink-{}", label))
            .spawn(move || {
                // Keep the context alive for as long as the reactor's sockets
                let _context = context;
                run_reactor(manager, results, control, reactor_running);
            })?;

        info!("🦀 [SINK] [{}] Collecting results on {}", label, results_endpoint);

        let handle = SinkHandle {
            control: control_sender,
            kill,
            results_endpoint,
            running,
        };
        Ok((handle, events_rx, thread))
    }
}

fn run_reactor(mut manager: Manager, results: ZmqPull, control: ZmqPull, running: Arc<AtomicBool>) {
    let label = manager.strategy_name();
    let poll_interval = manager.core.config().transport.poll_interval();
    debug!("🦀 [SINK] [{}] Reactor started", label);

    loop {
        let ready = match poll_readable(&[&results as &dyn Pollable, &control], Some(poll_interval)) {
            Ok(ready) => ready,
            Err(e) => {
                error!("🦀 [SINK] [{}] Poll failed: {}", label, e);
                break;
            }
        };

        if ready[0] && drain_results(&mut manager, &results).is_break() {
            break;
        }
        if ready[1] {
            drain_control(&mut manager, &control);
        }
        if !ready[0] && !ready[1] && manager.core.is_terminating() && manager.core.check_for_crashed() {
            break;
        }
    }

    running.store(false, Ordering::SeqCst);
    manager.core.shutdown();
    info!("🦀 [SINK] [{}] Terminated", label);
}

fn drain_results(manager: &mut Manager, results: &ZmqPull) -> ControlFlow<()> {
    loop {
        let envelope = match results.try_recv_envelope() {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return ControlFlow::Continue(()),
            Err(TransportError::InvalidMessage(e)) => {
                error!("🦀 [SINK] Protocol violation on result stream: {}", e);
                continue;
            }
            Err(e) => {
                error!("🦀 [SINK] Result receive failed: {}", e);
                return ControlFlow::Continue(());
            }
        };

        match (envelope.worker_id, envelope.payload) {
            (_, Payload::Command(Command::Kill)) => {
                debug!("🦀 [SINK] Kill envelope received");
                return ControlFlow::Break(());
            }
            (Some(worker_id), Payload::Data(record)) => {
                manager.core.emit(SinkEvent::Result { worker_id, record });
            }
            (Some(worker_id), Payload::Command(command @ (Command::Stopped | Command::Finished))) => {
                if manager.core.acknowledge(worker_id, command) {
                    return ControlFlow::Break(());
                }
            }
            (worker_id, payload) => error!(
                "🦀 [SINK] Protocol violation: unexpected {:?} from worker {:?}",
                payload, worker_id
            ),
        }
    }
}

fn drain_control(manager: &mut Manager, control: &ZmqPull) {
    loop {
        let directive = match control.try_recv_envelope() {
            Ok(Some(envelope)) => envelope.decode::<Directive>(),
            Ok(None) => return,
            Err(e) => {
                error!("🦀 [SINK] Directive receive failed: {}", e);
                return;
            }
        };
        let directive = match directive {
            Ok(directive) => directive,
            Err(e) => {
                error!("🦀 [SINK] Malformed directive: {}", e);
                continue;
            }
        };
        if let Err(e) = manager.handle(directive) {
            error!("🦀 [SINK] Directive failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_directive_queue_is_busy_not_closed() {
        let context = Arc::new(zmq::Context::new());
        // Nobody reads the control channel, as while the reactor is stuck in a handshake
        let mut backlog = ZmqPull::new(
            Arc::clone(&context),
            TransportConfig::bind("inproc://sink-busy-test").with_recv_hwm(1),
        )
        .unwrap();
        backlog.start().unwrap();
        let mut control = ZmqPush::new(
            Arc::clone(&context),
            TransportConfig::connect("inproc://sink-busy-test").with_send_hwm(1),
        )
        .unwrap();
        control.start().unwrap();
        let mut kill = ZmqPush::new(context, TransportConfig::connect("inproc://sink-busy-test-kill")).unwrap();
        kill.start().unwrap();

        let handle = SinkHandle {
            control,
            kill,
            results_endpoint: "inproc://sink-busy-test-kill".to_string(),
            running: Arc::new(AtomicBool::new(true)),
        };

        let mut outcome = Ok(());
        for _ in 0..10_000 {
            outcome = handle.start();
            if outcome.is_err() {
                break;
            }
        }
        assert!(matches!(outcome, Err(EngineError::SinkBusy)));
        assert!(handle.is_running());

        handle.running.store(false, Ordering::SeqCst);
        assert!(matches!(handle.start(), Err(EngineError::SinkClosed)));
    }
}
