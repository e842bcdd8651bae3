// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process Supervisor
//!
//! Tracks one OS child process per worker id. Children are launched with the
//! engine's own command-line contract (see [`crate::agent::AgentArgs`]) and, on
//! Linux, receive SIGTERM if the controller dies first.
//!
//! Liveness is boolean: a child that already exited is reaped the moment it is
//! observed, so there is no separate zombie state to track.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use procflow_transports::WorkerId;

use crate::error::{EngineError, EngineResult};

const WAIT_POLL: Duration = Duration::from_millis(10);

/// Program, arguments and extra environment of a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `--flag value`
    pub fn flag(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Human-readable command line for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.env.iter().map(|(k, v)| (k, v)));

        #[cfg(target_os = "linux")]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: prctl is async-signal-safe; nothing else runs between fork and exec
            unsafe {
                command.pre_exec(|| {
                    nix::sys::prctl::set_pdeathsig(Signal::SIGTERM).map_err(std::io::Error::from)
                });
            }
        }

        command
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// Exit code, `None` when killed by a signal
    Exited(Option<i32>),
}

/// Outcome of [`Supervisor::force_terminate_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationReport {
    /// Already gone when termination started
    pub already_exited: usize,
    /// Exited within the grace window after SIGTERM
    pub terminated: usize,
    /// Still running after the grace window and killed
    pub killed: usize,
}

impl TerminationReport {
    pub fn total(&self) -> usize {
        self.already_exited + self.terminated + self.killed
    }
}

struct ProcessHandle {
    child: Child,
    command_line: String,
}

impl ProcessHandle {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn status(&mut self) -> ProcessStatus {
        match self.child.try_wait() {
            Ok(None) => ProcessStatus::Running,
            Ok(Some(status)) => ProcessStatus::Exited(status.code()),
            // No longer ours to wait on
            Err(_) => ProcessStatus::Exited(None),
        }
    }

    fn terminate(&self) {
        let pid = Pid::from_raw(self.pid() as i32);
        if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
            debug!("🦀 [SUPERVISOR] SIGTERM to {} failed: {}", pid, e);
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!("🦀 [SUPERVISOR] kill of {} failed: {}", self.pid(), e);
        }
        let _ = self.child.wait();
    }

    /// Poll for exit until `deadline`
    fn wait_until(&mut self, deadline: Instant) -> bool {
        loop {
            if let ProcessStatus::Exited(_) = self.status() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(WAIT_POLL);
        }
    }
}

/// Owns every worker process a manager launched
pub struct Supervisor {
    label: String,
    grace: Duration,
    processes: HashMap<WorkerId, ProcessHandle>,
}

impl Supervisor {
    /// `grace` is the window [`Drop`] gives stragglers before killing them
    pub fn new(label: impl Into<String>, grace: Duration) -> Self {
        Self {
            label: label.into(),
            grace,
            processes: HashMap::new(),
        }
    }

    pub fn spawn(&mut self, worker_id: WorkerId, command: &WorkerCommand) -> EngineResult<u32> {
        if self.processes.contains_key(&worker_id) {
            return Err(EngineError::DuplicateWorker(worker_id));
        }

        let command_line = command.command_line();
        let child = command
            .to_command()
            .spawn()
            .map_err(|source| EngineError::Spawn {
                worker_id,
                command: command_line.clone(),
                source,
            })?;
        let pid = child.id();

        info!(
            worker_id,
            pid,
            "🦀 [SUPERVISOR] [{}] Started worker {}",
            self.label,
            command_line
        );
        self.processes.insert(worker_id, ProcessHandle { child, command_line });
        Ok(pid)
    }

    /// Spawn, or log and exit the whole process: a manager without its
    /// workers cannot make progress
    pub fn spawn_or_abort(&mut self, worker_id: WorkerId, command: &WorkerCommand) -> u32 {
        match self.spawn(worker_id, command) {
            Ok(pid) => pid,
            Err(e) => {
                error!("🦀 [SUPERVISOR] [{}] Fatal: {}", self.label, e);
                std::process::exit(1);
            }
        }
    }

    pub fn status(&mut self, worker_id: WorkerId) -> Option<ProcessStatus> {
        self.processes.get_mut(&worker_id).map(ProcessHandle::status)
    }

    pub fn is_alive(&mut self, worker_id: WorkerId) -> bool {
        self.status(worker_id) == Some(ProcessStatus::Running)
    }

    pub fn pid(&self, worker_id: WorkerId) -> Option<u32> {
        self.processes.get(&worker_id).map(ProcessHandle::pid)
    }

    pub fn contains(&self, worker_id: WorkerId) -> bool {
        self.processes.contains_key(&worker_id)
    }

    /// Tracked workers whose process is still running, in id order
    pub fn live_workers(&mut self) -> Vec<WorkerId> {
        let mut live: Vec<WorkerId> = self
            .processes
            .iter_mut()
            .filter_map(|(id, handle)| (handle.status() == ProcessStatus::Running).then_some(*id))
            .collect();
        live.sort_unstable();
        live
    }

    /// Tracked workers whose process has already exited, in id order
    pub fn exited_workers(&mut self) -> Vec<WorkerId> {
        let mut exited: Vec<WorkerId> = self
            .processes
            .iter_mut()
            .filter_map(|(id, handle)| (handle.status() != ProcessStatus::Running).then_some(*id))
            .collect();
        exited.sort_unstable();
        exited
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Stop tracking `worker_id`, giving it `timeout` to exit before it is
    /// killed. Returns `false` when the id was not tracked.
    pub fn reap(&mut self, worker_id: WorkerId, timeout: Duration) -> bool {
        let Some(mut handle) = self.processes.remove(&worker_id) else {
            return false;
        };

        if !handle.wait_until(Instant::now() + timeout) {
            warn!(
                worker_id,
                "🦀 [SUPERVISOR] [{}] Worker did not exit within {:?}, killing {}",
                self.label,
                timeout,
                handle.command_line
            );
            handle.kill();
        }
        true
    }

    /// Terminate every tracked process
    ///
    /// Exited processes are reaped immediately. The rest get SIGTERM and
    /// `grace` to exit; survivors are killed. The table is empty afterwards.
    pub fn force_terminate_all(&mut self, grace: Duration) -> TerminationReport {
        let mut report = TerminationReport::default();
        let mut running = Vec::new();

        for (worker_id, mut handle) in self.processes.drain() {
            match handle.status() {
                ProcessStatus::Exited(_) => report.already_exited += 1,
                ProcessStatus::Running => {
                    handle.terminate();
                    running.push((worker_id, handle));
                }
            }
        }

        let deadline = Instant::now() + grace;
        for (worker_id, mut handle) in running {
            if handle.wait_until(deadline) {
                report.terminated += 1;
            } else {
                debug!(
                    worker_id,
                    "🦀 [SUPERVISOR] [{}] Killing straggler pid {}",
                    self.label,
                    handle.pid()
                );
                handle.kill();
                report.killed += 1;
            }
        }

        if report.total() > 0 {
            debug!(
                "🦀 [SUPERVISOR] [{}] Terminated workers: {:?}",
                self.label, report
            );
        }
        report
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if !self.processes.is_empty() {
            self.force_terminate_all(self.grace);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_millis(500);

    fn sleeper(seconds: u32) -> WorkerCommand {
        WorkerCommand::new("sleep").arg(seconds.to_string())
    }

    fn wait_for_exit(supervisor: &mut Supervisor, worker_id: WorkerId) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.is_alive(worker_id) && Instant::now() < deadline {
            thread::sleep(WAIT_POLL);
        }
    }

    #[test]
    fn test_command_line() {
        let command = WorkerCommand::new("/usr/bin/worker")
            .flag("--receive", "tcp://127.0.0.1:5000")
            .env("PROCFLOW_LOG_LEVEL", "debug");
        assert_eq!(
            command.command_line(),
            "/usr/bin/worker --receive tcp://127.0.0.1:5000"
        );
        assert_eq!(command.env.len(), 1);
    }

    #[test]
    fn test_spawn_and_status() {
        let mut supervisor = Supervisor::new("test", GRACE);
        let pid = supervisor.spawn(1, &sleeper(30)).unwrap();

        assert_eq!(supervisor.pid(1), Some(pid));
        assert!(supervisor.is_alive(1));
        assert_eq!(supervisor.live_workers(), vec![1]);
        assert!(matches!(
            supervisor.spawn(1, &sleeper(30)),
            Err(EngineError::DuplicateWorker(1))
        ));

        let report = supervisor.force_terminate_all(GRACE);
        assert_eq!(report.terminated, 1);
        assert!(supervisor.is_empty());
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let mut supervisor = Supervisor::new("test", GRACE);
        let result = supervisor.spawn(1, &WorkerCommand::new("/nonexistent/procflow-worker"));
        assert!(matches!(result, Err(EngineError::Spawn { worker_id: 1, .. })));
        assert!(supervisor.is_empty());
    }

    #[test]
    fn test_exit_code_is_observed() {
        let mut supervisor = Supervisor::new("test", GRACE);
        supervisor.spawn(4, &WorkerCommand::new("sh").args(["-c", "exit 3"])).unwrap();
        wait_for_exit(&mut supervisor, 4);

        assert_eq!(supervisor.status(4), Some(ProcessStatus::Exited(Some(3))));
        assert!(supervisor.live_workers().is_empty());
        assert_eq!(supervisor.len(), 1);
    }

    #[test]
    fn test_reap_is_exactly_once() {
        let mut supervisor = Supervisor::new("test", GRACE);
        supervisor.spawn(2, &WorkerCommand::new("true")).unwrap();

        assert!(supervisor.reap(2, GRACE));
        assert!(!supervisor.reap(2, GRACE));
        assert!(!supervisor.contains(2));
    }

    #[test]
    fn test_reap_kills_after_timeout() {
        let mut supervisor = Supervisor::new("test", GRACE);
        supervisor.spawn(3, &sleeper(30)).unwrap();

        let started = Instant::now();
        assert!(supervisor.reap(3, Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_force_terminate_with_nothing_tracked() {
        let mut supervisor = Supervisor::new("test", GRACE);
        assert_eq!(supervisor.force_terminate_all(GRACE), TerminationReport::default());
    }

    #[test]
    fn test_force_terminate_kills_sigterm_ignorers() {
        let mut supervisor = Supervisor::new("test", GRACE);
        let stubborn = WorkerCommand::new("sh").args(["-c", "trap '' TERM; sleep 30"]);
        supervisor.spawn(1, &stubborn).unwrap();
        supervisor.spawn(2, &WorkerCommand::new("true")).unwrap();
        wait_for_exit(&mut supervisor, 2);
        // Give the shell time to install its trap
        thread::sleep(Duration::from_millis(200));

        let report = supervisor.force_terminate_all(Duration::from_millis(200));
        assert_eq!(report.already_exited, 1);
        assert_eq!(report.killed, 1);
        assert_eq!(report.terminated, 0);
        assert!(supervisor.is_empty());
    }
}
