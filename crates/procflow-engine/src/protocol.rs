// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared protocol vocabulary
//!
//! Application directives to a manager, and the lifecycle every worker moves
//! through as the manager sees it:
//!
//! ```text
//! spawned ─► synchronizing ─► ready ─► running ⇄ paused
//!    └──────────(daemon)──────►┘          │        │
//!                                         ▼        ▼
//!                                       stopping ◄─┘
//!                                         │
//!                                   stopped | finished
//! ```

use serde::{Deserialize, Serialize};

use procflow_transports::WorkerId;

use crate::error::{EngineError, EngineResult};

/// Opaque task or result payload; the engine never looks inside
pub type Record = Vec<u8>;

/// Id the single daemon worker uses on its result stream
pub const DAEMON_WORKER_ID: WorkerId = 0;

/// Control operations an application issues to a manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    /// Launch the daemon worker
    Start,
    /// Spawn a pool worker, synchronize with it, then hand it `initial`
    StartWorker { worker_id: WorkerId, initial: Record },
    /// Deliver a record; `None` addresses every worker that accepts data
    SendToWorker {
        worker_id: Option<WorkerId>,
        data: Record,
    },
    StopWorker { worker_id: WorkerId },
    /// Graceful shutdown of every worker, then of the sink
    Stop,
    Pause { worker_id: Option<WorkerId> },
    Resume { worker_id: Option<WorkerId> },
    /// Force-kill every worker without waiting for acknowledgments
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerLifecycleState {
    Spawned,
    Synchronizing,
    Ready,
    Running,
    Paused,
    Stopping,
    Stopped,
    Finished,
}

impl WorkerLifecycleState {
    pub fn can_transition(self, to: Self) -> bool {
        use WorkerLifecycleState::*;
        matches!(
            (self, to),
            (Spawned, Synchronizing)
                | (Spawned, Ready)
                | (Synchronizing, Ready)
                | (Ready, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Finished)
                | (Spawned | Synchronizing | Ready | Running | Paused, Stopping)
                | (Stopping, Stopped)
                | (Stopping, Finished)
        )
    }

    /// Move to `to`, rejecting moves outside the lifecycle graph
    pub fn transition(&mut self, worker_id: WorkerId, to: Self) -> EngineResult<()> {
        if !self.can_transition(to) {
            return Err(EngineError::IllegalTransition {
                worker_id,
                from: *self,
                to,
            });
        }
        *self = to;
        Ok(())
    }

    /// Whether the manager may still hand this worker data
    pub fn accepts_data(self) -> bool {
        !matches!(
            self,
            WorkerLifecycleState::Stopping
                | WorkerLifecycleState::Stopped
                | WorkerLifecycleState::Finished
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerLifecycleState::Stopped | WorkerLifecycleState::Finished
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkerLifecycleState::*;

    #[test]
    fn test_pool_lifecycle() {
        let mut state = Spawned;
        for next in [Synchronizing, Ready, Running, Paused, Running, Stopping, Stopped] {
            state.transition(1, next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_daemon_skips_synchronizing() {
        let mut state = Spawned;
        state.transition(0, Ready).unwrap();
        state.transition(0, Running).unwrap();
        state.transition(0, Finished).unwrap();
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut state = Stopped;
        let err = state.transition(3, Running).unwrap_err();
        assert!(matches!(
            err,
            EngineError::IllegalTransition { worker_id: 3, from: Stopped, to: Running }
        ));
        assert_eq!(state, Stopped);

        let mut paused = Paused;
        assert!(paused.transition(3, Finished).is_err());
        assert!(Ready.can_transition(Stopping));
        assert!(!Stopping.can_transition(Running));
    }

    #[test]
    fn test_accepts_data() {
        assert!(Running.accepts_data());
        assert!(Paused.accepts_data());
        assert!(!Stopping.accepts_data());
        assert!(!Finished.accepts_data());
    }

    #[test]
    fn test_directive_json_shape() {
        let json = serde_json::to_string(&Directive::Pause { worker_id: Some(2) }).unwrap();
        assert_eq!(json, r#"{"directive":"pause","worker_id":2}"#);

        let parsed: Directive = serde_json::from_str(r#"{"directive":"stop"}"#).unwrap();
        assert_eq!(parsed, Directive::Stop);
    }
}
