// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Engine error types

use procflow_transports::{TransportError, WorkerId};
use thiserror::Error;

use crate::protocol::WorkerLifecycleState;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("System call failed: {0}")]
    Os(#[from] nix::Error),

    #[error("Failed to spawn worker {worker_id} ({command}): {source}")]
    Spawn {
        worker_id: WorkerId,
        command: String,
        source: std::io::Error,
    },

    #[error("Worker {0} is already tracked")]
    DuplicateWorker(WorkerId),

    #[error("Worker {worker_id}: illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        worker_id: WorkerId,
        from: WorkerLifecycleState,
        to: WorkerLifecycleState,
    },

    #[error("Missing worker argument: {0}")]
    MissingArgument(&'static str),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Handshake with {0} timed out")]
    HandshakeTimeout(String),

    #[error("Sink is no longer running")]
    SinkClosed,

    /// The directive queue is full; the reactor is still running
    #[error("Sink directive queue is full")]
    SinkBusy,
}
