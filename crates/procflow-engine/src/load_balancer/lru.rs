// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Least-recently-used worker queue
//!
//! Pure bookkeeping, no sockets. A worker identity is in at most one of
//! `idle` or `busy`, and appears in `idle` at most once, so no worker is ever
//! handed a second request before replying to the first.

use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::{debug, warn};

use procflow_transports::{worker_id_from_identity, Command, Envelope, WorkerId};

/// What the reactor must do after a backend reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyAction {
    /// Worker went back to the idle queue
    Idle,
    /// Termination is under way: send this worker STOP
    SendStop(Vec<u8>),
    /// Worker acknowledged STOP
    Stopped(Option<WorkerId>),
}

#[derive(Debug, Default)]
pub struct LruQueue {
    idle: VecDeque<Vec<u8>>,
    busy: HashSet<Vec<u8>>,
    terminating: bool,
    /// Sent STOP, acknowledgment outstanding
    stopping: HashSet<Vec<u8>>,
    stopped: BTreeSet<WorkerId>,
}

impl LruQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a reply from `identity` on the backend
    pub fn on_worker_reply(&mut self, identity: Vec<u8>, reply: &Envelope) -> ReplyAction {
        self.busy.remove(&identity);

        if reply.is_command(Command::Stopped) {
            self.stopping.remove(&identity);
            self.idle.retain(|queued| *queued != identity);
            let worker_id = worker_id_from_identity(&identity);
            if let Some(id) = worker_id {
                self.stopped.insert(id);
            }
            debug!("🦀 [LRU] {} stopped", String::from_utf8_lossy(&identity));
            return ReplyAction::Stopped(worker_id);
        }

        if self.terminating {
            // Busy when termination started; stop it now that it replied
            self.stopping.insert(identity.clone());
            return ReplyAction::SendStop(identity);
        }

        if self.idle.contains(&identity) {
            warn!(
                "🦀 [LRU] Protocol violation: {} replied while idle",
                String::from_utf8_lossy(&identity)
            );
        } else {
            self.idle.push_back(identity);
        }
        ReplyAction::Idle
    }

    /// Pop the least recently used idle worker for the next request
    pub fn dispatch(&mut self) -> Option<Vec<u8>> {
        if self.terminating {
            return None;
        }
        let identity = self.idle.pop_front()?;
        self.busy.insert(identity.clone());
        Some(identity)
    }

    /// Drop a worker that exited on its own. Returns `true` when it was busy,
    /// meaning its request is lost.
    pub fn forget(&mut self, identity: &[u8]) -> bool {
        self.idle.retain(|queued| queued.as_slice() != identity);
        self.stopping.remove(identity);
        self.busy.remove(identity)
    }

    /// Whether the frontend should be read at all
    pub fn accepting(&self) -> bool {
        !self.terminating && !self.idle.is_empty()
    }

    /// Enter termination; returns the idle workers to send STOP right away
    pub fn begin_termination(&mut self) -> Vec<Vec<u8>> {
        self.terminating = true;
        let idle: Vec<Vec<u8>> = self.idle.drain(..).collect();
        self.stopping.extend(idle.iter().cloned());
        idle
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    /// Termination started and no worker is busy or awaiting acknowledgment
    pub fn all_stopped(&self) -> bool {
        self.terminating && self.stopping.is_empty() && self.busy.is_empty()
    }

    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub fn busy_len(&self) -> usize {
        self.busy.len()
    }

    pub fn is_busy(&self, identity: &[u8]) -> bool {
        self.busy.contains(identity)
    }

    pub fn stopped(&self) -> &BTreeSet<WorkerId> {
        &self.stopped
    }
}
