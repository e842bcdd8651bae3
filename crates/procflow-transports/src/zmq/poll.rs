// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Readiness polling across several endpoints
//!
//! Every reactor in the engine is a loop around [`poll_readable`].

use parking_lot::MutexGuard;
use std::time::Duration;

use crate::common::{TransportError, TransportResult};

/// An endpoint whose socket can take part in a poll
pub trait Pollable {
    fn poll_socket(&self) -> MutexGuard<'_, Option<zmq::Socket>>;
}

/// Wait until at least one endpoint is readable or `timeout` passes
/// (`None` waits forever)
///
/// Returns one readiness flag per endpoint, in order. The same endpoint must
/// not appear twice.
pub fn poll_readable(
    endpoints: &[&dyn Pollable],
    timeout: Option<Duration>,
) -> TransportResult<Vec<bool>> {
    let guards: Vec<_> = endpoints.iter().map(|e| e.poll_socket()).collect();

    let mut items = Vec::with_capacity(guards.len());
    for guard in &guards {
        let socket = guard.as_ref().ok_or(TransportError::NotRunning)?;
        items.push(socket.as_poll_item(zmq::POLLIN));
    }

    let timeout_ms = timeout.map(|t| t.as_millis() as i64).unwrap_or(-1);
    match zmq::poll(&mut items, timeout_ms) {
        Ok(_) => {}
        // Interrupted by a signal: report nothing ready, callers poll again
        Err(zmq::Error::EINTR) => return Ok(vec![false; items.len()]),
        Err(e) => return Err(e.into()),
    }

    Ok(items.iter().map(|item| item.is_readable()).collect())
}
