// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Socket lifecycle shared by every ZMQ endpoint

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::common::{EndpointMode, TransportConfig, TransportError, TransportResult};

pub(crate) struct SocketCore {
    context: Arc<zmq::Context>,
    config: TransportConfig,
    kind: zmq::SocketType,
    label: &'static str,
    socket: Arc<Mutex<Option<zmq::Socket>>>,
    running: Arc<Mutex<bool>>,
    endpoint: Arc<Mutex<Option<String>>>,
}

impl SocketCore {
    pub(crate) fn new(
        context: Arc<zmq::Context>,
        config: TransportConfig,
        kind: zmq::SocketType,
        label: &'static str,
    ) -> TransportResult<Self> {
        config.validate()?;

        Ok(Self {
            context,
            config,
            kind,
            label,
            socket: Arc::new(Mutex::new(None)),
            running: Arc::new(Mutex::new(false)),
            endpoint: Arc::new(Mutex::new(None)),
        })
    }

    pub(crate) fn start(&mut self) -> TransportResult<()> {
        if *self.running.lock() {
            return Err(TransportError::AlreadyRunning);
        }

        let socket = self
            .context
            .socket(self.kind)
            .map_err(|e| TransportError::InitializationFailed(e.to_string()))?;

        let linger = self
            .config
            .linger
            .map(|l| l.as_millis() as i32)
            .unwrap_or(0);
        socket.set_linger(linger)?;
        socket.set_sndhwm(self.config.send_hwm as i32)?;
        socket.set_rcvhwm(self.config.recv_hwm as i32)?;
        if let Some(identity) = &self.config.identity {
            socket.set_identity(identity)?;
        }

        let address = &self.config.address;
        let resolved = match self.config.mode {
            EndpointMode::Bind => {
                socket
                    .bind(address)
                    .map_err(|e| TransportError::BindFailed(format!("{}: {}", address, e)))?;
                let last = socket
                    .get_last_endpoint()?
                    .map_err(|_| TransportError::BindFailed(format!("{}: unreadable endpoint", address)))?;
                debug!("🦀 [ZMQ-{}] Listening on {}", self.label, last);
                Some(last)
            }
            EndpointMode::Connect if address.is_empty() => None,
            EndpointMode::Connect => {
                socket
                    .connect(address)
                    .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", address, e)))?;
                debug!("🦀 [ZMQ-{}] Connected to {}", self.label, address);
                Some(address.clone())
            }
        };

        *self.socket.lock() = Some(socket);
        *self.endpoint.lock() = resolved;
        *self.running.lock() = true;

        Ok(())
    }

    pub(crate) fn stop(&mut self) -> TransportResult<()> {
        *self.running.lock() = false;
        *self.socket.lock() = None;
        Ok(())
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.running.lock()
    }

    pub(crate) fn endpoint(&self) -> Option<String> {
        self.endpoint.lock().clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Option<zmq::Socket>> {
        self.socket.lock()
    }

    /// Run `f` against the live socket
    pub(crate) fn with_socket<R>(
        &self,
        f: impl FnOnce(&zmq::Socket) -> TransportResult<R>,
    ) -> TransportResult<R> {
        let guard = self.socket.lock();
        let socket = guard.as_ref().ok_or(TransportError::NotRunning)?;
        f(socket)
    }

    pub(crate) fn send_frames(&self, frames: Vec<Vec<u8>>, flags: i32) -> TransportResult<()> {
        self.with_socket(|socket| {
            socket.send_multipart(frames, flags).map_err(|e| match e {
                zmq::Error::EAGAIN => TransportError::WouldBlock,
                other => TransportError::SendFailed(other.to_string()),
            })
        })
    }

    /// Blocking receive; `timeout` bounds the wait
    pub(crate) fn recv_frames(&self, timeout: Option<Duration>) -> TransportResult<Vec<Vec<u8>>> {
        self.with_socket(|socket| {
            if let Some(timeout) = timeout {
                let items = &mut [socket.as_poll_item(zmq::POLLIN)];
                zmq::poll(items, timeout.as_millis() as i64)?;
                if !items[0].is_readable() {
                    return Err(TransportError::Timeout);
                }
            }
            socket
                .recv_multipart(0)
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))
        })
    }

    pub(crate) fn try_recv_frames(&self) -> TransportResult<Option<Vec<Vec<u8>>>> {
        self.with_socket(|socket| match socket.recv_multipart(zmq::DONTWAIT) {
            Ok(frames) => Ok(Some(frames)),
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
        })
    }
}
