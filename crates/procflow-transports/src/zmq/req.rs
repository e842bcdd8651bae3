// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ REQ endpoint
//!
//! Used for the pool startup handshake and by load-balanced workers, whose
//! "request" is their reply to the previous task.

use std::time::Duration;

use super::socket::SocketCore;
use crate::common::{Envelope, TransportResult};
use crate::traits::RequestClient;

/// ZMQ REQ socket implementation (client-side request-reply)
pub struct ZmqReq {
    core: SocketCore,
}

zmq_endpoint!(ZmqReq, ::zmq::REQ, "REQ", "zmq-req");

impl RequestClient for ZmqReq {
    fn request(&self, request: &Envelope) -> TransportResult<Envelope> {
        self.send_request(request)?;
        Envelope::from_frames(self.core.recv_frames(None)?)
    }

    fn request_timeout(&self, request: &Envelope, timeout: Duration) -> TransportResult<Envelope> {
        self.send_request(request)?;
        Envelope::from_frames(self.core.recv_frames(Some(timeout))?)
    }

    fn send_request(&self, request: &Envelope) -> TransportResult<()> {
        self.core.send_frames(request.to_frames(), 0)
    }
}
