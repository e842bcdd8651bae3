// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ REP endpoint

use std::time::Duration;

use super::socket::SocketCore;
use crate::common::{Envelope, TransportResult};
use crate::traits::ReplyServer;

/// ZMQ REP socket implementation (server-side request-reply)
pub struct ZmqRep {
    core: SocketCore,
}

zmq_endpoint!(ZmqRep, ::zmq::REP, "REP", "zmq-rep");

impl ReplyServer for ZmqRep {
    fn try_recv_request(&self) -> TransportResult<Option<Envelope>> {
        self.core
            .try_recv_frames()?
            .map(Envelope::from_frames)
            .transpose()
    }

    fn recv_request_timeout(&self, timeout: Duration) -> TransportResult<Envelope> {
        Envelope::from_frames(self.core.recv_frames(Some(timeout))?)
    }

    fn reply(&self, reply: &Envelope) -> TransportResult<()> {
        self.core.send_frames(reply.to_frames(), 0)
    }
}
