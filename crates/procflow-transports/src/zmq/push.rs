// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ PUSH endpoint
//!
//! Workers push results to the sink; the daemon manager pushes tasks to its
//! worker; the application pushes directives to the sink over `inproc://`.

use super::socket::SocketCore;

/// ZMQ PUSH socket implementation (sender)
pub struct ZmqPush {
    core: SocketCore,
}

zmq_endpoint!(ZmqPush, ::zmq::PUSH, "PUSH", "zmq-push");
zmq_envelope_sender!(ZmqPush);
