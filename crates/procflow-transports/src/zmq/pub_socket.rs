// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ PUB endpoint
//!
//! The first envelope frame (the worker id) doubles as the topic, so
//! subscribers filter on their own id.

use super::socket::SocketCore;

/// ZMQ PUB socket implementation (publisher)
pub struct ZmqPub {
    core: SocketCore,
}

zmq_endpoint!(ZmqPub, ::zmq::PUB, "PUB", "zmq-pub");
zmq_envelope_sender!(ZmqPub);
