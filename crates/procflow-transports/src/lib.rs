// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # procflow-transports
//!
//! Channel endpoints for the procflow orchestration engine. Every endpoint is a
//! ZeroMQ socket carrying 3-frame [`Envelope`]s `[worker_id, tag, body]`.
//!
//! ## Socket patterns
//!
//! - **Push-Pull**: result streams (worker → sink) and the daemon ventilator
//! - **Publish-Subscribe**: pool work/control broadcast, filtered by worker id
//! - **Request-Reply**: startup handshakes (REQ ↔ REP)
//! - **Router**: the LRU load balancer's backend (ROUTER ↔ REQ)
//!
//! Endpoints bound to `tcp://<host>:*` pick an OS-assigned port; read it back
//! with [`Transport::endpoint`] after `start()`.
//!
//! ## Example
//!
//! ```no_run
//! use procflow_transports::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let context = Arc::new(zmq::Context::new());
//! let mut pull = ZmqPull::new(Arc::clone(&context), TransportConfig::bind("tcp://127.0.0.1:*"))?;
//! pull.start()?;
//! let address = pull.endpoint().unwrap();
//!
//! let mut push = ZmqPush::new(context, TransportConfig::connect(address))?;
//! push.start()?;
//! push.send_envelope(&Envelope::data(Some(1), b"result".to_vec()))?;
//!
//! let envelope = pull.recv_envelope_timeout(Duration::from_secs(1))?;
//! assert_eq!(envelope.worker_id, Some(1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod common;
pub mod traits;
pub mod zmq;

pub use common::{
    create_identity, worker_id_from_identity, Command, EndpointMode, Envelope, Payload, Tag,
    TransportConfig, TransportError, TransportResult, WorkerId,
};

pub use traits::{
    EnvelopeReceiver, EnvelopeSender, ReplyServer, RequestClient, RouterServer, Subscriber,
    Transport,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::common::*;
    pub use crate::traits::*;
    pub use crate::zmq::*;
}
