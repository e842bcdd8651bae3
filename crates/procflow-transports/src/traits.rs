// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Endpoint trait definitions
//!
//! These traits define the roles an endpoint can play. Each ZMQ socket type
//! implements the subset that matches its pattern.

use std::time::Duration;

use crate::common::{Envelope, TransportResult};

/// Base transport trait - implemented by all endpoints
pub trait Transport: Send + Sync {
    /// Create the socket and bind or connect it
    fn start(&mut self) -> TransportResult<()>;

    /// Close the socket
    fn stop(&mut self) -> TransportResult<()>;

    fn is_running(&self) -> bool;

    /// Get transport name/type
    fn transport_type(&self) -> &str;

    /// Resolved address after `start()`; wildcard ports are replaced by the
    /// port the OS assigned
    fn endpoint(&self) -> Option<String>;
}

/// Sending side of a stream (PUSH, PUB)
pub trait EnvelopeSender: Transport {
    /// Send, blocking while the high water mark is reached
    fn send_envelope(&self, envelope: &Envelope) -> TransportResult<()>;

    /// Send without blocking; fails with `TransportError::WouldBlock` when the
    /// peer is not accepting
    fn try_send_envelope(&self, envelope: &Envelope) -> TransportResult<()>;
}

/// Receiving side of a stream (PULL, SUB)
pub trait EnvelopeReceiver: Transport {
    fn recv_envelope(&self) -> TransportResult<Envelope>;

    /// Fails with `TransportError::Timeout` when nothing arrives in time
    fn recv_envelope_timeout(&self, timeout: Duration) -> TransportResult<Envelope>;

    /// Non-blocking receive
    fn try_recv_envelope(&self) -> TransportResult<Option<Envelope>>;
}

/// Publish-Subscribe pattern (Subscriber side)
pub trait Subscriber: EnvelopeReceiver {
    /// Subscribe to envelopes whose first frame starts with `prefix`
    fn subscribe(&self, prefix: &[u8]) -> TransportResult<()>;

    fn unsubscribe(&self, prefix: &[u8]) -> TransportResult<()>;

    /// Attach to an additional publisher
    fn connect_to(&self, address: &str) -> TransportResult<()>;

    fn disconnect_from(&self, address: &str) -> TransportResult<()>;
}

/// Request-Reply pattern (Client side)
///
/// A REQ socket strictly alternates send and receive. After a timed-out
/// request the socket cannot send again and must be restarted.
pub trait RequestClient: Transport {
    /// Send a request and block for the reply
    fn request(&self, request: &Envelope) -> TransportResult<Envelope>;

    fn request_timeout(&self, request: &Envelope, timeout: Duration) -> TransportResult<Envelope>;

    /// Send the final message of an exchange without waiting for a reply
    fn send_request(&self, request: &Envelope) -> TransportResult<()>;
}

/// Request-Reply pattern (Server side)
pub trait ReplyServer: Transport {
    fn try_recv_request(&self) -> TransportResult<Option<Envelope>>;

    fn recv_request_timeout(&self, timeout: Duration) -> TransportResult<Envelope>;

    fn reply(&self, reply: &Envelope) -> TransportResult<()>;
}

/// Identity-routed server side (ROUTER)
pub trait RouterServer: Transport {
    /// Receive `(identity, envelope)` from a REQ peer
    fn recv_routed(&self) -> TransportResult<(Vec<u8>, Envelope)>;

    fn try_recv_routed(&self) -> TransportResult<Option<(Vec<u8>, Envelope)>>;

    /// Route `envelope` to the peer with `identity`
    fn send_routed(&self, identity: &[u8], envelope: &Envelope) -> TransportResult<()>;
}
