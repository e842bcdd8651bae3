// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ endpoint implementations
//!
//! | Type | Pattern | Used by |
//! |---|---|---|
//! | [`ZmqPush`] / [`ZmqPull`] | Push-Pull | result streams, daemon ventilator, control handoff |
//! | [`ZmqPub`] / [`ZmqSub`] | Publish-Subscribe | pool ventilator and controller, log records |
//! | [`ZmqReq`] / [`ZmqRep`] | Request-Reply | startup handshakes, load-balanced workers |
//! | [`ZmqRouter`] | Router | load balancer backend |
//!
//! All endpoints of one process share a single `Arc<zmq::Context>`, which is
//! required for `inproc://` addresses.

macro_rules! zmq_endpoint {
    ($name:ident, $kind:expr, $label:literal, $type_name:literal) => {
        impl $name {
            pub fn new(
                context: std::sync::Arc<::zmq::Context>,
                config: $crate::common::TransportConfig,
            ) -> $crate::common::TransportResult<Self> {
                Ok(Self {
                    core: $crate::zmq::socket::SocketCore::new(context, config, $kind, $label)?,
                })
            }
        }

        impl $crate::traits::Transport for $name {
            fn start(&mut self) -> $crate::common::TransportResult<()> {
                self.core.start()
            }

            fn stop(&mut self) -> $crate::common::TransportResult<()> {
                self.core.stop()
            }

            fn is_running(&self) -> bool {
                self.core.is_running()
            }

            fn transport_type(&self) -> &str {
                $type_name
            }

            fn endpoint(&self) -> Option<String> {
                self.core.endpoint()
            }
        }

        impl $crate::zmq::poll::Pollable for $name {
            fn poll_socket(&self) -> parking_lot::MutexGuard<'_, Option<::zmq::Socket>> {
                self.core.lock()
            }
        }
    };
}

macro_rules! zmq_envelope_receiver {
    ($name:ident) => {
        impl $crate::traits::EnvelopeReceiver for $name {
            fn recv_envelope(&self) -> $crate::common::TransportResult<$crate::common::Envelope> {
                $crate::common::Envelope::from_frames(self.core.recv_frames(None)?)
            }

            fn recv_envelope_timeout(
                &self,
                timeout: std::time::Duration,
            ) -> $crate::common::TransportResult<$crate::common::Envelope> {
                $crate::common::Envelope::from_frames(self.core.recv_frames(Some(timeout))?)
            }

            fn try_recv_envelope(
                &self,
            ) -> $crate::common::TransportResult<Option<$crate::common::Envelope>> {
                self.core
                    .try_recv_frames()?
                    .map($crate::common::Envelope::from_frames)
                    .transpose()
            }
        }
    };
}

macro_rules! zmq_envelope_sender {
    ($name:ident) => {
        impl $crate::traits::EnvelopeSender for $name {
            fn send_envelope(
                &self,
                envelope: &$crate::common::Envelope,
            ) -> $crate::common::TransportResult<()> {
                self.core.send_frames(envelope.to_frames(), 0)
            }

            fn try_send_envelope(
                &self,
                envelope: &$crate::common::Envelope,
            ) -> $crate::common::TransportResult<()> {
                self.core.send_frames(envelope.to_frames(), ::zmq::DONTWAIT)
            }
        }
    };
}

pub mod poll;
pub mod pub_socket;
pub mod pull;
pub mod push;
pub mod rep;
pub mod req;
pub mod router;
pub(crate) mod socket;
pub mod sub;

pub use poll::{poll_readable, Pollable};
pub use pub_socket::ZmqPub;
pub use pull::ZmqPull;
pub use push::ZmqPush;
pub use rep::ZmqRep;
pub use req::ZmqReq;
pub use router::ZmqRouter;
pub use sub::ZmqSub;
