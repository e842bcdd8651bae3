// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Common types shared by every endpoint

pub mod config;
pub mod envelope;
pub mod error;

pub use config::{EndpointMode, TransportConfig};
pub use envelope::{
    create_identity, worker_id_from_identity, Command, Envelope, Payload, Tag, WorkerId,
};
pub use error::{TransportError, TransportResult};
