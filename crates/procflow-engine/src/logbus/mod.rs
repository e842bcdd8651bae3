// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cross-process log aggregation
//!
//! Each worker publishes its `tracing` events on a PUB endpoint of its own and
//! announces that endpoint to the controller's [`LogCollector`], which
//! subscribes to every announced publisher and re-emits the records locally.

mod collector;
mod layer;
mod publisher;
mod record;

pub use collector::{LogCollector, LogCollectorHandle};
pub use layer::{init_worker_logging, logging_options, PublishingLayer, WorkerLogging};
pub use publisher::LogPublisher;
pub use record::{LogControl, LogRecord};
