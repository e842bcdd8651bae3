// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! `tracing` layer that forwards worker events to the collector

use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use procflow_config::EngineConfig;
use procflow_observability::{init_logging_with_layers, parse_debug_flags, BoxedLayer, LoggingGuard, LoggingOptions};

use super::publisher::LogPublisher;
use super::record::LogRecord;

pub struct PublishingLayer {
    publisher: Arc<LogPublisher>,
    component: String,
}

impl PublishingLayer {
    pub fn new(publisher: Arc<LogPublisher>, component: impl Into<String>) -> Self {
        Self {
            publisher,
            component: component.into(),
        }
    }
}

impl<S: Subscriber> Layer<S> for PublishingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord::new(
            event.metadata().level().to_string(),
            self.component.as_str(),
            visitor.finish(),
        );
        // Logging must never take the worker down
        let _ = self.publisher.publish(&record);
    }
}

/// Message text followed by the remaining fields as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        format!("{} {}", self.message, self.fields.join(" "))
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// Keeps worker logging alive; dropping it announces the publisher's departure
pub struct WorkerLogging {
    _guard: LoggingGuard,
    publisher: Option<Arc<LogPublisher>>,
}

impl WorkerLogging {
    pub fn publisher_address(&self) -> Option<&str> {
        self.publisher.as_deref().map(LogPublisher::address)
    }
}

impl Drop for WorkerLogging {
    fn drop(&mut self) {
        if let Some(publisher) = &self.publisher {
            publisher.close();
        }
    }
}

pub fn logging_options(config: &EngineConfig) -> LoggingOptions {
    let mut options = LoggingOptions::with_level(config.logging.level.clone());
    if let Some(dir) = &config.logging.log_dir {
        options = options.log_dir(dir);
    }
    options.file_logging = config.logging.file_logging;
    options
}

/// Console logging for a worker process, plus publishing to `collector` when given
pub fn init_worker_logging(
    context: &Arc<zmq::Context>,
    collector: Option<&str>,
    component: &str,
    config: &EngineConfig,
) -> anyhow::Result<WorkerLogging> {
    let publisher = match collector {
        Some(address) => Some(Arc::new(LogPublisher::new(
            Arc::clone(context),
            address,
            &config.transport,
        )?)),
        None => None,
    };

    let layers: Vec<BoxedLayer> = publisher
        .iter()
        .map(|p| Box::new(PublishingLayer::new(Arc::clone(p), component)) as BoxedLayer)
        .collect();

    let guard = init_logging_with_layers(&parse_debug_flags(), logging_options(config), layers)?;
    Ok(WorkerLogging {
        _guard: guard,
        publisher,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_options_follow_config() {
        let mut config = EngineConfig::default();
        config.logging.level = "debug".to_string();
        let options = logging_options(&config);
        assert_eq!(options.level, "debug");
        assert!(!options.file_logging);

        config.logging.log_dir = Some("/tmp/procflow-logs".into());
        config.logging.file_logging = true;
        let options = logging_options(&config);
        assert!(options.file_logging);
        assert_eq!(options.log_dir.as_deref(), Some(std::path::Path::new("/tmp/procflow-logs")));
    }
}
