// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! LRU load balancer process, launched by `LoadBalancerManager`

use clap::Parser;
use std::sync::Arc;
use tracing::info;

use procflow_engine::agent::worker_config;
use procflow_engine::load_balancer::{run_balancer_process, BalancerArgs};
use procflow_engine::logbus::init_worker_logging;

fn main() -> anyhow::Result<()> {
    let args = BalancerArgs::parse();
    let config = worker_config();

    let context = Arc::new(zmq::Context::new());
    let _logging = init_worker_logging(&context, args.logging.as_deref(), "load-balancer", &config)?;

    let report = run_balancer_process(args, config)?;
    info!(
        "🦀 [LRU] Balancer exiting; {} worker(s) cleaned up ({} already exited)",
        report.total(),
        report.already_exited
    );
    Ok(())
}
