// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reference worker for every dispatch mode

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use procflow_engine::agent::{worker_config, AgentArgs, AgentContext, AgentMode, StopRequested, WorkOutcome, WorkerAgent, WorkerTask};
use procflow_engine::logbus::init_worker_logging;
use procflow_engine::protocol::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DemoMode {
    /// Echo every streamed record back to the sink
    DaemonEcho,
    /// Emit a counted sequence per record, pausable between items
    PoolCounter,
    /// Answer balanced requests with a JSON record; `crash` exits without replying
    LbEcho,
}

#[derive(Parser, Debug)]
#[command(name = "procflow-demo-worker", version, about = "procflow reference worker")]
struct Args {
    #[arg(long, value_enum)]
    mode: DemoMode,

    /// Extra delay per handled record, in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    #[command(flatten)]
    agent: AgentArgs,
}

/// Pool counter job: `count` results spaced `interval_ms` apart
#[derive(Debug, Deserialize)]
struct CountJob {
    count: u64,
    #[serde(default)]
    interval_ms: u64,
    /// Emit FINISHED after the last item instead of waiting for more work
    #[serde(default)]
    finish: bool,
}

#[derive(Debug, Serialize)]
struct CountItem {
    worker_id: u32,
    seq: u64,
}

#[derive(Debug, Serialize)]
struct BalancedReply {
    worker_id: u32,
    request: String,
}

#[derive(Debug, Serialize)]
struct Problem {
    worker_id: u32,
    problem: String,
}

struct DemoTask {
    mode: DemoMode,
    delay: Duration,
}

impl DemoTask {
    fn pause(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }

    fn echo(&self, ctx: &mut AgentContext, record: Record) -> Result<WorkOutcome, StopRequested> {
        self.pause();
        info!("Handled {} byte record", record.len());
        if let Err(e) = ctx.send_result(&record) {
            warn!("Result not delivered: {}", e);
        }
        Ok(WorkOutcome::Idle)
    }

    fn count(&self, ctx: &mut AgentContext, record: Record) -> Result<WorkOutcome, StopRequested> {
        let job: CountJob = match serde_json::from_slice(&record) {
            Ok(job) => job,
            // Anything that is not a job is echoed
            Err(_) => return self.echo(ctx, record),
        };
        debug!("Counting to {} every {} ms", job.count, job.interval_ms);

        for seq in 0..job.count {
            ctx.check_for_controller_directive()?;
            thread::sleep(Duration::from_millis(job.interval_ms));
            let item = CountItem {
                worker_id: ctx.worker_id(),
                seq,
            };
            if let Err(e) = ctx.send_record(&item) {
                warn!("Item {} not delivered: {}", seq, e);
            }
        }

        if job.finish {
            Ok(WorkOutcome::Finished)
        } else {
            Ok(WorkOutcome::Idle)
        }
    }

    fn reply(&self, ctx: &mut AgentContext, record: Record) -> Result<WorkOutcome, StopRequested> {
        self.pause();
        let request = String::from_utf8_lossy(&record).into_owned();
        let worker_id = ctx.worker_id();
        if request == "crash" {
            warn!("Exiting without a reply");
            std::process::exit(3);
        }

        let sent = if request == "fail" {
            warn!("Request rejected");
            ctx.send_record(&Problem {
                worker_id,
                problem: "request rejected".to_string(),
            })
        } else {
            info!("Handled request {}", request);
            ctx.send_record(&BalancedReply { worker_id, request })
        };
        if let Err(e) = sent {
            warn!("Reply not delivered: {}", e);
        }
        Ok(WorkOutcome::Idle)
    }
}

impl WorkerTask for DemoTask {
    fn do_work(&mut self, ctx: &mut AgentContext, record: Record) -> Result<WorkOutcome, StopRequested> {
        match self.mode {
            DemoMode::DaemonEcho => self.echo(ctx, record),
            DemoMode::PoolCounter => self.count(ctx, record),
            DemoMode::LbEcho => self.reply(ctx, record),
        }
    }

    fn cleanup_pre_stop(&mut self) {
        debug!("Releasing demo resources");
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = worker_config();

    let agent_mode = match args.mode {
        DemoMode::DaemonEcho => AgentMode::Daemon,
        DemoMode::PoolCounter => AgentMode::Pool,
        DemoMode::LbEcho => AgentMode::LoadBalanced,
    };
    let worker_id = args.agent.filter.or(args.agent.identity).unwrap_or(0);

    let _logging = init_worker_logging(
        &Arc::new(zmq::Context::new()),
        args.agent.logging.as_deref(),
        &format!("demo-worker-{}", worker_id),
        &config,
    )?;

    let agent = WorkerAgent::connect(agent_mode, &args.agent, &config)?;
    let mut task = DemoTask {
        mode: args.mode,
        delay: Duration::from_millis(args.delay_ms),
    };
    let exit = agent.run(&mut task)?;
    info!("🦀 [DEMO] Worker {} exiting: {:?}", worker_id, exit);
    Ok(())
}
