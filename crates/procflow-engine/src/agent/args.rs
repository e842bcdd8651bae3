// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Worker command-line contract
//!
//! Managers render an [`AgentArgs`] onto the worker's command line; worker
//! binaries flatten it into their own clap parser.

use clap::Args;

use procflow_transports::WorkerId;

use crate::supervisor::WorkerCommand;

#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct AgentArgs {
    /// Address of the work channel (daemon PULL or pool SUB)
    #[arg(long)]
    pub receive: Option<String>,

    /// Address of the result sink
    #[arg(long)]
    pub send: Option<String>,

    /// Address of the pool control channel
    #[arg(long)]
    pub controller: Option<String>,

    /// Address of the pool startup synchronization service
    #[arg(long)]
    pub syncclient: Option<String>,

    /// Pool worker id, also the subscription filter
    #[arg(long)]
    pub filter: Option<WorkerId>,

    /// Load balancer backend address
    #[arg(long)]
    pub request: Option<String>,

    /// Load-balanced worker id
    #[arg(long)]
    pub identity: Option<WorkerId>,

    #[arg(long = "worker-type")]
    pub worker_type: Option<String>,

    /// Log collector address
    #[arg(long)]
    pub logging: Option<String>,
}

impl AgentArgs {
    /// Append every set option to `command` as `--name value`
    pub fn apply(&self, mut command: WorkerCommand) -> WorkerCommand {
        let options: [(&str, Option<String>); 9] = [
            ("--receive", self.receive.clone()),
            ("--send", self.send.clone()),
            ("--controller", self.controller.clone()),
            ("--syncclient", self.syncclient.clone()),
            ("--filter", self.filter.map(|id| id.to_string())),
            ("--request", self.request.clone()),
            ("--identity", self.identity.map(|id| id.to_string())),
            ("--worker-type", self.worker_type.clone()),
            ("--logging", self.logging.clone()),
        ];
        for (flag, value) in options {
            if let Some(value) = value {
                command = command.flag(flag, value);
            }
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        agent: AgentArgs,
    }

    #[test]
    fn test_rendered_args_parse_back() {
        let args = AgentArgs {
            receive: Some("tcp://127.0.0.1:4000".to_string()),
            send: Some("tcp://127.0.0.1:4001".to_string()),
            filter: Some(12),
            worker_type: Some("Thumbnail Extractor".to_string()),
            ..Default::default()
        };

        let command = args.apply(WorkerCommand::new("worker"));
        let argv = std::iter::once("worker".to_string()).chain(command.args.iter().cloned());
        let parsed = Cli::try_parse_from(argv).unwrap();

        assert_eq!(parsed.agent, args);
    }

    #[test]
    fn test_unset_options_are_omitted() {
        let command = AgentArgs::default().apply(WorkerCommand::new("worker"));
        assert!(command.args.is_empty());
    }
}
