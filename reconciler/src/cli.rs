// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! IPAM CLI options.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    provider::{Provider, ProviderConfig},
    resource::{
        ReadOutcome, Reconciler,
        allocation::{AllocationConfig, AllocationState},
        pool::{PoolConfig, PoolState},
    },
};

/// Manage CIDR pools and allocations.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Opts {
    /// Top-level subcommand
    #[command(subcommand)]
    pub command: Commands,

    /// The allocator state file.
    #[arg(long, global = true)]
    pub file: Option<PathBuf>,

    /// Logging options
    #[command(flatten)]
    pub logging: LoggingOptions,
}

impl Opts {
    /// The provider configuration selected by the options.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            file: self.file.clone(),
        }
    }
}

/// Logging options.
#[derive(Debug, Args)]
pub struct LoggingOptions {
    /// Log to stderr.
    #[arg(long, global = true)]
    pub stderr: bool,

    /// Directory for the log file.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage pools.
    #[command(subcommand)]
    Pool(PoolCommand),
    /// Manage allocations.
    #[command(subcommand)]
    Allocation(AllocationCommand),
}

/// Pool subcommands.
#[derive(Debug, Subcommand)]
pub enum PoolCommand {
    /// Register a pool.
    Create {
        /// The CIDR block of the pool.
        #[arg(long)]
        cidr: String,
    },
    /// Refresh a pool.
    Read {
        /// The CIDR block of the pool.
        #[arg(long)]
        cidr: String,
    },
    /// Remove a pool.
    Delete {
        /// The CIDR block of the pool.
        #[arg(long)]
        cidr: String,
    },
    /// Import an existing pool.
    Import {
        /// The pool identifier.
        id: String,
    },
}

/// Allocation subcommands.
#[derive(Debug, Subcommand)]
pub enum AllocationCommand {
    /// Allocate a block from a pool.
    Create {
        /// The pool to allocate from.
        #[arg(long)]
        pool_id: String,
        /// The prefix length of the allocation.
        #[arg(long, allow_negative_numbers = true)]
        size: i64,
    },
    /// Refresh an allocation.
    Read {
        /// The pool the allocation was carved from.
        #[arg(long)]
        pool_id: String,
        /// The allocated block.
        #[arg(long)]
        cidr: String,
    },
    /// Release an allocation.
    Delete {
        /// The pool the allocation was carved from.
        #[arg(long)]
        pool_id: String,
        /// The allocated block.
        #[arg(long)]
        cidr: String,
    },
    /// Import an existing allocation.
    Import {
        /// The allocation identifier.
        id: String,
    },
}

impl Commands {
    /// Runs the command and returns what should be printed.
    pub async fn execute(
        self,
        provider: &Provider,
        cancel: &CancellationToken,
    ) -> anyhow::Result<String> {
        match self {
            Commands::Pool(command) => command.execute(provider, cancel).await,
            Commands::Allocation(command) => command.execute(provider, cancel).await,
        }
    }
}

impl PoolCommand {
    async fn execute(self, provider: &Provider, cancel: &CancellationToken) -> anyhow::Result<String> {
        let pools = provider.pools();
        match self {
            PoolCommand::Create { cidr } => render(&pools.create(cancel, &PoolConfig { cidr }).await?),
            PoolCommand::Read { cidr } => {
                let state = PoolState {
                    id: cidr.clone(),
                    cidr,
                };
                render_outcome(pools.read(cancel, &state).await?)
            }
            PoolCommand::Delete { cidr } => {
                let state = PoolState {
                    id: cidr.clone(),
                    cidr,
                };
                pools.delete(cancel, &state).await?;
                Ok(format!("pool {} deleted", state.cidr))
            }
            PoolCommand::Import { id } => render_outcome(pools.import(cancel, &id).await?),
        }
    }
}

impl AllocationCommand {
    async fn execute(self, provider: &Provider, cancel: &CancellationToken) -> anyhow::Result<String> {
        let allocations = provider.allocations();
        match self {
            AllocationCommand::Create { pool_id, size } => {
                render(
                    &allocations
                        .create(cancel, &AllocationConfig { pool_id, size })
                        .await?,
                )
            }
            AllocationCommand::Read { pool_id, cidr } => {
                render_outcome(allocations.read(cancel, &tracked(pool_id, cidr)).await?)
            }
            AllocationCommand::Delete { pool_id, cidr } => {
                let state = tracked(pool_id, cidr);
                allocations.delete(cancel, &state).await?;
                Ok(format!("allocation {} deleted", state.cidr))
            }
            AllocationCommand::Import { id } => render_outcome(allocations.import(cancel, &id).await?),
        }
    }
}

fn tracked(pool_id: String, cidr: String) -> AllocationState {
    AllocationState {
        pool_id: Some(pool_id),
        size: None,
        id: cidr.clone(),
        cidr,
    }
}

fn render<S: Serialize>(state: &S) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(state)?)
}

fn render_outcome<S: Serialize>(outcome: ReadOutcome<S>) -> anyhow::Result<String> {
    match outcome {
        ReadOutcome::Present(state) => render(&state),
        ReadOutcome::Gone => Ok("resource is gone".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use clap::CommandFactory;
    use ipam_prefix_manager::store::PrefixStore;
    use test_log::test;

    use super::*;
    use crate::guard::RwLockGuard;

    #[test]
    fn should_verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn should_parse_global_file() {
        let opts = Opts::parse_from([
            "ipam",
            "allocation",
            "create",
            "--pool-id",
            "10.0.0.0/16",
            "--size",
            "24",
            "--file",
            "/tmp/state.json",
        ]);
        assert_eq!(
            opts.provider_config().file,
            Some(PathBuf::from("/tmp/state.json"))
        );
        assert!(matches!(
            opts.command,
            Commands::Allocation(AllocationCommand::Create { size: 24, .. })
        ));
    }

    #[test(tokio::test)]
    async fn should_execute_commands() {
        let provider = Provider::new(
            Arc::new(PrefixStore::in_memory()),
            Arc::new(RwLockGuard::new()),
        );
        let cancel = CancellationToken::new();
        let (provider, cancel) = (&provider, &cancel);
        let run = move |args: &[&str]| {
            let opts = Opts::parse_from(std::iter::once("ipam").chain(args.iter().copied()));
            opts.command.execute(provider, cancel)
        };

        let out = run(&["pool", "create", "--cidr", "10.0.0.0/16"])
            .await
            .unwrap();
        let state: PoolState = serde_json::from_str(&out).unwrap();
        assert_eq!(state.id, "10.0.0.0/16");

        let out = run(&["allocation", "create", "--pool-id", "10.0.0.0/16", "--size", "24"])
            .await
            .unwrap();
        let state: AllocationState = serde_json::from_str(&out).unwrap();
        assert_eq!(state.cidr, "10.0.0.0/24");

        assert!(
            run(&["pool", "delete", "--cidr", "10.0.0.0/16"])
                .await
                .is_err()
        );
        run(&["allocation", "delete", "--pool-id", "10.0.0.0/16", "--cidr", "10.0.0.0/24"])
            .await
            .unwrap();
        run(&["pool", "delete", "--cidr", "10.0.0.0/16"])
            .await
            .unwrap();

        assert_eq!(
            run(&["pool", "read", "--cidr", "10.0.0.0/16"])
                .await
                .unwrap(),
            "resource is gone"
        );
    }
}
