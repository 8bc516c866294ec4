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
//! Command line host for the IPAM reconcilers.

use anyhow::Context;
use clap::Parser;
use ipam_observability::setup_tracing;
use ipam_reconciler::{cli::Opts, provider::Provider};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    let _log_guards = setup_tracing(opts.logging.log_dir.as_ref(), opts.logging.stderr);

    let provider = Provider::configure(&opts.provider_config())
        .await
        .context("error configuring provider")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received interrupt, cancelling");
                cancel.cancel();
            }
        }
    });

    let output = opts.command.execute(&provider, &cancel).await?;
    println!("{output}");
    Ok(())
}
