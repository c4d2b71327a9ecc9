// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rackwork Worker
//!
//! `rackwork-worker` consumes the worker queue until it fails or is stopped.
//! `rackwork-worker cancel <job-id>` stops a job's process and clears its pid.

use tracing::info;

use rackwork_core::entrypoint::{self, UsageError};
use rackwork_core::{Config, Context};
use rackwork_worker::dispatcher;
use rackwork_worker::runtime::WorkerRuntime;
use rackwork_worker::supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    entrypoint::init_tracing("rackwork_worker=info,rackwork_core=info");
    entrypoint::load_dotenv();

    let config = Config::from_env()?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None => work(config).await,
        Some("cancel") => {
            let id = args
                .get(1)
                .ok_or(UsageError("rackwork-worker cancel <job-id>"))?;
            let ctx = Context::from_config(config).await?;
            let supervisor = supervisor::from_config(&ctx.config)?;
            dispatcher::cancel(&ctx.store, supervisor.as_ref(), id).await?;
            Ok(())
        }
        Some(_) => Err(UsageError("rackwork-worker [cancel <job-id>]").into()),
    }
}

async fn work(config: Config) -> anyhow::Result<()> {
    info!(
        app = %config.app,
        queue = %config.worker_queue,
        development = config.development,
        "Starting Rackwork Worker"
    );

    let ctx = Context::from_config(config).await?;

    let mut runtime = WorkerRuntime::builder().context(ctx).build()?.start();

    let result = tokio::select! {
        result = runtime.wait() => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
            Ok(())
        }
    };

    runtime.shutdown().await?;
    info!("Rackwork Worker shut down");

    result
}
