// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `job <id>`
//!
//! Spawned by the worker for one job. Task output goes to the object store;
//! the exit status tells the supervisor whether the pipeline succeeded.

use std::process::ExitCode;

use anyhow::{Result, bail};
use tracing::info;

use rackwork_core::entrypoint::{self, HARD_TIMEOUT};
use rackwork_core::{Config, Context};
use rackwork_pipeline::Executor;

#[tokio::main]
async fn main() -> ExitCode {
    entrypoint::load_dotenv();
    entrypoint::init_tracing("job=info,rackwork_pipeline=info,rackwork_core=info");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let Some(id) = std::env::args().nth(1) else {
        bail!("must specify a job id");
    };

    entrypoint::spawn_hard_timeout(HARD_TIMEOUT);

    let config = Config::from_env()?;
    let ctx = Context::from_config(config).await?;

    info!(job_id = %id, "job starting");

    Executor::from_context(ctx).execute(&id).await?;
    Ok(())
}
