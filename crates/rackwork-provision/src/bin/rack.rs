// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `rack <install|uninstall|update> <id>`
//!
//! Spawned by the worker for one provisioning record. Progress goes to the
//! record's log; the exit status tells the supervisor whether it worked.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use rackwork_core::entrypoint::{self, HARD_TIMEOUT, UsageError};
use rackwork_core::model::ProvisionKind;
use rackwork_core::{Config, Context};
use rackwork_provision::Handler;

/// Pause before exiting so in-flight log appends land.
const FLUSH_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    entrypoint::load_dotenv();
    entrypoint::init_tracing("rack=info,rackwork_provision=info,rackwork_core=info");

    let result = run().await;
    if let Err(e) = &result {
        eprintln!("ERROR: {:#}", e);
    }

    tokio::time::sleep(FLUSH_DELAY).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [kind, id, ..] = args.as_slice() else {
        return Err(UsageError("rack <install|uninstall|update> <id>").into());
    };

    entrypoint::spawn_hard_timeout(HARD_TIMEOUT);

    let kind: ProvisionKind = kind.parse()?;
    let config = Config::from_env()?;
    let ctx = Context::from_config(config).await?;

    info!(kind = %kind, id = %id, "rack starting");

    Handler::from_context(ctx).run(kind, id).await?;
    Ok(())
}
