// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared setup for the `rackwork-worker`, `job` and `rack` binaries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Wall-clock limit of a spawned `job`/`rack` process.
pub const HARD_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);

/// Install the fmt subscriber, filtered by `RUST_LOG` or `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .try_init();
}

/// Load a `.env` file when one is present.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {}", e);
    }
}

/// Force-exit the process with status 1 once `limit` has elapsed.
pub fn spawn_hard_timeout(limit: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(limit).await;
        error!(limit_secs = limit.as_secs(), "Hard timeout reached");
        eprintln!("ERROR: timeout");
        std::process::exit(1);
    })
}

/// Argument check failure shown with the usage line.
#[derive(Debug, thiserror::Error)]
#[error("usage: {0}")]
pub struct UsageError(pub &'static str);
