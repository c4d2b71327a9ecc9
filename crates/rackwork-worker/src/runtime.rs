// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime: the dispatch loop and the reaper as tokio tasks.
//!
//! ```rust,ignore
//! use rackwork_core::{Config, Context};
//! use rackwork_worker::runtime::WorkerRuntime;
//!
//! let config = Config::from_env()?;
//! let ctx = Context::from_config(config).await?;
//!
//! let mut runtime = WorkerRuntime::builder()
//!     .context(ctx)
//!     .build()?
//!     .start();
//!
//! // Returns when the dispatch loop fails.
//! runtime.wait().await?;
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use rackwork_core::Context;
use rackwork_core::queue::Dequeuer;

use crate::config::WorkerConfig;
use crate::dispatcher::Worker;
use crate::reaper::Reaper;
use crate::supervisor::{self, Supervisor};

/// Builder for creating a [`WorkerRuntime`].
#[derive(Default)]
pub struct WorkerRuntimeBuilder {
    context: Option<Context>,
    supervisor: Option<Arc<dyn Supervisor>>,
    config: Option<WorkerConfig>,
}

impl WorkerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shared context (required).
    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the process supervisor.
    ///
    /// Default: chosen from the context's configuration (local in
    /// development, the hosting rack otherwise).
    pub fn supervisor(mut self, supervisor: Arc<dyn Supervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Set timing and program names.
    ///
    /// Default: [`WorkerConfig::from_config`] of the context's configuration.
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if the context is missing or no supervisor can be
    /// built for the configured mode.
    pub fn build(self) -> Result<WorkerRuntimeConfig> {
        let context = self
            .context
            .ok_or_else(|| anyhow::anyhow!("context is required"))?;

        let supervisor = match self.supervisor {
            Some(supervisor) => supervisor,
            None => supervisor::from_config(&context.config)?,
        };

        let config = self
            .config
            .unwrap_or_else(|| WorkerConfig::from_config(&context.config));

        Ok(WorkerRuntimeConfig {
            context,
            supervisor,
            config,
        })
    }
}

/// Configuration for a [`WorkerRuntime`].
pub struct WorkerRuntimeConfig {
    context: Context,
    supervisor: Arc<dyn Supervisor>,
    config: WorkerConfig,
}

impl WorkerRuntimeConfig {
    /// Spawn the dispatch loop and the reaper.
    pub fn start(self) -> WorkerRuntime {
        let reaper = Reaper::new(
            self.context.clone(),
            self.supervisor.clone(),
            self.config.reaper(),
        );
        let reaper_shutdown = reaper.shutdown_handle();
        let reaper_handle = tokio::spawn(async move { reaper.run().await });

        let dequeuer =
            Dequeuer::new(self.context.queue.clone()).with_wait(self.config.receive_wait);
        let worker = Worker::new(
            self.context.store.clone(),
            dequeuer,
            self.supervisor,
            self.config,
        );
        let worker_shutdown = worker.shutdown_handle();
        let worker_handle = tokio::spawn(async move { worker.run().await });

        info!("WorkerRuntime started");

        WorkerRuntime {
            worker_handle: Some(worker_handle),
            worker_shutdown,
            reaper_handle,
            reaper_shutdown,
        }
    }
}

/// Running dispatch loop and reaper.
pub struct WorkerRuntime {
    worker_handle: Option<JoinHandle<crate::error::Result<()>>>,
    worker_shutdown: Arc<Notify>,
    reaper_handle: JoinHandle<()>,
    reaper_shutdown: Arc<Notify>,
}

impl WorkerRuntime {
    /// Create a new builder.
    pub fn builder() -> WorkerRuntimeBuilder {
        WorkerRuntimeBuilder::new()
    }

    /// Wait for the dispatch loop to end.
    ///
    /// The loop only ends on its own with an error; that error is returned
    /// so the process can exit and be restarted.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(handle) = self.worker_handle.as_mut() else {
            return Ok(());
        };
        let result = join_worker(handle).await;
        self.worker_handle = None;
        result
    }

    /// Stop both loops and wait for them.
    pub async fn shutdown(self) -> Result<()> {
        info!("WorkerRuntime shutting down...");

        let WorkerRuntime {
            worker_handle,
            worker_shutdown,
            reaper_handle,
            reaper_shutdown,
        } = self;

        worker_shutdown.notify_one();
        reaper_shutdown.notify_one();

        if let Err(e) = reaper_handle.await {
            error!("Reaper task panicked: {}", e);
        }

        let result = match worker_handle {
            Some(mut handle) => join_worker(&mut handle).await,
            None => Ok(()),
        };

        info!("WorkerRuntime shutdown complete");
        result
    }
}

async fn join_worker(handle: &mut JoinHandle<crate::error::Result<()>>) -> Result<()> {
    match handle.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "Worker loop failed");
            Err(e.into())
        }
        Err(e) => Err(anyhow::anyhow!("worker task panicked: {}", e)),
    }
}
