// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job execution: wait for the supervisor's pid, run the pipeline, record
//! the terminal status.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use rackwork_core::Context;
use rackwork_core::lifecycle;
use rackwork_core::model::{Job, Status};

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::rack_cli::{ConvoxCli, RackCli};

/// Failure reason recorded on jobs whose pipeline errored.
pub const FAILED_REASON: &str = "Workflow failed";

/// How long to wait for the worker to record the job's pid.
#[derive(Debug, Clone, Copy)]
pub struct PidWait {
    /// Number of reads.
    pub attempts: u32,
    /// Pause between reads.
    pub interval: Duration,
}

impl Default for PidWait {
    fn default() -> Self {
        Self {
            attempts: 60,
            interval: Duration::from_secs(1),
        }
    }
}

/// Runs jobs by id.
pub struct Executor {
    ctx: Context,
    cli: Arc<dyn RackCli>,
    pid_wait: PidWait,
}

impl Executor {
    /// Executor running steps through `cli`.
    pub fn new(ctx: Context, cli: Arc<dyn RackCli>) -> Self {
        Self {
            ctx,
            cli,
            pid_wait: PidWait::default(),
        }
    }

    /// Executor using the configured CLI binary.
    pub fn from_context(ctx: Context) -> Self {
        let cli = Arc::new(ConvoxCli::new(ctx.config.cli.clone()));
        Self::new(ctx, cli)
    }

    /// Override the pid wait.
    pub fn with_pid_wait(mut self, pid_wait: PidWait) -> Self {
        self.pid_wait = pid_wait;
        self
    }

    /// Execute job `id` to a terminal status.
    ///
    /// A job whose pid never shows up is left alone for the reaper. A
    /// pipeline error fails the job and is returned.
    pub async fn execute(&self, id: &str) -> Result<()> {
        let mut job = self.wait_for_pid(id).await?;

        job.started = Some(Utc::now());
        job.status = Status::Running;
        self.ctx.store.save_job(&job).await?;

        info!(job_id = %id, kind = %job.kind, pid = ?job.pid, "Job running");

        match self.run(job).await {
            Ok(()) => {
                lifecycle::succeed_job(&self.ctx, id).await?;
                Ok(())
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "Job failed");
                if let Err(fail_err) = lifecycle::fail_job(&self.ctx, id, FAILED_REASON).await {
                    error!(job_id = %id, error = %fail_err, "Could not record job failure");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, job: Job) -> Result<()> {
        let workflow = self.ctx.store.get_workflow(&job.workflow_id).await?;
        let mut pipeline = Pipeline::new(self.ctx.clone(), self.cli.clone(), job, workflow)?;
        pipeline.execute().await
    }

    async fn wait_for_pid(&self, id: &str) -> Result<Job> {
        for attempt in 0..self.pid_wait.attempts {
            let job = self.ctx.store.get_job(id).await?;
            if job.pid.as_deref().is_some_and(|pid| !pid.is_empty()) {
                return Ok(job);
            }

            debug!(job_id = %id, attempt, "Waiting for pid");
            tokio::time::sleep(self.pid_wait.interval).await;
        }

        warn!(job_id = %id, attempts = self.pid_wait.attempts, "No pid recorded");
        Err(PipelineError::NoPid)
    }
}
