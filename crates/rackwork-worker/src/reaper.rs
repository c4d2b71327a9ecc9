// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background sweep that fails jobs whose process died without reporting.
//!
//! A `running` job whose pid no longer answers the supervisor's liveness
//! probe crashed, was killed or lost its host. Jobs that started running
//! less than the grace period ago are skipped so a process that has not
//! registered yet is never mistaken for a dead one. A probe that fails
//! (timeout, API error) skips the job until the next sweep.
//!
//! Only jobs are swept. Install, uninstall and update records stuck in
//! `running` stay there until an operator intervenes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use rackwork_core::Context;
use rackwork_core::lifecycle;
use rackwork_core::model::{Job, Status};

use crate::error::{Error, Result};
use crate::supervisor::Supervisor;

/// Failure reason recorded on reaped jobs.
pub const REAPED_REASON: &str = "Workflow failed";

/// Configuration for the reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often to sweep.
    pub poll_interval: Duration,
    /// Minimum time a job must have been running before it can be reaped.
    pub grace: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            grace: Duration::from_secs(60),
        }
    }
}

/// Background worker that fails orphaned jobs.
pub struct Reaper {
    ctx: Context,
    supervisor: Arc<dyn Supervisor>,
    config: ReaperConfig,
    shutdown: Arc<Notify>,
}

impl Reaper {
    /// Create a new reaper.
    pub fn new(ctx: Context, supervisor: Arc<dyn Supervisor>, config: ReaperConfig) -> Self {
        Self {
            ctx,
            supervisor,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweep loop until shutdown.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            grace_secs = self.config.grace.as_secs(),
            "Reaper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Reaper received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Reaper sweep failed");
                    }
                }
            }
        }

        info!("Reaper stopped");
    }

    /// One pass over the running jobs. Returns the ids that were failed.
    pub async fn sweep(&self) -> Result<Vec<String>> {
        let grace = chrono::Duration::from_std(self.config.grace)
            .map_err(|e| Error::Other(format!("Invalid duration: {}", e)))?;
        let cutoff = Utc::now() - grace;

        let running = self.ctx.store.list_jobs_by_status(Status::Running).await?;
        let mut reaped = Vec::new();

        for job in running {
            if job.started.unwrap_or(job.created) > cutoff {
                debug!(job_id = %job.id, "Job within grace period");
                continue;
            }

            match self.alive(&job).await {
                Ok(false) => {}
                Ok(true) => continue,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Liveness probe failed, skipping job");
                    continue;
                }
            }

            warn!(
                job_id = %job.id,
                pid = job.pid.as_deref().unwrap_or(""),
                "Job process is gone, failing job"
            );

            match lifecycle::fail_job(&self.ctx, &job.id, REAPED_REASON).await {
                Ok(()) => reaped.push(job.id),
                Err(e) => error!(job_id = %job.id, error = %e, "Failed to fail reaped job"),
            }
        }

        if !reaped.is_empty() {
            info!(count = reaped.len(), "Reaped jobs");
        }
        Ok(reaped)
    }

    async fn alive(&self, job: &Job) -> crate::supervisor::Result<bool> {
        match job.pid.as_deref() {
            Some(pid) if !pid.is_empty() => self.supervisor.alive(pid).await,
            _ => Ok(false),
        }
    }
}
