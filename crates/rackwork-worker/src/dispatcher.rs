// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker dispatch loop.
//!
//! Dequeue through the admission gate, start a detached `job`/`rack` process
//! for each admitted item and persist its pid on the record. Any error here
//! ends the loop: the worker exits and its external supervisor restarts it.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};

use rackwork_core::model::{ProvisionKind, Status};
use rackwork_core::persistence::RecordStore;
use rackwork_core::queue::{Dequeuer, WorkItem};

use crate::admission::AdmissionGate;
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::supervisor::Supervisor;

/// What [`Worker::dispatch`] did with an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A process was started; its pid is on the record.
    Started(String),
    /// The record was no longer `starting`; nothing was started.
    Skipped(Status),
}

/// Sequential dequeue/dispatch loop.
pub struct Worker {
    store: RecordStore,
    dequeuer: Dequeuer,
    gate: AdmissionGate,
    supervisor: Arc<dyn Supervisor>,
    config: WorkerConfig,
    shutdown: Arc<Notify>,
}

impl Worker {
    /// Worker consuming `dequeuer` and launching through `supervisor`.
    pub fn new(
        store: RecordStore,
        dequeuer: Dequeuer,
        supervisor: Arc<dyn Supervisor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            gate: AdmissionGate::new(store.clone()),
            store,
            dequeuer,
            supervisor,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run until shutdown or the first error.
    pub async fn run(&self) -> Result<()> {
        info!(
            supervisor = self.supervisor.supervisor_type(),
            "Worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Worker received shutdown signal");
                    break;
                }

                item = self.dequeuer.dequeue(&self.gate) => {
                    let item = item?;
                    self.dispatch(&item).await?;
                }
            }
        }

        info!("Worker stopped");
        Ok(())
    }

    /// Start the process for one admitted item.
    pub async fn dispatch(&self, item: &WorkItem) -> Result<Dispatch> {
        info!(kind = %item.kind, id = %item.id, "Dispatching work");

        if item.id.is_empty() {
            return Err(Error::InvalidWork(format!("{} has no id", item.kind)));
        }

        match item.kind.provision() {
            Some(kind) => self.dispatch_provision(kind, &item.id).await,
            None => self.dispatch_job(&item.id).await,
        }
    }

    async fn dispatch_job(&self, id: &str) -> Result<Dispatch> {
        let mut job = self.store.get_job(id).await?;

        if job.status != Status::Starting {
            warn!(job_id = %id, status = %job.status, "Job not in starting status, skipping");
            return Ok(Dispatch::Skipped(job.status));
        }

        let handle = self
            .supervisor
            .start(&self.config.job_program, &[id.to_string()])
            .await?;

        job.pid = Some(handle.pid.clone());
        self.store.save_job(&job).await?;

        info!(job_id = %id, pid = %handle.pid, "Job process started");
        Ok(Dispatch::Started(handle.pid))
    }

    async fn dispatch_provision(&self, kind: ProvisionKind, id: &str) -> Result<Dispatch> {
        let mut record = self.store.get_provision(kind, id).await?;

        if record.status != Status::Starting {
            warn!(kind = %kind, id = %id, status = %record.status, "Record not in starting status, skipping");
            return Ok(Dispatch::Skipped(record.status));
        }

        let handle = self
            .supervisor
            .start(
                &self.config.rack_program,
                &[kind.as_str().to_string(), id.to_string()],
            )
            .await?;

        record.pid = Some(handle.pid.clone());
        self.store.save_provision(&record).await?;

        info!(kind = %kind, id = %id, pid = %handle.pid, "Rack process started");
        Ok(Dispatch::Started(handle.pid))
    }

    /// Signal a job's process and clear its pid.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        cancel(&self.store, self.supervisor.as_ref(), id).await
    }
}

/// Signal a job's process and clear its pid.
///
/// A job without a pid only has its (empty) pid saved again.
pub async fn cancel(store: &RecordStore, supervisor: &dyn Supervisor, id: &str) -> Result<()> {
    let mut job = store.get_job(id).await?;

    if let Some(pid) = job.pid.as_deref().filter(|p| !p.is_empty()) {
        supervisor.signal(pid).await?;
        info!(job_id = %id, pid = %pid, "Cancelled job process");
    }

    job.pid = None;
    store.save_job(&job).await?;
    Ok(())
}

