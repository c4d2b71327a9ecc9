// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Admission gate: decides whether a dequeued item may start now.
//!
//! Every decision runs under one lock, so two items are never admitted on
//! the strength of the same record store snapshot. The store itself has no
//! transactions; the lock plus a single worker per deployment is what keeps
//! the concurrency and ordering checks sound.
//!
//! | Work kind | Rule |
//! |-----------|------|
//! | install, uninstall, update | always ready |
//! | job | organization below its concurrency limit, no active `merge` job of the same workflow, no active `review` job of the same workflow and review name |
//!
//! An admitted record is set to `starting`. Repeated deliveries of the same
//! id rewrite the same value, so the write is idempotent.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use rackwork_core::Result;
use rackwork_core::model::{Job, ProvisionKind, Status};
use rackwork_core::persistence::RecordStore;
use rackwork_core::queue::{Admission, Admit, WorkItem};

/// Why a job has to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// The organization is at its concurrency limit.
    Concurrency,
    /// A merge job of the same workflow is active.
    Merge,
    /// A review job for the same workflow and review is active.
    Review,
}

impl WaitReason {
    /// Log form.
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitReason::Concurrency => "concurrency",
            WaitReason::Merge => "merge",
            WaitReason::Review => "review",
        }
    }
}

/// Check `job` against the active jobs. `active` may include `job` itself.
pub fn job_wait_reason(job: &Job, active: &[Job], concurrency: usize) -> Option<WaitReason> {
    let others: Vec<&Job> = active.iter().filter(|j| j.id != job.id).collect();

    let running = others
        .iter()
        .filter(|j| j.organization_id == job.organization_id)
        .count();
    if running >= concurrency {
        return Some(WaitReason::Concurrency);
    }

    for other in others.iter().filter(|j| j.workflow_id == job.workflow_id) {
        match other.kind.prefix() {
            "merge" => return Some(WaitReason::Merge),
            "review" if other.review_name() == job.review_name() => {
                return Some(WaitReason::Review);
            }
            _ => {}
        }
    }

    None
}

/// Serialized admission decisions against the record store.
pub struct AdmissionGate {
    store: RecordStore,
    lock: Mutex<()>,
}

impl AdmissionGate {
    /// Gate reading and writing `store`.
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    async fn admit_provision(&self, kind: ProvisionKind, id: &str) -> Result<Admission> {
        let mut record = self.store.get_provision(kind, id).await?;

        if matches!(record.status, Status::Pending | Status::Starting) {
            record.status = Status::Starting;
            self.store.save_provision(&record).await?;
        } else {
            debug!(kind = %kind, id = %id, status = %record.status, "Already past starting, admitting as-is");
        }

        Ok(Admission::Ready)
    }

    async fn admit_job(&self, id: &str) -> Result<Admission> {
        let mut job = self.store.get_job(id).await?;

        if !matches!(job.status, Status::Pending | Status::Starting) {
            debug!(job_id = %id, status = %job.status, "Already past starting, admitting as-is");
            return Ok(Admission::Ready);
        }

        let organization = self.store.get_organization(&job.organization_id).await?;
        let active = self.store.list_active_jobs().await?;
        let concurrency = organization.job_concurrency();

        let running = active
            .iter()
            .filter(|j| j.id != job.id && j.organization_id == job.organization_id)
            .count();

        info!(
            organization_id = %job.organization_id,
            job_id = %id,
            running = running,
            concurrency = concurrency,
            "Checking job admission"
        );

        if let Some(reason) = job_wait_reason(&job, &active, concurrency) {
            info!(
                organization_id = %job.organization_id,
                job_id = %id,
                reason = reason.as_str(),
                "Job must wait"
            );
            return Ok(Admission::NotReady);
        }

        info!(organization_id = %job.organization_id, job_id = %id, "Job may proceed");

        job.status = Status::Starting;
        self.store.save_job(&job).await?;

        Ok(Admission::Ready)
    }
}

#[async_trait]
impl Admit for AdmissionGate {
    async fn admit(&self, item: &WorkItem) -> Result<Admission> {
        let _guard = self.lock.lock().await;

        let result = match item.kind.provision() {
            Some(kind) => self.admit_provision(kind, &item.id).await,
            None => self.admit_job(&item.id).await,
        };

        if let Err(e) = &result {
            warn!(kind = %item.kind, id = %item.id, error = %e, "Admission check failed");
        }
        result
    }
}
