// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terminal transitions for jobs and provisioning records.
//!
//! These run in the spawned `job`/`rack` processes and in the reaper. Each
//! re-reads the record, so a record that already reached a terminal status
//! is left untouched.

use chrono::Utc;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::Result;
use crate::integration::{CommitState, CommitStatus, NotificationEvent};
use crate::model::{Job, ProvisionKind, Status, TaskStatus, Workflow, WorkflowKind};

/// Mark a job failed and report the failure outward.
pub async fn fail_job(ctx: &Context, id: &str, reason: &str) -> Result<()> {
    let mut job = ctx.store.get_job(id).await?;
    if job.status.is_terminal() {
        warn!(job_id = %id, status = %job.status, "Job already finished, not failing");
        return Ok(());
    }

    let workflow = ctx.store.get_workflow(&job.workflow_id).await?;

    notify(ctx, &workflow, "error").await;

    let now = Utc::now();
    for task in job.tasks.iter_mut() {
        if task.status == TaskStatus::Running {
            task.status = TaskStatus::Failed;
            task.ended.get_or_insert(now);
        }
    }

    if workflow.kind == WorkflowKind::Review {
        source_status(ctx, &workflow, &job, CommitState::Failure, reason).await;
    }

    job.finished = Some(now);
    job.status = Status::Failed;
    job.error = Some(reason.to_string());
    ctx.store.save_job(&job).await?;

    info!(job_id = %id, reason = %reason, "Job failed");
    Ok(())
}

/// Mark a job complete and report the success outward.
pub async fn succeed_job(ctx: &Context, id: &str) -> Result<()> {
    let mut job = ctx.store.get_job(id).await?;
    if job.status.is_terminal() {
        warn!(job_id = %id, status = %job.status, "Job already finished, not completing");
        return Ok(());
    }

    let workflow = ctx.store.get_workflow(&job.workflow_id).await?;

    notify(ctx, &workflow, "success").await;

    if workflow.kind == WorkflowKind::Review {
        source_status(
            ctx,
            &workflow,
            &job,
            CommitState::Success,
            "Workflow completed successfully",
        )
        .await;
    }

    job.finished = Some(Utc::now());
    job.status = Status::Complete;
    ctx.store.save_job(&job).await?;

    info!(job_id = %id, "Job complete");
    Ok(())
}

/// Post a pending commit status for the step a review job is on.
pub async fn job_source_status(ctx: &Context, job: &Job, description: &str) -> Result<()> {
    let workflow = ctx.store.get_workflow(&job.workflow_id).await?;
    if workflow.kind != WorkflowKind::Review {
        return Ok(());
    }

    let Some((client, repository)) = ctx.workflow_source(&workflow).await? else {
        return Ok(());
    };

    client
        .status_update(&CommitStatus {
            repository,
            reference: job.param("ref").to_string(),
            state: CommitState::Pending,
            description: description.to_string(),
            target_url: Some(job.url(&ctx.config.external_host)),
        })
        .await
}

/// Mark an install, uninstall or update complete.
pub async fn succeed_provision(ctx: &Context, kind: ProvisionKind, id: &str) -> Result<()> {
    finish_provision(ctx, kind, id, Status::Complete).await
}

/// Mark an install, uninstall or update failed.
pub async fn fail_provision(
    ctx: &Context,
    kind: ProvisionKind,
    id: &str,
    reason: &str,
) -> Result<()> {
    warn!(kind = %kind, id = %id, reason = %reason, "Provisioning failed");
    finish_provision(ctx, kind, id, Status::Failed).await
}

async fn finish_provision(ctx: &Context, kind: ProvisionKind, id: &str, status: Status) -> Result<()> {
    let mut record = ctx.store.get_provision(kind, id).await?;
    if record.status.is_terminal() {
        warn!(kind = %kind, id = %id, status = %record.status, "Record already finished");
        return Ok(());
    }

    record.finished = Some(Utc::now());
    record.status = status;
    ctx.store.save_provision(&record).await
}

async fn notify(ctx: &Context, workflow: &Workflow, status: &str) {
    let integrations = match ctx
        .store
        .list_organization_integrations(&workflow.organization_id)
        .await
    {
        Ok(integrations) => integrations,
        Err(e) => {
            warn!(organization_id = %workflow.organization_id, error = %e, "Could not list integrations");
            return;
        }
    };

    let event = NotificationEvent::workflow_complete(workflow.kind.as_str(), status);

    for integration in &integrations {
        let Some(notification) = integration.notification() else {
            continue;
        };
        let result = match ctx.connectors.notifier(notification) {
            Ok(notifier) => notifier.send(&workflow.name, &event).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(integration_id = %integration.id, error = %e, "Notification failed");
        }
    }
}

async fn source_status(
    ctx: &Context,
    workflow: &Workflow,
    job: &Job,
    state: CommitState,
    description: &str,
) {
    let result: Result<()> = async {
        let Some((client, repository)) = ctx.workflow_source(workflow).await? else {
            return Ok(());
        };
        client
            .status_update(&CommitStatus {
                repository,
                reference: job.param("ref").to_string(),
                state,
                description: description.to_string(),
                target_url: Some(job.url(&ctx.config.external_host)),
            })
            .await
    }
    .await;

    if let Err(e) = result {
        warn!(job_id = %job.id, state = state.as_str(), error = %e, "Commit status update failed");
    }
}
