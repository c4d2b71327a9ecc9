// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terminal job/provision transitions and their outward reporting.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use rackwork_core::integration::{
    Capability, CommitState, CommitStatus, Connectors, IntegrationRecord, NotificationEvent,
    NotificationIntegration, NotificationProvider, Notifier, SourceClient, SourceIntegration,
    SourceProvider,
};
use rackwork_core::lifecycle;
use rackwork_core::model::{
    Job, JobKind, ProvisionKind, ProvisionRecord, Rack, Status, Task, TaskKind, TaskStatus,
    Workflow, WorkflowKind,
};
use rackwork_core::{Config, Context, LogWriter, Result};

#[derive(Default)]
struct Recorded {
    statuses: Mutex<Vec<CommitStatus>>,
    events: Mutex<Vec<(String, NotificationEvent)>>,
}

struct RecordingConnectors(Arc<Recorded>);

struct RecordingSource(Arc<Recorded>);

struct RecordingNotifier(Arc<Recorded>);

impl Connectors for RecordingConnectors {
    fn source(&self, _integration: &SourceIntegration) -> Result<Box<dyn SourceClient>> {
        Ok(Box::new(RecordingSource(self.0.clone())))
    }

    fn notifier(&self, _integration: &NotificationIntegration) -> Result<Box<dyn Notifier>> {
        Ok(Box::new(RecordingNotifier(self.0.clone())))
    }
}

#[async_trait]
impl SourceClient for RecordingSource {
    async fn clone_repository(
        &self,
        _repository: &str,
        _reference: &str,
        _dir: &Path,
        _out: &LogWriter,
    ) -> Result<()> {
        Ok(())
    }

    async fn status_update(&self, status: &CommitStatus) -> Result<()> {
        self.0.statuses.lock().unwrap().push(status.clone());
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, source: &str, event: &NotificationEvent) -> Result<()> {
        self.0
            .events
            .lock()
            .unwrap()
            .push((source.to_string(), event.clone()));
        Ok(())
    }
}

async fn setup(kind: WorkflowKind) -> (Context, Arc<Recorded>, Job) {
    let recorded = Arc::new(Recorded::default());
    let config = Config {
        external_host: "console.example.org".to_string(),
        ..Config::default()
    };
    let ctx = Context::memory(config)
        .with_connectors(Arc::new(RecordingConnectors(recorded.clone())));

    ctx.store
        .save_integration(&IntegrationRecord {
            id: "src".to_string(),
            organization_id: "o1".to_string(),
            capability: Capability::Source(SourceIntegration {
                provider: SourceProvider::Github,
                token: "t".to_string(),
                host: None,
            }),
        })
        .await
        .unwrap();
    ctx.store
        .save_integration(&IntegrationRecord {
            id: "chat".to_string(),
            organization_id: "o1".to_string(),
            capability: Capability::Notification(NotificationIntegration {
                provider: NotificationProvider::Slack,
                webhook: "https://hooks.example.org/x".to_string(),
            }),
        })
        .await
        .unwrap();

    let workflow = Workflow {
        id: "w1".to_string(),
        organization_id: "o1".to_string(),
        name: "web".to_string(),
        kind,
        integration_id: Some("src".to_string()),
        repository: Some("acme/web".to_string()),
        params: BTreeMap::new(),
        tasks: Vec::new(),
    };
    ctx.store.save_workflow(&workflow).await.unwrap();

    let mut job = Job::new("j1", &workflow, JobKind::ReviewOpen).with_param("ref", "abc123");
    job.status = Status::Running;
    job.tasks.push(Task {
        kind: TaskKind::Build,
        title: "Building web".to_string(),
        logs: "jobs/j1/tasks/t1".to_string(),
        status: TaskStatus::Running,
        started: Some(Utc::now()),
        ended: None,
    });
    ctx.store.save_job(&job).await.unwrap();

    (ctx, recorded, job)
}

#[tokio::test]
async fn test_fail_job_reports_and_fails_running_tasks() {
    let (ctx, recorded, _) = setup(WorkflowKind::Review).await;

    lifecycle::fail_job(&ctx, "j1", "Building web failed")
        .await
        .unwrap();

    let job = ctx.store.get_job("j1").await.unwrap();
    assert_eq!(job.status, Status::Failed);
    assert!(job.finished.is_some());
    assert_eq!(job.error.as_deref(), Some("Building web failed"));
    assert_eq!(job.tasks[0].status, TaskStatus::Failed);
    assert!(job.tasks[0].ended.is_some());

    let statuses = recorded.statuses.lock().unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, CommitState::Failure);
    assert_eq!(statuses[0].reference, "abc123");
    assert_eq!(
        statuses[0].target_url.as_deref(),
        Some("https://console.example.org/organizations/o1/jobs/j1")
    );

    let events = recorded.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "web");
    assert_eq!(events[0].1.status, "error");
    assert_eq!(events[0].1.data["kind"], "review");
}

#[tokio::test]
async fn test_succeed_job_on_merge_workflow_skips_commit_status() {
    let (ctx, recorded, _) = setup(WorkflowKind::Merge).await;

    lifecycle::succeed_job(&ctx, "j1").await.unwrap();

    let job = ctx.store.get_job("j1").await.unwrap();
    assert_eq!(job.status, Status::Complete);
    assert!(recorded.statuses.lock().unwrap().is_empty());
    assert_eq!(recorded.events.lock().unwrap()[0].1.status, "success");
}

#[tokio::test]
async fn test_terminal_jobs_never_regress() {
    let (ctx, _, _) = setup(WorkflowKind::Review).await;

    lifecycle::succeed_job(&ctx, "j1").await.unwrap();
    lifecycle::fail_job(&ctx, "j1", "Workflow failed").await.unwrap();

    let job = ctx.store.get_job("j1").await.unwrap();
    assert_eq!(job.status, Status::Complete);
    assert!(job.error.is_none());
}

#[tokio::test]
async fn test_job_source_status_is_pending_for_reviews_only() {
    let (ctx, recorded, job) = setup(WorkflowKind::Review).await;
    lifecycle::job_source_status(&ctx, &job, "Fetching source")
        .await
        .unwrap();
    {
        let statuses = recorded.statuses.lock().unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, CommitState::Pending);
        assert_eq!(statuses[0].description, "Fetching source");
    }

    let (ctx, recorded, job) = setup(WorkflowKind::Merge).await;
    lifecycle::job_source_status(&ctx, &job, "Fetching source")
        .await
        .unwrap();
    assert!(recorded.statuses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_provision_transitions() {
    let ctx = Context::memory(Config::default());
    let rack = Rack {
        id: "r1".to_string(),
        organization_id: "o1".to_string(),
        name: "staging".to_string(),
        provider: "aws".to_string(),
        host: String::new(),
        password: String::new(),
        parameters: BTreeMap::new(),
        runtime: None,
        locked: false,
        created: Utc::now(),
    };
    let mut install = ProvisionRecord::new("i1", ProvisionKind::Install, &rack);
    install.status = Status::Running;
    ctx.store.save_provision(&install).await.unwrap();

    lifecycle::fail_provision(&ctx, ProvisionKind::Install, "i1", "boom")
        .await
        .unwrap();
    lifecycle::succeed_provision(&ctx, ProvisionKind::Install, "i1")
        .await
        .unwrap();

    let install = ctx
        .store
        .get_provision(ProvisionKind::Install, "i1")
        .await
        .unwrap();
    assert_eq!(install.status, Status::Failed);
    assert!(install.finished.is_some());
}
