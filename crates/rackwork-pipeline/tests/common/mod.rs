// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for pipeline tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use rackwork_core::integration::{
    Capability, CommitStatus, Connectors, IntegrationRecord, NotificationIntegration, Notifier,
    SourceClient, SourceIntegration, SourceProvider,
};
use rackwork_core::model::{Job, JobKind, Rack, Workflow, WorkflowKind, WorkflowTask};
use rackwork_core::object_store::MemoryObjectStore;
use rackwork_core::{Config, Context, Error, LogWriter, Result};
use rackwork_pipeline::PidWait;

/// Commit statuses and clones seen by [`FakeConnectors`].
#[derive(Default)]
pub struct Recorded {
    pub statuses: Mutex<Vec<CommitStatus>>,
    pub clones: Mutex<Vec<(String, String)>>,
}

impl Recorded {
    pub fn statuses(&self) -> Vec<CommitStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn clones(&self) -> Vec<(String, String)> {
        self.clones.lock().unwrap().clone()
    }
}

pub struct FakeConnectors(pub Arc<Recorded>);

struct FakeSource(Arc<Recorded>);

impl Connectors for FakeConnectors {
    fn source(&self, _integration: &SourceIntegration) -> Result<Box<dyn SourceClient>> {
        Ok(Box::new(FakeSource(self.0.clone())))
    }

    fn notifier(&self, _integration: &NotificationIntegration) -> Result<Box<dyn Notifier>> {
        Err(Error::Integration("notifications disabled".to_string()))
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn clone_repository(
        &self,
        repository: &str,
        reference: &str,
        dir: &Path,
        out: &LogWriter,
    ) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        out.writeln(&format!("Cloning {}@{}", repository, reference))
            .await?;
        self.0
            .clones
            .lock()
            .unwrap()
            .push((repository.to_string(), reference.to_string()));
        Ok(())
    }

    async fn status_update(&self, status: &CommitStatus) -> Result<()> {
        self.0.statuses.lock().unwrap().push(status.clone());
        Ok(())
    }
}

pub struct Fixture {
    pub ctx: Context,
    pub objects: Arc<MemoryObjectStore>,
    pub recorded: Arc<Recorded>,
}

/// In-memory context with a source integration `src1` and racks `r1`, `r2`.
pub async fn fixture() -> Fixture {
    let objects = Arc::new(MemoryObjectStore::new());
    let recorded = Arc::new(Recorded::default());
    let config = Config {
        external_host: "console.example.org".to_string(),
        ..Config::default()
    };
    let ctx = Context::memory(config)
        .with_objects(objects.clone())
        .with_connectors(Arc::new(FakeConnectors(recorded.clone())));

    ctx.store
        .save_integration(&IntegrationRecord {
            id: "src1".to_string(),
            organization_id: "o1".to_string(),
            capability: Capability::Source(SourceIntegration {
                provider: SourceProvider::Github,
                token: "t".to_string(),
                host: None,
            }),
        })
        .await
        .unwrap();

    rack(&ctx, "r1", "r1.example.org", "pw1").await;
    rack(&ctx, "r2", "r2.example.org", "pw2").await;

    Fixture {
        ctx,
        objects,
        recorded,
    }
}

pub async fn rack(ctx: &Context, id: &str, host: &str, password: &str) -> Rack {
    let rack = Rack {
        id: id.to_string(),
        organization_id: "o1".to_string(),
        name: id.to_string(),
        provider: "aws".to_string(),
        host: host.to_string(),
        password: password.to_string(),
        parameters: BTreeMap::new(),
        runtime: None,
        locked: false,
        created: Utc::now(),
    };
    ctx.store.save_rack(&rack).await.unwrap();
    rack
}

pub fn template(kind: &str, params: &[(&str, &str)]) -> WorkflowTask {
    serde_json::from_value(serde_json::json!({
        "kind": kind,
        "params": params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }))
    .unwrap()
}

pub async fn workflow(
    ctx: &Context,
    kind: WorkflowKind,
    params: &[(&str, &str)],
    tasks: Vec<WorkflowTask>,
) -> Workflow {
    let workflow = Workflow {
        id: "w1".to_string(),
        organization_id: "o1".to_string(),
        name: "web".to_string(),
        kind,
        integration_id: Some("src1".to_string()),
        repository: Some("acme/app".to_string()),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        tasks,
    };
    ctx.store.save_workflow(&workflow).await.unwrap();
    workflow
}

/// Job `j1` with a recorded pid, as the worker leaves it.
pub async fn job(
    ctx: &Context,
    workflow: &Workflow,
    kind: JobKind,
    params: &[(&str, &str)],
) -> Job {
    let mut job = Job::new("j1", workflow, kind);
    for (k, v) in params {
        job = job.with_param(*k, *v);
    }
    job.pid = Some("4242".to_string());
    ctx.store.save_job(&job).await.unwrap();
    job
}

pub fn quick_pid_wait() -> PidWait {
    PidWait {
        attempts: 3,
        interval: Duration::from_millis(10),
    }
}
