// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for worker tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use rackwork_core::model::{
    Job, JobKind, Organization, ProvisionKind, ProvisionRecord, Rack, Workflow, WorkflowKind,
};
use rackwork_core::queue::{Dequeuer, MemoryQueue};
use rackwork_core::{Config, Context};

/// In-memory context with a fast-redelivering queue.
pub fn context() -> Context {
    let queue = MemoryQueue::new().with_visibility_timeout(Duration::from_millis(50));
    Context::memory(Config {
        development: true,
        ..Config::default()
    })
    .with_queue(Arc::new(queue))
}

/// Dequeuer with a short long-poll.
pub fn dequeuer(ctx: &Context) -> Dequeuer {
    Dequeuer::new(ctx.queue.clone()).with_wait(Duration::from_millis(200))
}

pub async fn organization(ctx: &Context, id: &str, concurrency: u32) -> Organization {
    let organization = Organization {
        id: id.to_string(),
        name: id.to_string(),
        plan: String::new(),
        override_concurrency: concurrency,
    };
    ctx.store.save_organization(&organization).await.unwrap();
    organization
}

pub async fn workflow(ctx: &Context, id: &str, organization_id: &str) -> Workflow {
    let workflow = Workflow {
        id: id.to_string(),
        organization_id: organization_id.to_string(),
        name: id.to_string(),
        kind: WorkflowKind::Review,
        integration_id: None,
        repository: None,
        params: BTreeMap::new(),
        tasks: Vec::new(),
    };
    ctx.store.save_workflow(&workflow).await.unwrap();
    workflow
}

pub async fn job(ctx: &Context, id: &str, workflow: &Workflow, kind: JobKind, name: &str) -> Job {
    let job = Job::new(id, workflow, kind).with_param("name", name);
    ctx.store.save_job(&job).await.unwrap();
    job
}

pub async fn rack(ctx: &Context, id: &str, organization_id: &str) -> Rack {
    let rack = Rack {
        id: id.to_string(),
        organization_id: organization_id.to_string(),
        name: id.to_string(),
        provider: "aws".to_string(),
        host: String::new(),
        password: String::new(),
        parameters: BTreeMap::new(),
        runtime: None,
        locked: false,
        created: Utc::now(),
    };
    ctx.store.save_rack(&rack).await.unwrap();
    rack
}

pub async fn provision(ctx: &Context, id: &str, kind: ProvisionKind, rack: &Rack) -> ProvisionRecord {
    let record = ProvisionRecord::new(id, kind, rack);
    ctx.store.save_provision(&record).await.unwrap();
    record
}
