// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reaper sweeps over running jobs.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use rackwork_core::model::{JobKind, ProvisionKind, Status};
use rackwork_worker::reaper::REAPED_REASON;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rackwork_worker::supervisor::{MockSupervisor, RackSupervisor, Supervisor};
use rackwork_worker::{Reaper, ReaperConfig};

fn config() -> ReaperConfig {
    ReaperConfig {
        poll_interval: Duration::from_millis(20),
        grace: Duration::from_secs(60),
    }
}

async fn running_job(
    ctx: &rackwork_core::Context,
    id: &str,
    pid: Option<&str>,
    started_secs_ago: i64,
) {
    let workflow = common::workflow(ctx, "w1", "o1").await;
    let mut job = common::job(ctx, id, &workflow, JobKind::Legacy, "").await;
    job.status = Status::Running;
    job.pid = pid.map(str::to_string);
    job.started = Some(Utc::now() - chrono::Duration::seconds(started_secs_ago));
    ctx.store.save_job(&job).await.unwrap();
}

#[tokio::test]
async fn test_dead_process_fails_job() {
    let ctx = common::context();
    let supervisor = Arc::new(MockSupervisor::new());
    let handle = supervisor.start("job", &["j1".to_string()]).await.unwrap();
    supervisor.exit(&handle.pid).await;
    running_job(&ctx, "j1", Some(&handle.pid), 120).await;

    let reaper = Reaper::new(ctx.clone(), supervisor, config());
    let reaped = reaper.sweep().await.unwrap();

    assert_eq!(reaped, vec!["j1".to_string()]);
    let job = ctx.store.get_job("j1").await.unwrap();
    assert_eq!(job.status, Status::Failed);
    assert_eq!(job.error.as_deref(), Some(REAPED_REASON));
    assert!(job.finished.is_some());
}

#[tokio::test]
async fn test_alive_process_is_left_alone() {
    let ctx = common::context();
    let supervisor = Arc::new(MockSupervisor::new());
    supervisor.adopt("p-1").await;
    running_job(&ctx, "j1", Some("p-1"), 3600).await;

    let reaper = Reaper::new(ctx.clone(), supervisor, config());
    assert!(reaper.sweep().await.unwrap().is_empty());
    assert_eq!(ctx.store.get_job("j1").await.unwrap().status, Status::Running);
}

#[tokio::test]
async fn test_failed_probe_leaves_job_running() {
    let ctx = common::context();
    let supervisor = Arc::new(MockSupervisor::new());
    supervisor.unreachable("p-1").await;
    running_job(&ctx, "j1", Some("p-1"), 3600).await;

    let reaper = Reaper::new(ctx.clone(), supervisor, config());
    assert!(reaper.sweep().await.unwrap().is_empty());
    assert_eq!(ctx.store.get_job("j1").await.unwrap().status, Status::Running);
}

#[tokio::test]
async fn test_rack_server_error_leaves_job_running() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apps/console/processes/worker-1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apps/console/processes/worker-2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let ctx = common::context();
    running_job(&ctx, "j1", Some("worker-1"), 3600).await;
    running_job(&ctx, "j2", Some("worker-2"), 3600).await;

    let url = server.uri().replace("http://", "http://convox:secret@");
    let supervisor = Arc::new(RackSupervisor::new(&url, "console", "worker").unwrap());
    let reaper = Reaper::new(ctx.clone(), supervisor, config());

    assert_eq!(reaper.sweep().await.unwrap(), vec!["j2".to_string()]);
    assert_eq!(ctx.store.get_job("j1").await.unwrap().status, Status::Running);
    assert_eq!(ctx.store.get_job("j2").await.unwrap().status, Status::Failed);
}

#[tokio::test]
async fn test_grace_period_protects_new_jobs() {
    let ctx = common::context();
    let supervisor = Arc::new(MockSupervisor::new());
    running_job(&ctx, "j1", None, 5).await;

    let reaper = Reaper::new(ctx.clone(), supervisor, config());
    assert!(reaper.sweep().await.unwrap().is_empty());
    assert_eq!(ctx.store.get_job("j1").await.unwrap().status, Status::Running);
}

#[tokio::test]
async fn test_missing_pid_counts_as_dead() {
    let ctx = common::context();
    let supervisor = Arc::new(MockSupervisor::new());
    running_job(&ctx, "j1", None, 120).await;

    let reaper = Reaper::new(ctx.clone(), supervisor, config());
    assert_eq!(reaper.sweep().await.unwrap(), vec!["j1".to_string()]);
}

#[tokio::test]
async fn test_provision_records_are_not_reaped() {
    let ctx = common::context();
    let supervisor = Arc::new(MockSupervisor::new());
    let rack = common::rack(&ctx, "r1", "o1").await;
    let mut record = common::provision(&ctx, "i1", ProvisionKind::Install, &rack).await;
    record.status = Status::Running;
    record.pid = Some("gone".to_string());
    record.started = Some(Utc::now() - chrono::Duration::seconds(3600));
    ctx.store.save_provision(&record).await.unwrap();

    let reaper = Reaper::new(ctx.clone(), supervisor, config());
    assert!(reaper.sweep().await.unwrap().is_empty());
    let record = ctx
        .store
        .get_provision(ProvisionKind::Install, "i1")
        .await
        .unwrap();
    assert_eq!(record.status, Status::Running);
}

#[tokio::test]
async fn test_run_loop_sweeps_until_shutdown() {
    let ctx = common::context();
    let supervisor = Arc::new(MockSupervisor::new());
    running_job(&ctx, "j1", Some("gone"), 120).await;

    let reaper = Arc::new(Reaper::new(ctx.clone(), supervisor, config()));
    let shutdown = reaper.shutdown_handle();
    let task = {
        let reaper = reaper.clone();
        tokio::spawn(async move { reaper.run().await })
    };

    let mut failed = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if ctx.store.get_job("j1").await.unwrap().status == Status::Failed {
            failed = true;
            break;
        }
    }
    assert!(failed);

    shutdown.notify_one();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}
