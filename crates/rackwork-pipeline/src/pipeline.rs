// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-kind pipelines.
//!
//! | Kind | Steps |
//! |------|-------|
//! | `legacy` | clone, then the workflow's build / copy / promote / run templates in order |
//! | `merge` | clone, then per deploy target: optional test build + test run, build (first target) or copy (later targets), optional hooks around an auto promote |
//! | `review.open`, `review.update` | create app if missing, clone, optional env, development build, optional tests, demo promote with hooks, record service domains |
//! | `review.close` | delete app |
//!
//! Every step runs through [`Pipeline::task`], which gives it its own task
//! record and log object.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use rackwork_core::Context;
use rackwork_core::lifecycle;
use rackwork_core::model::{Job, JobKind, Task, TaskKind, TaskStatus, Workflow, WorkflowTaskKind};

use crate::error::{PipelineError, Result};
use crate::rack_cli::RackCli;
use crate::steps::{self, Step};

/// One job run: the job record being updated plus its workflow.
pub struct Pipeline {
    ctx: Context,
    cli: Arc<dyn RackCli>,
    job: Job,
    workflow: Workflow,
    scratch: TempDir,
}

impl Pipeline {
    /// Pipeline for `job` of `workflow`.
    pub fn new(ctx: Context, cli: Arc<dyn RackCli>, job: Job, workflow: Workflow) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job.id))
            .tempdir()?;

        Ok(Self {
            ctx,
            cli,
            job,
            workflow,
            scratch,
        })
    }

    /// The job as last saved.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Run the pipeline selected by the job kind.
    pub async fn execute(&mut self) -> Result<()> {
        info!(job_id = %self.job.id, kind = %self.job.kind, "Executing pipeline");

        match self.job.kind {
            JobKind::Legacy => self.legacy().await,
            JobKind::Merge => self.merge().await,
            JobKind::ReviewOpen | JobKind::ReviewUpdate => self.review_update().await,
            JobKind::ReviewClose => self.review_close().await,
        }
    }

    /// Run one step as a task of the job.
    ///
    /// The title is posted as the pending commit status, the task is saved
    /// as `running` with a fresh log key before the step starts, and the job
    /// is saved again with the task's outcome afterwards.
    pub async fn task(
        &mut self,
        kind: TaskKind,
        title: impl Into<String>,
        step: Step<'_>,
    ) -> Result<String> {
        let title = title.into();

        if let Err(e) = lifecycle::job_source_status(&self.ctx, &self.job, &title).await {
            warn!(job_id = %self.job.id, error = %e, "Could not post commit status");
        }

        let logs = format!("jobs/{}/tasks/{}", self.job.id, uuid::Uuid::new_v4());
        self.job.tasks.push(Task {
            kind,
            title: title.clone(),
            logs: logs.clone(),
            status: TaskStatus::Running,
            started: Some(Utc::now()),
            ended: None,
        });
        self.ctx.store.save_job(&self.job).await?;

        debug!(job_id = %self.job.id, task = kind.as_str(), title = %title, "Task started");

        let out = self.ctx.log_writer(logs);
        let result = step.execute(self.cli.as_ref(), &out).await;

        if let Some(task) = self.job.tasks.last_mut() {
            task.ended = Some(Utc::now());
            task.status = match &result {
                Ok(_) => TaskStatus::Complete,
                Err(_) => TaskStatus::Failed,
            };
        }

        if let Err(e) = &result {
            warn!(job_id = %self.job.id, task = kind.as_str(), error = %e, "Task failed");
        }

        self.ctx.store.save_job(&self.job).await?;
        result
    }

    async fn rack_url(&self, rack_id: &str) -> Result<String> {
        Ok(self.ctx.store.get_rack(rack_id).await?.url())
    }

    async fn clone_source(&mut self) -> Result<PathBuf> {
        let (source, repository) = self
            .ctx
            .workflow_source(&self.workflow)
            .await?
            .ok_or_else(|| PipelineError::NoSource(self.workflow.id.clone()))?;

        let reference = self.job.param("ref").to_string();
        let dir = self.scratch.path().join("source");

        self.task(
            TaskKind::Clone,
            "Fetching source",
            Step::Clone {
                source: source.as_ref(),
                repository: &repository,
                reference: &reference,
                dir: &dir,
            },
        )
        .await?;

        Ok(dir)
    }

    /// Run `service`/`command` as a hook. Skipped when either is empty.
    async fn hook(
        &mut self,
        when: &str,
        service: &str,
        command: &str,
        rack: &str,
        app: &str,
        release: &str,
    ) -> Result<()> {
        if service.is_empty() || command.is_empty() {
            return Ok(());
        }

        self.task(
            TaskKind::Run,
            format!("Running {} hook for {} on {}", when, release, app),
            Step::Run {
                rack,
                app,
                release,
                service,
                command,
            },
        )
        .await?;
        Ok(())
    }

    async fn legacy(&mut self) -> Result<()> {
        let description = self.job.param("description").to_string();
        let dir = self.clone_source().await?;

        let mut rack = String::new();
        let mut app = String::new();
        let mut release = String::new();

        for template in self.workflow.tasks.clone() {
            match template.kind {
                WorkflowTaskKind::Build => {
                    app = template.param("app_id").to_string();
                    rack = self.rack_url(template.param("rack_id")).await?;

                    release = self
                        .task(
                            TaskKind::Build,
                            format!("Building {}", app),
                            Step::Build {
                                dir: &dir,
                                rack: &rack,
                                app: &app,
                                manifest: template.param("manifest"),
                                description: &description,
                                development: false,
                            },
                        )
                        .await?;
                }
                WorkflowTaskKind::Copy => {
                    let rack_to = self.rack_url(template.param("rack_id_to")).await?;
                    let app_to = template.param("app_id_to").to_string();

                    release = self
                        .task(
                            TaskKind::Copy,
                            format!("Copying build from {} to {}", app, app_to),
                            Step::Copy {
                                rack: &rack,
                                app: &app,
                                release: &release,
                                rack_to: &rack_to,
                                app_to: &app_to,
                            },
                        )
                        .await?;

                    rack = rack_to;
                    app = app_to;
                }
                WorkflowTaskKind::Promote => {
                    self.task(
                        TaskKind::Promote,
                        format!("Promoting {} on {}", release, app),
                        Step::Promote {
                            rack: &rack,
                            app: &app,
                            release: &release,
                        },
                    )
                    .await?;
                }
                WorkflowTaskKind::Run => {
                    self.task(
                        TaskKind::Run,
                        format!("Running command on {} on {}", release, app),
                        Step::Run {
                            rack: &rack,
                            app: &app,
                            release: &release,
                            service: template.param("service"),
                            command: template.param("command"),
                        },
                    )
                    .await?;
                }
                WorkflowTaskKind::Deploy | WorkflowTaskKind::Unknown => {
                    debug!(job_id = %self.job.id, kind = ?template.kind, "Skipping template");
                }
            }
        }

        Ok(())
    }

    async fn merge(&mut self) -> Result<()> {
        let dir = self.clone_source().await?;

        let manifest = self.workflow.param("manifest").to_string();
        let description = self.job.param("description").to_string();

        // Rack, app and release of the first build; later targets copy it.
        let mut origin: Option<(String, String, String)> = None;

        for template in self.workflow.tasks.clone() {
            if template.kind != WorkflowTaskKind::Deploy {
                continue;
            }

            let rack = self.rack_url(template.param("rack")).await?;
            let app = template.param("app").to_string();

            if template.param("test") == "true" {
                let test_release = self
                    .task(
                        TaskKind::TestBuild,
                        format!("Creating test build on {}", app),
                        Step::Build {
                            dir: &dir,
                            rack: &rack,
                            app: &app,
                            manifest: &manifest,
                            description: "test build",
                            development: true,
                        },
                    )
                    .await?;

                self.task(
                    TaskKind::TestRun,
                    format!("Running tests on {}", app),
                    Step::Test {
                        rack: &rack,
                        app: &app,
                        release: &test_release,
                    },
                )
                .await?;
            }

            let release = if let Some((rack_from, app_from, release_from)) = &origin {
                self.task(
                    TaskKind::Copy,
                    format!("Copying build from {} to {}", app_from, app),
                    Step::Copy {
                        rack: rack_from,
                        app: app_from,
                        release: release_from,
                        rack_to: &rack,
                        app_to: &app,
                    },
                )
                .await?
            } else {
                let release = self
                    .task(
                        TaskKind::Build,
                        format!("Building {}", app),
                        Step::Build {
                            dir: &dir,
                            rack: &rack,
                            app: &app,
                            manifest: &manifest,
                            description: &description,
                            development: false,
                        },
                    )
                    .await?;
                if !release.is_empty() {
                    origin = Some((rack.clone(), app.clone(), release.clone()));
                }
                release
            };

            if template.param("promote") == "auto" {
                self.hook(
                    "before",
                    template.param("before-service"),
                    template.param("before-command"),
                    &rack,
                    &app,
                    &release,
                )
                .await?;

                self.task(
                    TaskKind::Promote,
                    format!("Promoting {} on {}", release, app),
                    Step::Promote {
                        rack: &rack,
                        app: &app,
                        release: &release,
                    },
                )
                .await?;

                self.hook(
                    "after",
                    template.param("after-service"),
                    template.param("after-command"),
                    &rack,
                    &app,
                    &release,
                )
                .await?;
            }
        }

        Ok(())
    }

    async fn review_close(&mut self) -> Result<()> {
        let rack = self.rack_url(self.workflow.param("rack")).await?;
        let app = self.job.param("name").to_string();

        self.task(
            TaskKind::Delete,
            format!("Deleting {}", app),
            Step::Delete {
                rack: &rack,
                app: &app,
            },
        )
        .await?;
        Ok(())
    }

    async fn review_update(&mut self) -> Result<()> {
        let workflow = self.workflow.clone();
        let app = self.job.param("name").to_string();
        let rack = self.rack_url(workflow.param("rack")).await?;

        if !steps::app_exists(self.cli.as_ref(), &rack, &app).await {
            self.task(
                TaskKind::Create,
                format!("Creating {}", app),
                Step::Create {
                    rack: &rack,
                    app: &app,
                },
            )
            .await?;
        }

        let dir = self.clone_source().await?;
        let description = self.job.param("description").to_string();

        let env = workflow.param("env");
        if !env.is_empty() {
            self.task(
                TaskKind::Env,
                format!("Applying test environment to {}", app),
                Step::Env {
                    rack: &rack,
                    app: &app,
                    env,
                },
            )
            .await?;
        }

        let release = self
            .task(
                TaskKind::Build,
                format!("Building {}", app),
                Step::Build {
                    dir: &dir,
                    rack: &rack,
                    app: &app,
                    manifest: workflow.param("manifest"),
                    description: &description,
                    development: true,
                },
            )
            .await?;

        if workflow.param("test") == "true" {
            self.task(
                TaskKind::Test,
                format!("Running tests for {} on {}", release, app),
                Step::Test {
                    rack: &rack,
                    app: &app,
                    release: &release,
                },
            )
            .await?;
        }

        if workflow.param("demo") == "true" {
            self.hook(
                "before",
                workflow.param("before-service"),
                workflow.param("before-command"),
                &rack,
                &app,
                &release,
            )
            .await?;

            self.task(
                TaskKind::Promote,
                format!("Promoting {} on {}", release, app),
                Step::Promote {
                    rack: &rack,
                    app: &app,
                    release: &release,
                },
            )
            .await?;

            self.hook(
                "after",
                workflow.param("after-service"),
                workflow.param("after-command"),
                &rack,
                &app,
                &release,
            )
            .await?;

            self.job.services = steps::service_domains(self.cli.as_ref(), &rack, &app).await?;
            self.ctx.store.save_job(&self.job).await?;

            info!(job_id = %self.job.id, services = self.job.services.len(), "Recorded service domains");
        }

        Ok(())
    }
}
