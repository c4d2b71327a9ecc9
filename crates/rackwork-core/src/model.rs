// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Records consumed and written by the orchestration subsystem.
//!
//! The record store owns these entities; the worker, the reaper and the
//! spawned `job`/`rack` processes only read them and move their status
//! forward.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle status shared by jobs and provisioning records.
///
/// ```text
/// pending ──► starting ──► running ──► complete
///                │            │
///                └────────────┴──────► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created by the API, not yet admitted.
    #[default]
    Pending,
    /// Admitted by the gate, process being launched.
    Starting,
    /// Process reported that it started work.
    Running,
    /// Finished successfully.
    Complete,
    /// Finished unsuccessfully.
    Failed,
}

impl Status {
    /// String form used in the record store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Starting => "starting",
            Status::Running => "running",
            Status::Complete => "complete",
            Status::Failed => "failed",
        }
    }

    /// Complete and failed never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Complete | Status::Failed)
    }

    /// Starting or running: counts against concurrency and ordering checks.
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Starting | Status::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "starting" => Ok(Status::Starting),
            "running" => Ok(Status::Running),
            "complete" => Ok(Status::Complete),
            "failed" => Ok(Status::Failed),
            other => Err(Error::Other(format!("unknown status: {}", other))),
        }
    }
}

/// Pipeline variant of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Task list driven by the workflow's legacy task templates.
    #[serde(rename = "legacy")]
    Legacy,
    /// Build once, deploy to every target.
    #[serde(rename = "merge")]
    Merge,
    /// A review (pull request) was opened.
    #[serde(rename = "review.open")]
    ReviewOpen,
    /// A review received new commits.
    #[serde(rename = "review.update")]
    ReviewUpdate,
    /// A review was closed.
    #[serde(rename = "review.close")]
    ReviewClose,
}

impl JobKind {
    /// String form used in the record store.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Legacy => "legacy",
            JobKind::Merge => "merge",
            JobKind::ReviewOpen => "review.open",
            JobKind::ReviewUpdate => "review.update",
            JobKind::ReviewClose => "review.close",
        }
    }

    /// Kind prefix before the first `.`, used by the admission gate.
    pub fn prefix(&self) -> &'static str {
        match self {
            JobKind::Legacy => "legacy",
            JobKind::Merge => "merge",
            JobKind::ReviewOpen | JobKind::ReviewUpdate | JobKind::ReviewClose => "review",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// Fetch source.
    Clone,
    /// Build a release.
    Build,
    /// Copy a build between racks/apps.
    Copy,
    /// Promote a release.
    Promote,
    /// Run a one-off command.
    Run,
    /// Run the test suite against a release.
    Test,
    /// Build a throwaway release for tests.
    TestBuild,
    /// Run tests against the throwaway release.
    TestRun,
    /// Create an app.
    Create,
    /// Delete an app.
    Delete,
    /// Apply an environment to an app.
    Env,
}

impl TaskKind {
    /// String form used in the record store.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Clone => "clone",
            TaskKind::Build => "build",
            TaskKind::Copy => "copy",
            TaskKind::Promote => "promote",
            TaskKind::Run => "run",
            TaskKind::Test => "test",
            TaskKind::TestBuild => "test-build",
            TaskKind::TestRun => "test-run",
            TaskKind::Create => "create",
            TaskKind::Delete => "delete",
            TaskKind::Env => "env",
        }
    }
}

/// Status of a single task. Tasks are persisted once they start running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Step in progress.
    Running,
    /// Step succeeded.
    Complete,
    /// Step failed.
    Failed,
}

/// One step of a job, with its own log object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Step kind.
    pub kind: TaskKind,
    /// Human readable title, also used as the pending VCS status.
    pub title: String,
    /// Object store key of the task log.
    pub logs: String,
    /// Current status.
    pub status: TaskStatus,
    /// When the step started.
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    /// When the step ended.
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,
}

/// One execution of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier.
    pub id: String,
    /// Owning workflow.
    pub workflow_id: String,
    /// Owning organization (denormalized from the workflow).
    pub organization_id: String,
    /// Pipeline variant.
    pub kind: JobKind,
    /// Trigger parameters (`ref`, `name`, `description`, ...).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Supervised process id, set by the worker.
    #[serde(default)]
    pub pid: Option<String>,
    /// Live service domains recorded by demo review runs.
    #[serde(default)]
    pub services: BTreeMap<String, String>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: Status,
    /// Steps in execution order.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Failure reason for failed jobs.
    #[serde(default)]
    pub error: Option<String>,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// When the job process started work.
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
}

impl Job {
    /// New pending job for a workflow.
    pub fn new(id: impl Into<String>, workflow: &Workflow, kind: JobKind) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow.id.clone(),
            organization_id: workflow.organization_id.clone(),
            kind,
            params: BTreeMap::new(),
            pid: None,
            services: BTreeMap::new(),
            status: Status::Pending,
            tasks: Vec::new(),
            error: None,
            created: Utc::now(),
            started: None,
            finished: None,
        }
    }

    /// Add a trigger parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Logical review name (e.g. the pull request) of review jobs.
    pub fn review_name(&self) -> Option<&str> {
        self.params.get("name").map(String::as_str)
    }

    /// Parameter lookup that treats a missing key as empty.
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).map(String::as_str).unwrap_or("")
    }

    /// Link to the job in the console.
    pub fn url(&self, external_host: &str) -> String {
        format!(
            "https://{}/organizations/{}/jobs/{}",
            external_host, self.organization_id, self.id
        )
    }
}

/// Trigger type of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    /// Triggered by merges to a branch.
    Merge,
    /// Triggered by review (pull request) events.
    Review,
    /// Pre-workflow task lists.
    Legacy,
}

impl WorkflowKind {
    /// String form used in notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Merge => "merge",
            WorkflowKind::Review => "review",
            WorkflowKind::Legacy => "legacy",
        }
    }
}

/// Step template of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowTaskKind {
    /// Legacy: build on a rack/app.
    Build,
    /// Legacy: copy the last build to another rack/app.
    Copy,
    /// Legacy: promote the last release.
    Promote,
    /// Legacy: run a command against the last release.
    Run,
    /// Merge: deploy target.
    Deploy,
    /// Template kinds this executor does not know about.
    #[serde(other)]
    Unknown,
}

/// Step template with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTask {
    /// Template kind.
    pub kind: WorkflowTaskKind,
    /// Template parameters (`rack`, `app`, `promote`, ...).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl WorkflowTask {
    /// Parameter lookup that treats a missing key as empty.
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Reusable pipeline definition, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow identifier.
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Display name.
    pub name: String,
    /// Trigger type.
    pub kind: WorkflowKind,
    /// Source integration used to clone and report statuses.
    #[serde(default)]
    pub integration_id: Option<String>,
    /// Repository in the source provider (e.g. `owner/repo`).
    #[serde(default)]
    pub repository: Option<String>,
    /// Workflow parameters (`rack`, `manifest`, `env`, `test`, `demo`, hooks).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Step templates.
    #[serde(default)]
    pub tasks: Vec<WorkflowTask>,
}

impl Workflow {
    /// Parameter lookup that treats a missing key as empty.
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Tenant owning racks, workflows and integrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Billing plan.
    #[serde(default)]
    pub plan: String,
    /// Explicit job concurrency; zero means plan default.
    #[serde(default)]
    pub override_concurrency: u32,
}

impl Organization {
    /// Maximum number of jobs allowed in starting+running at once.
    pub fn job_concurrency(&self) -> usize {
        if self.override_concurrency > 0 {
            return self.override_concurrency as usize;
        }

        if self.plan_enterprise() {
            5
        } else if self.plan_pro() {
            3
        } else {
            1
        }
    }

    fn plan_enterprise(&self) -> bool {
        self.plan == "enterprise" || self.plan.starts_with("enterprise-dynamic-")
    }

    fn plan_pro(&self) -> bool {
        matches!(
            self.plan.as_str(),
            "pro"
                | "pro-user-month"
                | "pro-v3"
                | "pro-v3-annual"
                | "pro-v3-annual-full"
                | "pro-v3-static"
        )
    }
}

/// Managed unit of provisioned infrastructure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rack {
    /// Rack identifier.
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Rack name.
    pub name: String,
    /// Cloud provider (`aws`, `gcp`, `azure`, `do`, ...).
    #[serde(default)]
    pub provider: String,
    /// API host (`host:port`).
    #[serde(default)]
    pub host: String,
    /// API password.
    #[serde(default)]
    pub password: String,
    /// Install parameters, including the derived `release`.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Runtime integration holding cloud credentials.
    #[serde(default)]
    pub runtime: Option<String>,
    /// Terraform state lock.
    #[serde(default)]
    pub locked: bool,
    /// Creation time.
    pub created: DateTime<Utc>,
}

impl Rack {
    /// Rack API URL with embedded credentials.
    pub fn url(&self) -> String {
        format!("https://convox:{}@{}", self.password, self.host)
    }

    /// Object store key of the rack's terraform state.
    pub fn state_key(&self) -> String {
        format!(
            "organizations/{}/racks/{}/state",
            self.organization_id, self.id
        )
    }

    /// Remote-state HTTP backend URL of the rack.
    ///
    /// The embedded password is `base64url(HMAC-SHA256(rack_key, rack_id))`,
    /// so the backend can verify it without storing per-rack secrets.
    pub fn terraform_backend(&self, host: &str, rack_key: &str) -> String {
        format!(
            "https://terraform:{}@{}/organizations/{}/racks/{}/terraform",
            backend_token(rack_key, &self.id),
            host,
            self.organization_id,
            self.id
        )
    }

    /// Release recorded by the last install/update.
    pub fn release(&self) -> Option<&str> {
        self.parameters
            .get("release")
            .map(String::as_str)
            .filter(|r| !r.is_empty())
    }
}

fn backend_token(key: &str, rack_id: &str) -> String {
    use base64::Engine as _;
    use hmac::{Hmac, Mac};

    let mut mac = <Hmac<sha2::Sha256> as Mac>::new_from_slice(key.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(rack_id.as_bytes());
    base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes())
}

/// Provisioning operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionKind {
    /// Stand up a new rack.
    Install,
    /// Tear a rack down.
    Uninstall,
    /// Change a rack's version or parameters.
    Update,
}

impl ProvisionKind {
    /// String form, also the `rack` subcommand and the queue type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionKind::Install => "install",
            ProvisionKind::Uninstall => "uninstall",
            ProvisionKind::Update => "update",
        }
    }

    /// Plural used in object store keys and table kinds.
    pub fn plural(&self) -> &'static str {
        match self {
            ProvisionKind::Install => "installs",
            ProvisionKind::Uninstall => "uninstalls",
            ProvisionKind::Update => "updates",
        }
    }
}

impl fmt::Display for ProvisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(ProvisionKind::Install),
            "uninstall" => Ok(ProvisionKind::Uninstall),
            "update" => Ok(ProvisionKind::Update),
            other => Err(Error::Other(format!("unknown job: {}", other))),
        }
    }
}

/// Provisioning technology used for a rack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    /// Binary-driven legacy engine.
    V2,
    /// Terraform-driven engine.
    #[default]
    V3,
}

impl Engine {
    /// Parse an engine name; anything other than `v2` selects terraform.
    pub fn parse(s: &str) -> Self {
        match s {
            "v2" => Engine::V2,
            _ => Engine::V3,
        }
    }

    /// String form used in the record store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::V2 => "v2",
            Engine::V3 => "v3",
        }
    }
}

impl Serialize for Engine {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Engine {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Engine::parse(&s))
    }
}

/// Install, uninstall or update of a rack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRecord {
    /// Record identifier.
    pub id: String,
    /// Operation kind.
    pub kind: ProvisionKind,
    /// Owning organization.
    pub organization_id: String,
    /// Target rack.
    pub rack_id: String,
    /// Provisioning engine.
    #[serde(default)]
    pub engine: Engine,
    /// Rack name (installs).
    #[serde(default)]
    pub name: String,
    /// Cloud region (installs).
    #[serde(default)]
    pub region: String,
    /// Target version.
    #[serde(default)]
    pub version: String,
    /// Caller supplied parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Supervised process id, set by the worker.
    #[serde(default)]
    pub pid: Option<String>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: Status,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// When the rack process started work.
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    /// When the record reached a terminal status.
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
}

impl ProvisionRecord {
    /// New pending record for a rack.
    pub fn new(id: impl Into<String>, kind: ProvisionKind, rack: &Rack) -> Self {
        Self {
            id: id.into(),
            kind,
            organization_id: rack.organization_id.clone(),
            rack_id: rack.id.clone(),
            engine: Engine::default(),
            name: rack.name.clone(),
            region: String::new(),
            version: String::new(),
            params: BTreeMap::new(),
            pid: None,
            status: Status::Pending,
            created: Utc::now(),
            started: None,
            finished: None,
        }
    }

    /// Object store key of the operation's log.
    pub fn logs_key(&self) -> String {
        format!(
            "organizations/{}/racks/{}/{}/{}",
            self.organization_id,
            self.rack_id,
            self.kind.plural(),
            self.id
        )
    }
}
