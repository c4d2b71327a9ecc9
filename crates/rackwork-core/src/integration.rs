// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Organization integrations and the client traits used to talk to them.
//!
//! An integration carries exactly one capability. Components ask for the
//! capability they need (`source()`, `runtime()`, `notification()`) and get
//! `None` when the integration does not provide it, instead of probing a
//! client at runtime.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object_store::LogWriter;

/// Integration record owned by the CRUD layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationRecord {
    /// Integration identifier.
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// What the integration can do.
    pub capability: Capability,
}

impl IntegrationRecord {
    /// Cloud credentials, when this is a runtime integration.
    pub fn runtime(&self) -> Option<&RuntimeIntegration> {
        match &self.capability {
            Capability::Runtime(r) => Some(r),
            _ => None,
        }
    }

    /// Source provider, when this is a source integration.
    pub fn source(&self) -> Option<&SourceIntegration> {
        match &self.capability {
            Capability::Source(s) => Some(s),
            _ => None,
        }
    }

    /// Notification endpoint, when this is a notification integration.
    pub fn notification(&self) -> Option<&NotificationIntegration> {
        match &self.capability {
            Capability::Notification(n) => Some(n),
            _ => None,
        }
    }

    /// Like [`runtime`](Self::runtime) but an error when absent.
    pub fn require_runtime(&self) -> Result<&RuntimeIntegration> {
        self.runtime().ok_or_else(|| {
            Error::Integration(format!("integration {} is not a runtime", self.id))
        })
    }

    /// Like [`source`](Self::source) but an error when absent.
    pub fn require_source(&self) -> Result<&SourceIntegration> {
        self.source().ok_or_else(|| {
            Error::Integration(format!("integration {} is not a source", self.id))
        })
    }
}

/// Capability set of an integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "lowercase")]
pub enum Capability {
    /// Cloud account used to provision racks.
    Runtime(RuntimeIntegration),
    /// Source code host used to clone and report statuses.
    Source(SourceIntegration),
    /// Chat/webhook endpoint receiving workflow events.
    Notification(NotificationIntegration),
}

/// Cloud provider credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeIntegration {
    /// Provider slug (`aws`, `azure`, `do`, `gcp`).
    pub provider: String,
    /// Credential environment for the provisioning CLI
    /// (e.g. `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`).
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

/// Source code host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceProvider {
    /// github.com
    Github,
    /// Self-hosted GitHub.
    GithubEnterprise,
    /// gitlab.com
    Gitlab,
}

/// Source integration data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceIntegration {
    /// Provider.
    pub provider: SourceProvider,
    /// OAuth access token.
    pub token: String,
    /// API/clone host override (enterprise installs, tests).
    #[serde(default)]
    pub host: Option<String>,
}

/// Notification provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationProvider {
    /// Slack incoming webhook.
    Slack,
}

/// Notification integration data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationIntegration {
    /// Provider.
    pub provider: NotificationProvider,
    /// Incoming webhook URL.
    pub webhook: String,
}

/// Commit status state posted to the source provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    /// Step in progress.
    Pending,
    /// Workflow succeeded.
    Success,
    /// Workflow failed.
    Failure,
}

impl CommitState {
    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
        }
    }
}

/// Commit status update.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitStatus {
    /// Repository in the provider (`owner/repo`).
    pub repository: String,
    /// Commit reference.
    pub reference: String,
    /// State.
    pub state: CommitState,
    /// Short description.
    pub description: String,
    /// Link back to the console.
    pub target_url: Option<String>,
}

/// Event sent to notification integrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Event action (`workflow:complete`).
    pub action: String,
    /// Event data (`kind`, ...).
    pub data: BTreeMap<String, String>,
    /// `success`, `error` or `cancel`.
    pub status: String,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    /// `workflow:complete` event for a workflow kind.
    pub fn workflow_complete(kind: &str, status: &str) -> Self {
        let mut data = BTreeMap::new();
        data.insert("kind".to_string(), kind.to_string());
        Self {
            action: "workflow:complete".to_string(),
            data,
            status: status.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Client for a source integration.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Clone `repository` at `reference` into `dir`, streaming git output to `out`.
    async fn clone_repository(
        &self,
        repository: &str,
        reference: &str,
        dir: &Path,
        out: &LogWriter,
    ) -> Result<()>;

    /// Post a commit status.
    async fn status_update(&self, status: &CommitStatus) -> Result<()>;
}

/// Client for a notification integration.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an event. `source` names what the event is about (workflow name).
    async fn send(&self, source: &str, event: &NotificationEvent) -> Result<()>;
}

/// Factory turning integration data into clients.
pub trait Connectors: Send + Sync {
    /// Client for a source integration.
    fn source(&self, integration: &SourceIntegration) -> Result<Box<dyn SourceClient>>;

    /// Client for a notification integration.
    fn notifier(&self, integration: &NotificationIntegration) -> Result<Box<dyn Notifier>>;
}
