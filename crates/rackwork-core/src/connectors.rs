// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP-backed integration clients.
//!
//! Source integrations clone with the `git` CLI and post commit statuses to
//! the provider API. Notification integrations post to an incoming webhook.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::process::Command;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::integration::{
    CommitState, CommitStatus, Connectors, NotificationEvent, NotificationIntegration,
    NotificationProvider, Notifier, SourceClient, SourceIntegration, SourceProvider,
};
use crate::object_store::LogWriter;
use crate::process;

/// Default connector factory.
#[derive(Clone)]
pub struct HttpConnectors {
    http: Client,
    git: String,
    status_context: String,
}

impl HttpConnectors {
    /// Connectors using the system `git`. Development mode posts statuses
    /// under a separate context so they do not clobber production ones.
    pub fn new(development: bool) -> Self {
        Self {
            http: Client::new(),
            git: "git".to_string(),
            status_context: if development {
                "convox/dev".to_string()
            } else {
                "convox".to_string()
            },
        }
    }

    /// Override the git binary.
    pub fn with_git(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }
}

impl Connectors for HttpConnectors {
    fn source(&self, integration: &SourceIntegration) -> Result<Box<dyn SourceClient>> {
        let host = integration.host.clone();
        let client: Box<dyn SourceClient> = match integration.provider {
            SourceProvider::Github => Box::new(GithubClient {
                http: self.http.clone(),
                git: self.git.clone(),
                token: integration.token.clone(),
                api: host
                    .as_ref()
                    .map(|h| format!("https://{}/api/v3", h))
                    .unwrap_or_else(|| "https://api.github.com".to_string()),
                clone_host: host.unwrap_or_else(|| "github.com".to_string()),
                context: self.status_context.clone(),
            }),
            SourceProvider::GithubEnterprise => {
                let host = host.ok_or_else(|| {
                    Error::Integration("github enterprise integration has no host".to_string())
                })?;
                Box::new(GithubClient {
                    http: self.http.clone(),
                    git: self.git.clone(),
                    token: integration.token.clone(),
                    api: format!("https://{}/api/v3", host),
                    clone_host: host,
                    context: self.status_context.clone(),
                })
            }
            SourceProvider::Gitlab => {
                let host = host.unwrap_or_else(|| "gitlab.com".to_string());
                Box::new(GitlabClient {
                    http: self.http.clone(),
                    git: self.git.clone(),
                    token: integration.token.clone(),
                    api: format!("https://{}/api/v4", host),
                    clone_host: host,
                    context: self.status_context.clone(),
                })
            }
        };
        Ok(client)
    }

    fn notifier(&self, integration: &NotificationIntegration) -> Result<Box<dyn Notifier>> {
        match integration.provider {
            NotificationProvider::Slack => Ok(Box::new(SlackNotifier {
                http: self.http.clone(),
                webhook: integration.webhook.clone(),
            })),
        }
    }
}

/// GitHub (and GitHub Enterprise) client.
pub struct GithubClient {
    http: Client,
    git: String,
    token: String,
    api: String,
    clone_host: String,
    context: String,
}

impl GithubClient {
    /// Client against an explicit API base URL.
    pub fn new(token: impl Into<String>, api: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            git: "git".to_string(),
            token: token.into(),
            api: api.into(),
            clone_host: "github.com".to_string(),
            context: "convox".to_string(),
        }
    }
}

#[async_trait]
impl SourceClient for GithubClient {
    async fn clone_repository(
        &self,
        repository: &str,
        reference: &str,
        dir: &Path,
        out: &LogWriter,
    ) -> Result<()> {
        let mut url = Url::parse(&format!("https://{}/{}.git", self.clone_host, repository))?;
        url.set_username(&self.token)
            .map_err(|_| Error::Integration("invalid clone url".to_string()))?;
        git_clone(&self.git, url.as_str(), reference, dir, out).await
    }

    async fn status_update(&self, status: &CommitStatus) -> Result<()> {
        let url = format!(
            "{}/repos/{}/statuses/{}",
            self.api, status.repository, status.reference
        );

        let mut body = json!({
            "state": status.state.as_str(),
            "description": status.description,
            "context": self.context,
        });
        if let Some(target) = &status.target_url {
            body["target_url"] = json!(target);
        }

        debug!(repository = %status.repository, state = status.state.as_str(), "Posting commit status");

        self.http
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "rackwork")
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// GitLab client.
pub struct GitlabClient {
    http: Client,
    git: String,
    token: String,
    api: String,
    clone_host: String,
    context: String,
}

impl GitlabClient {
    /// Client against an explicit API base URL.
    pub fn new(token: impl Into<String>, api: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            git: "git".to_string(),
            token: token.into(),
            api: api.into(),
            clone_host: "gitlab.com".to_string(),
            context: "convox".to_string(),
        }
    }
}

#[async_trait]
impl SourceClient for GitlabClient {
    async fn clone_repository(
        &self,
        repository: &str,
        reference: &str,
        dir: &Path,
        out: &LogWriter,
    ) -> Result<()> {
        let url = format!(
            "https://oauth2:{}@{}/{}",
            self.token, self.clone_host, repository
        );
        git_clone(&self.git, &url, reference, dir, out).await
    }

    async fn status_update(&self, status: &CommitStatus) -> Result<()> {
        let project = repository_path_escape(&status.repository);
        let url = format!(
            "{}/projects/{}/statuses/{}",
            self.api, project, status.reference
        );

        let state = match status.state {
            CommitState::Pending => "running",
            CommitState::Success => "success",
            CommitState::Failure => "failed",
        };

        let mut body = json!({
            "state": state,
            "description": status.description,
            "name": self.context,
        });
        if let Some(target) = &status.target_url {
            body["target_url"] = json!(target);
        }

        self.http
            .post(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

fn repository_path_escape(repository: &str) -> String {
    repository.replace('/', "%2F")
}

/// Clone into `dir` the way a fresh checkout of a single ref is done:
/// init, add the remote, fetch, hard reset to the ref, init submodules.
async fn git_clone(git: &str, url: &str, reference: &str, dir: &Path, out: &LogWriter) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    let steps: [(&[&str], &str); 5] = [
        (&["init"], "git init"),
        (&["remote", "add", "origin", url], "git remote add origin <repository>"),
        (&["remote", "update", "origin"], "git remote update origin"),
        (&["reset", "--hard", reference], ""),
        (&["submodule", "update", "--init"], "git submodule update --init"),
    ];

    for (args, echo) in steps {
        if echo.is_empty() {
            out.writeln(&format!("git {}", args.join(" "))).await?;
        } else {
            out.writeln(echo).await?;
        }

        let mut cmd = Command::new(git);
        cmd.args(args).current_dir(dir);
        process::stream(&mut cmd, out).await?;
    }

    Ok(())
}

/// Slack incoming-webhook notifier.
pub struct SlackNotifier {
    http: Client,
    webhook: String,
}

impl SlackNotifier {
    /// Notifier posting to `webhook`.
    pub fn new(webhook: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            webhook: webhook.into(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, source: &str, event: &NotificationEvent) -> Result<()> {
        let Some(message) = format_event(source, event) else {
            return Ok(());
        };

        let color = match event.status.as_str() {
            "success" => "good",
            "error" => "danger",
            _ => "",
        };

        let payload = json!({
            "attachments": [{ "color": color, "text": message }]
        });

        self.http
            .post(&self.webhook)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Chat message for an event, if the event is worth one.
pub fn format_event(source: &str, event: &NotificationEvent) -> Option<String> {
    if event.action != "workflow:complete" {
        return None;
    }

    let label = match event.data.get("kind").map(String::as_str) {
        Some("merge") | Some("deployment") => "Deployment workflow",
        Some("review") => "Review workflow",
        _ => return None,
    };

    let outcome = match event.status.as_str() {
        "cancel" => "cancelled",
        "error" => "failed",
        _ => "complete",
    };

    Some(format!("[*{}*] {} {}", source, label, outcome))
}
