// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Legacy (`v2`) engine: CloudFormation racks driven by the legacy CLI.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use rackwork_core::model::Engine;
use rackwork_core::process;
use rackwork_core::{Context, LogWriter};

use super::{ProvisionManager, runtime_credentials};
use crate::error::{ProvisionError, Result};

/// One line of the legacy CLI's `--raw` progress protocol.
#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default, alias = "Stack")]
    stack: String,
    #[serde(default, alias = "Current")]
    current: u64,
    #[serde(default, alias = "Total")]
    total: u64,
}

/// Turns the `{stack, current, total}` stream into percentage lines.
///
/// A line is produced only when `current` moves forward, so repeated or
/// out-of-order steps stay silent.
#[derive(Debug, Default)]
pub struct Progress {
    current: u64,
}

impl Progress {
    /// Fresh tracker at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one protocol line. Returns the line to log, if any.
    pub fn advance(&mut self, line: &str) -> Result<Option<String>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let step: Step = serde_json::from_str(line)?;
        if step.current <= self.current {
            return Ok(None);
        }
        self.current = step.current;

        debug!(stack = %step.stack, current = step.current, total = step.total, "Install step");

        if step.total == 0 {
            return Ok(None);
        }
        let percent = u128::from(step.current) * 100 / u128::from(step.total);
        Ok(Some(format!("Progress: {}%", percent)))
    }
}

/// Legacy engine bound to one rack.
pub struct LegacyManager {
    ctx: Context,
    rack_id: String,
    credentials: BTreeMap<String, String>,
}

impl LegacyManager {
    /// Load the rack's runtime credentials.
    pub async fn new(ctx: Context, rack_id: &str) -> Result<Self> {
        let rack = ctx.store.get_rack(rack_id).await?;
        let credentials = runtime_credentials(&ctx, &rack).await?;

        Ok(Self {
            ctx,
            rack_id: rack_id.to_string(),
            credentials,
        })
    }

    fn path() -> String {
        std::env::var("PATH").unwrap_or_default()
    }

    /// Copy the API endpoint the CLI logged into onto the rack.
    async fn save_auth(&self, home: &Path) -> Result<()> {
        let data = tokio::fs::read(home.join(".convox").join("auth")).await?;
        let auth: BTreeMap<String, String> = serde_json::from_slice(&data)?;

        let mut rack = self.ctx.store.get_rack(&self.rack_id).await?;
        for (host, password) in auth {
            rack.host = host;
            rack.password = password;
        }
        self.ctx.store.save_rack(&rack).await?;

        info!(rack_id = %self.rack_id, host = %rack.host, "Saved rack endpoint");
        Ok(())
    }
}

#[async_trait]
impl ProvisionManager for LegacyManager {
    fn engine(&self) -> Engine {
        Engine::V2
    }

    async fn install(
        &self,
        name: &str,
        _version: &str,
        region: &str,
        _params: BTreeMap<String, String>,
        out: &LogWriter,
    ) -> Result<()> {
        let home = tempfile::Builder::new().prefix("rack-").tempdir()?;
        let cli = &self.ctx.config.legacy_cli;

        let mut cmd = Command::new(cli);
        cmd.args(["rack", "install", "aws", "--name", name, "--raw"])
            .env_clear()
            .env("HOME", home.path())
            .env("PATH", Self::path())
            .env("AWS_REGION", region)
            .env("AWS_DEFAULT_REGION", region)
            .envs(&self.credentials)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ProvisionError::Other(format!("failed to start {}: {}", cli, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProvisionError::Other(format!("{}: stdout not captured", cli)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProvisionError::Other(format!("{}: stderr not captured", cli)))?;

        let stderr_task = {
            let out = out.clone();
            tokio::spawn(async move { copy_to_log(stderr, &out).await })
        };

        let mut progress = Progress::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(message) = progress.advance(&line)? {
                out.writeln(&message).await?;
            }
        }

        let status = child.wait().await?;
        stderr_task
            .await
            .map_err(|e| ProvisionError::Other(format!("{}: output task failed: {}", cli, e)))??;

        if !status.success() {
            return Err(rackwork_core::Error::ProcessFailed {
                program: cli.clone(),
                status: status.to_string(),
            }
            .into());
        }

        self.save_auth(home.path()).await
    }

    async fn uninstall(&self, out: &LogWriter) -> Result<()> {
        let rack = self.ctx.store.get_rack(&self.rack_id).await?;

        let mut cmd = Command::new(&self.ctx.config.legacy_cli);
        cmd.args(["rack", "uninstall", "aws", rack.name.as_str(), "--force"])
            .env_clear()
            .env("PATH", Self::path())
            .envs(&self.credentials);

        process::stream(&mut cmd, out).await?;
        Ok(())
    }

    async fn update(
        &self,
        _name: &str,
        _version: &str,
        _params: BTreeMap<String, String>,
        _out: &LogWriter,
    ) -> Result<()> {
        Err(ProvisionError::Unsupported("v2 racks are self updating"))
    }
}

async fn copy_to_log<R: AsyncRead + Unpin>(mut reader: R, out: &LogWriter) -> Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        out.write(&buf[..n]).await?;
    }
}
