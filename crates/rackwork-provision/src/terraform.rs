// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terraform driver: runs the provisioning CLI against a rack's remote state.
//!
//! Racks are created by whatever terraform version was current at install
//! time, and state written by a newer terraform cannot be read by an older
//! one. Before touching an existing rack the driver reads the version out of
//! the remote state and downloads exactly that binary into a scratch home
//! directory that is put first on the CLI's `PATH`.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use rackwork_core::process;
use rackwork_core::{Config, LogWriter};

use crate::error::{ProvisionError, Result};

/// Name of the terraform binary inside release archives.
pub const TERRAFORM_BINARY: &str = "terraform";

/// Drives `convox rack ...` for one rack and cloud provider.
#[derive(Debug, Clone)]
pub struct TerraformDriver {
    cli: String,
    provider: String,
    backend: String,
    development: bool,
    download_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct StateVersion {
    #[serde(default)]
    terraform_version: String,
}

impl TerraformDriver {
    /// Driver for `provider` using the HTTP state `backend`.
    ///
    /// In development the backend's certificate is not verified, both by
    /// this driver and by the CLI it runs.
    pub fn new(
        cli: impl Into<String>,
        provider: impl Into<String>,
        backend: impl Into<String>,
        development: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(development)
            .build()?;

        Ok(Self {
            cli: cli.into(),
            provider: provider.into(),
            backend: backend.into(),
            development,
            download_url: rackwork_core::config::DEFAULT_TERRAFORM_DOWNLOAD_URL.to_string(),
            client,
        })
    }

    /// Driver configured from the shared settings.
    pub fn from_config(
        config: &Config,
        provider: impl Into<String>,
        backend: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::new(&config.cli, provider, backend, config.development)?
            .with_download_url(&config.terraform_download_url))
    }

    /// Set the download URL template (`{version}` is substituted).
    pub fn with_download_url(mut self, template: impl Into<String>) -> Self {
        self.download_url = template.into();
        self
    }

    /// Install a new rack.
    ///
    /// A failed install is rolled back with an uninstall so no half-created
    /// infrastructure is left behind.
    pub async fn install(
        &self,
        name: &str,
        version: &str,
        env: &BTreeMap<String, String>,
        params: &BTreeMap<String, String>,
        out: &LogWriter,
    ) -> Result<()> {
        let home = scratch_home()?;

        let mut args = vec![
            "rack".to_string(),
            "install".to_string(),
            self.provider.clone(),
            name.to_string(),
            "-v".to_string(),
            version.to_string(),
        ];
        args.extend(param_args(params));

        let Err(install_err) = self.convox(home.path(), env, &args, out).await else {
            return Ok(());
        };

        warn!(rack = %name, error = %install_err, "Install failed, rolling back");
        out.writeln("install failed, cleaning up").await?;

        let uninstall = ["rack".to_string(), "uninstall".to_string(), name.to_string()];
        match self.convox(home.path(), env, &uninstall, out).await {
            Ok(()) => Err(ProvisionError::InstallFailed(install_err.to_string())),
            Err(e) => Err(ProvisionError::CleanupFailed(e.to_string())),
        }
    }

    /// Tear a rack down.
    ///
    /// The CLI needs the rack's terraform configuration on disk, so it is
    /// regenerated with a `--prepare` install at the rack's current version
    /// first. `release` is derived state and is never passed back.
    pub async fn uninstall(
        &self,
        name: &str,
        version: &str,
        env: &BTreeMap<String, String>,
        params: &BTreeMap<String, String>,
        out: &LogWriter,
    ) -> Result<()> {
        let home = scratch_home()?;
        self.download_terraform(home.path()).await?;

        let mut prepare = vec![
            "rack".to_string(),
            "install".to_string(),
            self.provider.clone(),
            name.to_string(),
            "--prepare".to_string(),
            "-v".to_string(),
            version.to_string(),
        ];
        prepare.extend(param_args(
            params.iter().filter(|(k, _)| k.as_str() != "release"),
        ));
        self.convox(home.path(), env, &prepare, out).await?;

        let uninstall = ["rack".to_string(), "uninstall".to_string(), name.to_string()];
        self.convox(home.path(), env, &uninstall, out).await
    }

    /// Move a rack to `version` with `params`.
    pub async fn update(
        &self,
        name: &str,
        version: &str,
        env: &BTreeMap<String, String>,
        params: &BTreeMap<String, String>,
        out: &LogWriter,
    ) -> Result<()> {
        let home = scratch_home()?;
        self.download_terraform(home.path()).await?;

        let mut args = vec![
            "rack".to_string(),
            "install".to_string(),
            self.provider.clone(),
            name.to_string(),
            "-v".to_string(),
            version.to_string(),
        ];
        args.extend(param_args(params));

        self.convox(home.path(), env, &args, out).await
    }

    /// Fetch the raw remote state from the backend.
    pub async fn fetch_state(&self) -> Result<Vec<u8>> {
        let url = format!("{}/state", self.backend);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProvisionError::State(format!("could not fetch state: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::State(format!(
                "could not fetch state: {}",
                status
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Download the terraform version recorded in the remote state into `dir`.
    pub async fn download_terraform(&self, dir: &Path) -> Result<PathBuf> {
        let state = self.fetch_state().await?;
        let version = state_terraform_version(&state)?;
        let url = self.download_url.replace("{version}", &version);

        info!(version = %version, url = %url, "Downloading terraform");

        let archive = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?
            .to_vec();

        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_terraform(archive, &dir))
            .await
            .map_err(|e| ProvisionError::Other(format!("unpack task failed: {}", e)))?
    }

    async fn convox(
        &self,
        home: &Path,
        env: &BTreeMap<String, String>,
        args: &[String],
        out: &LogWriter,
    ) -> Result<()> {
        let path = match std::env::var("PATH") {
            Ok(path) if !path.is_empty() => format!("{}:{}", home.display(), path),
            _ => home.display().to_string(),
        };

        debug!(cli = %self.cli, args = %process::shell_join(args), "Running provisioning CLI");

        let mut cmd = Command::new(&self.cli);
        cmd.args(args)
            .env_clear()
            .env("CONVOX_TERRAFORM_BACKEND", &self.backend)
            .env(
                "CONVOX_TERRAFORM_BACKEND_INSECURE",
                if self.development { "true" } else { "false" },
            )
            .env("HOME", home)
            .env("PATH", path)
            .envs(env);

        process::stream_forwarding_signals(&mut cmd, out).await?;
        Ok(())
    }
}

/// Terraform version that wrote `state`.
pub fn state_terraform_version(state: &[u8]) -> Result<String> {
    let parsed: StateVersion = serde_json::from_slice(state)?;
    if parsed.terraform_version.is_empty() {
        return Err(ProvisionError::State(
            "unknown terraform version in state".to_string(),
        ));
    }
    Ok(parsed.terraform_version)
}

fn unpack_terraform(archive: Vec<u8>, dir: &Path) -> Result<PathBuf> {
    let mut archive = ZipArchive::new(Cursor::new(archive))?;
    archive.extract(dir)?;

    let binary = dir.join(TERRAFORM_BINARY);
    if !binary.is_file() {
        return Err(ProvisionError::Other(format!(
            "archive has no {} binary",
            TERRAFORM_BINARY
        )));
    }
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755))?;

    Ok(binary)
}

fn scratch_home() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix("rack-").tempdir()?)
}

fn param_args<'a>(params: impl IntoIterator<Item = (&'a String, &'a String)>) -> Vec<String> {
    params
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect()
}
