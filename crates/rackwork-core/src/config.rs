// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;

/// Default template for pinned terraform downloads.
pub const DEFAULT_TERRAFORM_DOWNLOAD_URL: &str =
    "https://releases.hashicorp.com/terraform/{version}/terraform_{version}_linux_amd64.zip";

/// Shared configuration for the worker and the spawned `job`/`rack` processes.
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name on the hosting rack
    pub app: String,
    /// SQLite connection URL for the record store and queue
    pub database_url: String,
    /// Prefix applied to every table name
    pub table_prefix: String,
    /// Logical worker queue name
    pub worker_queue: String,
    /// Root directory for the filesystem object store
    pub data_dir: PathBuf,
    /// Development mode (local processes, short reap interval)
    pub development: bool,
    /// Console host used for terraform backend URLs
    pub host: String,
    /// Host used for links back to the console
    pub external_host: String,
    /// Secret for deriving terraform backend credentials
    pub rack_key: String,
    /// URL of the rack hosting the console (remote process execution)
    pub rack_url: Option<String>,
    /// Service used for remote process runs
    pub process_service: String,
    /// Provisioning/build CLI binary
    pub cli: String,
    /// Legacy provisioning CLI binary
    pub legacy_cli: String,
    /// Terraform download URL template (`{version}` is substituted)
    pub terraform_download_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: "console".to_string(),
            database_url: "sqlite:.data/rackwork.db?mode=rwc".to_string(),
            table_prefix: String::new(),
            worker_queue: "worker".to_string(),
            data_dir: PathBuf::from(".data"),
            development: false,
            host: "localhost".to_string(),
            external_host: "localhost".to_string(),
            rack_key: String::new(),
            rack_url: None,
            process_service: "worker".to_string(),
            cli: "convox".to_string(),
            legacy_cli: "convox2".to_string(),
            terraform_download_url: DEFAULT_TERRAFORM_DOWNLOAD_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional; see the crate documentation for defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let development = match std::env::var("RACKWORK_MODE") {
            Ok(mode) => match mode.as_str() {
                "development" => true,
                "production" | "" => false,
                _ => {
                    return Err(ConfigError::Invalid(
                        "RACKWORK_MODE",
                        "must be development or production",
                    ));
                }
            },
            Err(_) => false,
        };

        let host = env_or("RACKWORK_HOST", &defaults.host);
        let external_host = std::env::var("RACKWORK_EXTERNAL_HOST")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| host.clone());

        let terraform_download_url = env_or(
            "RACKWORK_TERRAFORM_DOWNLOAD_URL",
            &defaults.terraform_download_url,
        );
        if !terraform_download_url.contains("{version}") {
            return Err(ConfigError::Invalid(
                "RACKWORK_TERRAFORM_DOWNLOAD_URL",
                "must contain a {version} placeholder",
            ));
        }

        Ok(Self {
            app: env_or("RACKWORK_APP", &defaults.app),
            database_url: env_or("RACKWORK_DATABASE_URL", &defaults.database_url),
            table_prefix: std::env::var("RACKWORK_TABLE_PREFIX").unwrap_or_default(),
            worker_queue: env_or("RACKWORK_WORKER_QUEUE", &defaults.worker_queue),
            data_dir: PathBuf::from(env_or("RACKWORK_DATA_DIR", ".data")),
            development,
            host,
            external_host,
            rack_key: std::env::var("RACKWORK_RACK_KEY").unwrap_or_default(),
            rack_url: std::env::var("RACKWORK_RACK_URL")
                .ok()
                .filter(|u| !u.is_empty()),
            process_service: env_or("RACKWORK_PROCESS_SERVICE", &defaults.process_service),
            cli: env_or("RACKWORK_CLI", &defaults.cli),
            legacy_cli: env_or("RACKWORK_LEGACY_CLI", &defaults.legacy_cli),
            terraform_download_url,
        })
    }

    /// Directory holding the filesystem object store.
    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    /// Download URL for a specific terraform version.
    pub fn terraform_download_url_for(&self, version: &str) -> String {
        self.terraform_download_url.replace("{version}", version)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
