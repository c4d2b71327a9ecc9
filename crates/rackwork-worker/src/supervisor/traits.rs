// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Supervisor trait definitions.
//!
//! A supervised process is started detached and from then on only known by
//! its pid string, which is persisted on the record. Every later operation
//! (liveness probe, signal) may happen in another worker process, so nothing
//! about a started process is kept in memory beyond what the backend needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from supervisor operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SupervisorError {
    /// The process could not be started.
    #[error("Process start failed: {0}")]
    StartFailed(String),

    /// A pid string could not be interpreted by this backend.
    #[error("Invalid pid: {0}")]
    InvalidPid(String),

    /// Signalling the process failed.
    #[error("Signal failed for {pid}: {reason}")]
    SignalFailed {
        /// Target pid.
        pid: String,
        /// Backend error description.
        reason: String,
    },

    /// Remote process API call failed.
    #[error("Rack API error: {0}")]
    Api(String),

    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A URL could not be parsed.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Handle to a started process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    /// Backend process id (local OS pid or remote process id).
    pub pid: String,
    /// Command line that was started, for logs.
    pub command: String,
    /// When the process was started.
    pub started_at: DateTime<Utc>,
}

/// Starts, probes and signals detached processes.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Backend name for logs.
    fn supervisor_type(&self) -> &'static str;

    /// Start `program args...` detached and return its handle.
    ///
    /// The process outlives the call; the supervisor never waits for it to
    /// finish.
    async fn start(&self, program: &str, args: &[String]) -> Result<ProcessHandle>;

    /// Whether the process is still alive.
    ///
    /// `Ok(false)` means the backend positively knows the process is gone.
    /// An `Err` means the probe itself failed and says nothing about the
    /// process.
    async fn alive(&self, pid: &str) -> Result<bool>;

    /// Ask the process to terminate.
    async fn signal(&self, pid: &str) -> Result<()>;
}
