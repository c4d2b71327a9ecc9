// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for rackwork-provision.

use thiserror::Error;

/// Provisioning errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProvisionError {
    /// Record store, object store or child process failure.
    #[error(transparent)]
    Core(#[from] rackwork_core::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request to the state backend or the terraform mirror failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A URL could not be parsed.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Terraform archive could not be unpacked.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Remote state is missing or lacks a required value.
    #[error("{0}")]
    State(String),

    /// Install failed and the rollback uninstall succeeded.
    #[error("install failed: {0}")]
    InstallFailed(String),

    /// Install failed and so did the rollback uninstall.
    #[error("install cleanup failed: {0}")]
    CleanupFailed(String),

    /// The engine does not support the operation.
    #[error("{0}")]
    Unsupported(&'static str),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
