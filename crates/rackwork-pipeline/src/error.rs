// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for rackwork-pipeline.

use thiserror::Error;

/// Pipeline errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// Record store, object store, integration or child process failure.
    #[error(transparent)]
    Core(#[from] rackwork_core::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CLI output could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The worker never recorded a pid for the job.
    #[error("could not establish pid")]
    NoPid,

    /// The workflow cannot be cloned.
    #[error("workflow {0} has no source integration")]
    NoSource(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
