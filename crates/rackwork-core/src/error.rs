// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for rackwork-core.

use thiserror::Error;

/// Core errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request to a collaborator failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A URL could not be parsed.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A record was not found in the record store.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind (job, workflow, rack, ...).
        kind: &'static str,
        /// Record identifier.
        id: String,
    },

    /// Object was not found in the object store.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// An external process exited unsuccessfully.
    #[error("{program} exited with {status}")]
    ProcessFailed {
        /// Program that was run.
        program: String,
        /// Exit status description.
        status: String,
    },

    /// Queue message could not be decoded.
    #[error("Invalid queue message: {0}")]
    InvalidMessage(String),

    /// Integration is missing or lacks the required capability.
    #[error("Integration error: {0}")]
    Integration(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a missing record.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Result type using core Error.
pub type Result<T> = std::result::Result<T, Error>;
