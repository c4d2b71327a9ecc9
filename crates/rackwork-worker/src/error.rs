// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for rackwork-worker.

use thiserror::Error;

/// Worker errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Record store, queue or other core operation failed.
    #[error("Core error: {0}")]
    Core(#[from] rackwork_core::Error),

    /// Starting, probing or signalling a process failed.
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] crate::supervisor::SupervisorError),

    /// A queue message is missing a required field.
    #[error("Invalid work item: {0}")]
    InvalidWork(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using Worker Error.
pub type Result<T> = std::result::Result<T, Error>;
