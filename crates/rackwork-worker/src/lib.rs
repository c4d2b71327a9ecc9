// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rackwork Worker - queue consumer and process supervisor
//!
//! One worker process runs per deployment. It owns two loops:
//!
//! - the **dispatch loop** ([`dispatcher::Worker`]) pulls work items from the
//!   queue, asks the [`admission::AdmissionGate`] whether each may start, and
//!   launches a detached `job <id>` or `rack <kind> <id>` process for the ones
//!   that may, recording the process id on the record;
//! - the **reaper** ([`reaper::Reaper`]) periodically fails running jobs
//!   whose process has died.
//!
//! Processes are started through a [`supervisor::Supervisor`]: local child
//! processes in development, remote processes on the hosting rack otherwise.

#![deny(missing_docs)]

pub mod admission;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod reaper;
pub mod runtime;
pub mod supervisor;

pub use admission::AdmissionGate;
pub use config::WorkerConfig;
pub use dispatcher::{Dispatch, Worker};
pub use error::{Error, Result};
pub use reaper::{Reaper, ReaperConfig};
pub use runtime::WorkerRuntime;
