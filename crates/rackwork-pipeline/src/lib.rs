// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rackwork Pipeline - build, test and deploy jobs
//!
//! The `job <id>` process runs one job of a workflow:
//!
//! ```text
//!  job j1
//!    │ wait for pid
//!    ▼
//!  ┌──────────┐  kind   ┌──────────┐  step  ┌─────────┐  RACK_URL  ┌──────┐
//!  │ Executor │────────►│ Pipeline │───────►│ RackCli │───────────►│ rack │
//!  └────┬─────┘         └────┬─────┘        └─────────┘            └──────┘
//!       │ terminal status    │ task records, per-task logs
//!       ▼                    ▼
//!  record store         object store
//! ```
//!
//! Tasks are appended and saved as they start, so the job record always
//! shows how far the run got.

#![deny(missing_docs)]

pub mod error;
pub mod executor;
pub mod pipeline;
pub mod rack_cli;
pub mod steps;

pub use error::{PipelineError, Result};
pub use executor::{Executor, FAILED_REASON, PidWait};
pub use pipeline::Pipeline;
pub use rack_cli::{CliCall, ConvoxCli, MockCli, RackCli};
pub use steps::Step;
