// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rackwork Core - records, queue and shared plumbing
//!
//! Everything the worker and the spawned `job`/`rack` processes share:
//!
//! ```text
//!  ┌──────────────┐   enqueue    ┌───────────────┐  dequeue + gate  ┌──────────────────┐
//!  │  API layer   │─────────────►│  Queue        │─────────────────►│  rackwork-worker │
//!  │  (external)  │              │  (SQLite)     │                  │  dispatch, reap  │
//!  └──────┬───────┘              └───────────────┘                  └────────┬─────────┘
//!         │ create records                                                   │ spawn
//!         ▼                                                                  ▼
//!  ┌──────────────┐    read / write status     ┌─────────────────────────────────────┐
//!  │ Record store │◄──────────────────────────►│  job <id>     (rackwork-pipeline)   │
//!  │  (SQLite)    │                            │  rack <op> <id> (rackwork-provision)│
//!  └──────────────┘                            └──────────────────┬──────────────────┘
//!                                                                 │ logs, state
//!                                                                 ▼
//!                                                        ┌─────────────────┐
//!                                                        │  Object store   │
//!                                                        └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`model`] | jobs, tasks, workflows, organizations, racks, provisioning records |
//! | [`persistence`] | record store trait and SQLite/in-memory backends |
//! | [`queue`] | grouped at-least-once queue and the receive-ceiling dequeuer |
//! | [`object_store`] | append-only logs and terraform state |
//! | [`integration`] / [`connectors`] | capability-typed integrations and their HTTP clients |
//! | [`lifecycle`] | terminal transitions with outward reporting |
//! | [`process`] | external command helpers |
//! | [`context`] | dependency bundle handed to every component |

#![deny(missing_docs)]

pub mod config;
pub mod connectors;
pub mod context;
pub mod entrypoint;
pub mod error;
pub mod integration;
pub mod lifecycle;
pub mod migrations;
pub mod model;
pub mod object_store;
pub mod persistence;
pub mod process;
pub mod queue;
pub mod tracker;

pub use config::Config;
pub use context::Context;
pub use error::{Error, Result};
pub use object_store::LogWriter;
