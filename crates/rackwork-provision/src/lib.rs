// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rackwork Provision - rack install, uninstall and update
//!
//! The `rack <install|uninstall|update> <id>` process loads one provisioning
//! record, selects its engine and drives the rack to a terminal status:
//!
//! ```text
//!  rack install i1
//!      │
//!      ▼
//!  ┌─────────┐  engine   ┌────────────────────┐        ┌──────────────────┐
//!  │ Handler │──────────►│ LegacyManager (v2) │───────►│ legacy CLI       │
//!  │         │           ├────────────────────┤        └──────────────────┘
//!  │         │           │ TerraformManager   │───────►┌──────────────────┐
//!  └────┬────┘           │ (v3)               │        │ TerraformDriver  │
//!       │                └─────────┬──────────┘        │ CLI + terraform  │
//!       │ status, logs             │ sync outputs      └──────────────────┘
//!       ▼                          ▼
//!  record store, object store   rack record
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod handler;
pub mod manager;
pub mod terraform;

pub use error::{ProvisionError, Result};
pub use handler::Handler;
pub use manager::{Engines, ManagerFactory, ProvisionManager};
pub use terraform::TerraformDriver;
