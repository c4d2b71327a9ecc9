// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Supervised processes: start, alive, signal.
//!
//! [`LocalSupervisor`] runs children on this machine (development);
//! [`RackSupervisor`] runs them inside the hosting rack (production).

pub mod local;
pub mod mock;
pub mod rack;
mod traits;

pub use local::LocalSupervisor;
pub use mock::MockSupervisor;
pub use rack::RackSupervisor;
pub use traits::*;

use std::sync::Arc;

use rackwork_core::Config;

/// Supervisor matching the configured mode.
pub fn from_config(config: &Config) -> Result<Arc<dyn Supervisor>> {
    if config.development {
        return Ok(Arc::new(LocalSupervisor::new()));
    }

    let rack_url = config.rack_url.as_deref().ok_or_else(|| {
        SupervisorError::Api("RACKWORK_RACK_URL is required outside development".to_string())
    })?;

    Ok(Arc::new(RackSupervisor::new(
        rack_url,
        config.app.clone(),
        config.process_service.clone(),
    )?))
}
