// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provisioning engines.
//!
//! | Engine | Install | Uninstall | Update |
//! |--------|---------|-----------|--------|
//! | `v2` ([`LegacyManager`]) | legacy CLI, progress protocol | legacy CLI | refused |
//! | `v3` ([`TerraformManager`]) | terraform driver + state sync | `--prepare` then uninstall | terraform driver + state sync |

mod legacy;
mod terraform;

pub use legacy::{LegacyManager, Progress};
pub use terraform::{StateOutputs, TerraformManager, api_endpoint, sync};

use std::collections::BTreeMap;

use async_trait::async_trait;

use rackwork_core::model::{Engine, Rack};
use rackwork_core::{Context, LogWriter};

use crate::error::{ProvisionError, Result};

/// Install, uninstall and update of one rack.
#[async_trait]
pub trait ProvisionManager: Send + Sync {
    /// Engine implemented by this manager.
    fn engine(&self) -> Engine;

    /// Stand the rack up.
    async fn install(
        &self,
        name: &str,
        version: &str,
        region: &str,
        params: BTreeMap<String, String>,
        out: &LogWriter,
    ) -> Result<()>;

    /// Tear the rack down.
    async fn uninstall(&self, out: &LogWriter) -> Result<()>;

    /// Move the rack to `version` with `params`.
    async fn update(
        &self,
        name: &str,
        version: &str,
        params: BTreeMap<String, String>,
        out: &LogWriter,
    ) -> Result<()>;
}

/// Builds the manager for a rack.
#[async_trait]
pub trait ManagerFactory: Send + Sync {
    /// Manager of `engine` bound to rack `rack_id`.
    async fn manager(&self, engine: Engine, rack_id: &str) -> Result<Box<dyn ProvisionManager>>;
}

/// Default factory: `v2` selects the legacy engine, everything else terraform.
#[derive(Clone)]
pub struct Engines {
    ctx: Context,
}

impl Engines {
    /// Factory over the shared context.
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ManagerFactory for Engines {
    async fn manager(&self, engine: Engine, rack_id: &str) -> Result<Box<dyn ProvisionManager>> {
        let manager: Box<dyn ProvisionManager> = match engine {
            Engine::V2 => Box::new(LegacyManager::new(self.ctx.clone(), rack_id).await?),
            Engine::V3 => Box::new(TerraformManager::new(self.ctx.clone(), rack_id).await?),
        };
        Ok(manager)
    }
}

/// Cloud credentials of the rack's runtime integration.
pub(crate) async fn runtime_credentials(
    ctx: &Context,
    rack: &Rack,
) -> Result<BTreeMap<String, String>> {
    let integration_id = rack.runtime.as_deref().ok_or_else(|| {
        ProvisionError::Core(rackwork_core::Error::Integration(format!(
            "rack {} has no runtime integration",
            rack.id
        )))
    })?;

    let integration = ctx.store.get_integration(integration_id).await?;
    Ok(integration.require_runtime()?.credentials.clone())
}
