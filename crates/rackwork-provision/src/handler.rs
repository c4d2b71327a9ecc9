// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Body of the `rack` process: run one install, uninstall or update record
//! to a terminal status.
//!
//! Everything the user should see goes to the record's log key. Unexpected
//! errors are captured by the error tracker and only their reference id is
//! written there.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use rackwork_core::model::{Engine, ProvisionKind, ProvisionRecord, Status};
use rackwork_core::{Context, LogWriter, lifecycle, tracker};

use crate::error::{ProvisionError, Result};
use crate::manager::{Engines, ManagerFactory};

/// Runs provisioning records through their engine.
pub struct Handler {
    ctx: Context,
    managers: Arc<dyn ManagerFactory>,
}

impl Handler {
    /// Handler building managers with `managers`.
    pub fn new(ctx: Context, managers: Arc<dyn ManagerFactory>) -> Self {
        Self { ctx, managers }
    }

    /// Handler using the default engines.
    pub fn from_context(ctx: Context) -> Self {
        let managers = Arc::new(Engines::new(ctx.clone()));
        Self::new(ctx, managers)
    }

    /// Run record `id` of `kind` and move it to `complete` or `failed`.
    pub async fn run(&self, kind: ProvisionKind, id: &str) -> Result<()> {
        info!(kind = %kind, id = %id, "Provisioning started");

        let result = match kind {
            ProvisionKind::Install => self.install(id).await,
            ProvisionKind::Uninstall => self.uninstall(id).await,
            ProvisionKind::Update => self.update(id).await,
        };

        match result {
            Ok(()) => {
                lifecycle::succeed_provision(&self.ctx, kind, id).await?;
                info!(kind = %kind, id = %id, "Provisioning complete");
                Ok(())
            }
            Err(e) => {
                if let Err(fe) = lifecycle::fail_provision(&self.ctx, kind, id, &e.to_string()).await
                {
                    error!(kind = %kind, id = %id, error = %fe, "Could not mark record failed");
                }
                Err(e)
            }
        }
    }

    async fn install(&self, id: &str) -> Result<()> {
        let mut record = self.ctx.store.get_provision(ProvisionKind::Install, id).await?;
        let out = self.ctx.log_writer(record.logs_key());

        out.writeln("Installing Rack...").await?;

        if let Err(e) = self.mark_running(&mut record).await {
            return Err(self.report(&out, e).await);
        }

        let manager = match self.managers.manager(record.engine, &record.rack_id).await {
            Ok(manager) => manager,
            Err(e) => return Err(self.report(&out, e).await),
        };
        manager
            .install(
                &record.name,
                &record.version,
                &record.region,
                record.params.clone(),
                &out,
            )
            .await
    }

    async fn uninstall(&self, id: &str) -> Result<()> {
        let mut record = self
            .ctx
            .store
            .get_provision(ProvisionKind::Uninstall, id)
            .await?;
        let out = self.ctx.log_writer(record.logs_key());

        out.writeln("Uninstalling Rack...").await?;

        if let Err(e) = self.mark_running(&mut record).await {
            return Err(self.report(&out, e).await);
        }

        let rack = match self.ctx.store.get_rack(&record.rack_id).await {
            Ok(rack) => rack,
            Err(e) => return Err(self.report(&out, e.into()).await),
        };

        let manager = match self.managers.manager(record.engine, &rack.id).await {
            Ok(manager) => manager,
            Err(e) => {
                warn!(rack_id = %rack.id, error = %e, "Could not initialize manager");
                let e = ProvisionError::Other("could not initialize manager".to_string());
                return Err(self.report(&out, e).await);
            }
        };

        if let Err(e) = manager.uninstall(&out).await {
            return Err(self.report(&out, e).await);
        }

        if let Err(e) = self.ctx.store.delete_rack(&rack.id).await {
            return Err(self.report(&out, e.into()).await);
        }

        info!(rack_id = %rack.id, "Rack deleted");
        Ok(())
    }

    async fn update(&self, id: &str) -> Result<()> {
        let mut record = self.ctx.store.get_provision(ProvisionKind::Update, id).await?;
        self.mark_running(&mut record).await?;

        let out = self.ctx.log_writer(record.logs_key());
        out.writeln("Updating Rack...").await?;

        let rack = match self.ctx.store.get_rack(&record.rack_id).await {
            Ok(rack) => rack,
            Err(e) => return Err(self.report(&out, e.into()).await),
        };

        let mut params: BTreeMap<String, String> = rack
            .parameters
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.extend(record.params.clone());

        // Updates always go through terraform, whatever engine installed the rack.
        let manager = match self.managers.manager(Engine::V3, &rack.id).await {
            Ok(manager) => manager,
            Err(e) => return Err(self.report(&out, e).await),
        };

        if let Err(e) = manager.update(&rack.name, &record.version, params, &out).await {
            return Err(self.report(&out, e).await);
        }
        Ok(())
    }

    async fn mark_running(&self, record: &mut ProvisionRecord) -> Result<()> {
        record.started = Some(Utc::now());
        record.status = Status::Running;
        self.ctx.store.save_provision(record).await?;
        Ok(())
    }

    async fn report(&self, out: &LogWriter, err: ProvisionError) -> ProvisionError {
        if let Err(e) = tracker::report(self.ctx.tracker.as_ref(), out, &err).await {
            warn!(error = %e, "Could not write error reference");
        }
        err
    }
}
