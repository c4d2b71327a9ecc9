// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared handles passed to every component.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::connectors::HttpConnectors;
use crate::error::{Error, Result};
use crate::integration::{Connectors, SourceClient};
use crate::model::Workflow;
use crate::object_store::{FsObjectStore, LogWriter, MemoryObjectStore, ObjectStore};
use crate::persistence::{RecordStore, SqlitePersistence};
use crate::queue::{MemoryQueue, Queue, SqliteQueue};
use crate::tracker::{ErrorTracker, LogTracker};

/// Record store, queue, object store and collaborator clients.
///
/// Components receive a `Context` at construction instead of reaching for
/// process-wide singletons.
#[derive(Clone)]
pub struct Context {
    /// Loaded configuration.
    pub config: Config,
    /// Record store.
    pub store: RecordStore,
    /// Worker queue.
    pub queue: Arc<dyn Queue>,
    /// Object store for logs and state.
    pub objects: Arc<dyn ObjectStore>,
    /// Integration client factory.
    pub connectors: Arc<dyn Connectors>,
    /// Error tracker.
    pub tracker: Arc<dyn ErrorTracker>,
}

impl Context {
    /// Open the SQLite store and queue and the filesystem object store
    /// described by `config`.
    pub async fn from_config(config: Config) -> Result<Self> {
        let persistence =
            SqlitePersistence::connect(&config.database_url, &config.table_prefix).await?;
        let queue = SqliteQueue::new(
            persistence.pool().clone(),
            &config.table_prefix,
            config.worker_queue.clone(),
        );

        info!(
            database_url = %redact(&config.database_url),
            queue = %config.worker_queue,
            objects = %config.objects_dir().display(),
            "Opened record store"
        );

        Ok(Self {
            store: RecordStore::new(Arc::new(persistence)),
            queue: Arc::new(queue),
            objects: Arc::new(FsObjectStore::new(config.objects_dir())),
            connectors: Arc::new(HttpConnectors::new(config.development)),
            tracker: Arc::new(LogTracker),
            config,
        })
    }

    /// Fully in-memory context.
    pub fn memory(config: Config) -> Self {
        Self {
            store: RecordStore::memory(),
            queue: Arc::new(MemoryQueue::new()),
            objects: Arc::new(MemoryObjectStore::new()),
            connectors: Arc::new(HttpConnectors::new(config.development)),
            tracker: Arc::new(LogTracker),
            config,
        }
    }

    /// Replace the object store.
    pub fn with_objects(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = objects;
        self
    }

    /// Replace the queue.
    pub fn with_queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.queue = queue;
        self
    }

    /// Replace the integration client factory.
    pub fn with_connectors(mut self, connectors: Arc<dyn Connectors>) -> Self {
        self.connectors = connectors;
        self
    }

    /// Replace the error tracker.
    pub fn with_tracker(mut self, tracker: Arc<dyn ErrorTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Append-only writer for an object key.
    pub fn log_writer(&self, key: impl Into<String>) -> LogWriter {
        LogWriter::new(self.objects.clone(), key)
    }

    /// Source client and repository of a workflow, when it has a source integration.
    pub async fn workflow_source(
        &self,
        workflow: &Workflow,
    ) -> Result<Option<(Box<dyn SourceClient>, String)>> {
        let Some(integration_id) = workflow.integration_id.as_deref() else {
            return Ok(None);
        };
        let integration = self.store.get_integration(integration_id).await?;
        let source = integration.require_source()?;
        let repository = workflow.repository.clone().ok_or_else(|| {
            Error::Integration(format!("workflow {} has no repository", workflow.id))
        })?;
        Ok(Some((self.connectors.source(source)?, repository)))
    }
}

fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
