// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Record store interfaces and backends.
//!
//! Backends implement [`Persistence`], a small document API keyed by
//! `(kind, id)` with `organization_id`/`status` columns lifted out of the body
//! for filtering. [`RecordStore`] layers the typed accessors every component
//! uses on top of it.
//!
//! Saves are last-writer-wins and nothing here is transactional: callers that
//! need to serialize a read-modify-write hold their own lock.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryPersistence;
pub use self::sqlite::SqlitePersistence;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::integration::IntegrationRecord;
use crate::model::{Job, Organization, ProvisionKind, ProvisionRecord, Rack, Status, Workflow};

/// Stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Record kind (`jobs`, `workflows`, `installs`, ...).
    pub kind: String,
    /// Record identifier, unique within its kind.
    pub id: String,
    /// Owning organization, empty when not applicable.
    pub organization_id: String,
    /// Status, empty for records without one.
    pub status: String,
    /// Creation time, used for ordering.
    pub created_at: DateTime<Utc>,
    /// Serialized record.
    pub body: serde_json::Value,
}

/// Filter for [`Persistence::list_documents`].
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Record kind.
    pub kind: String,
    /// Only documents with this status.
    pub status: Option<String>,
    /// Only documents owned by this organization.
    pub organization_id: Option<String>,
}

impl DocumentFilter {
    /// Every document of a kind.
    pub fn kind(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    /// Restrict to a status.
    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    /// Restrict to an organization.
    pub fn organization(mut self, organization_id: &str) -> Self {
        self.organization_id = Some(organization_id.to_string());
        self
    }

    /// Whether a document passes the filter.
    pub fn matches(&self, doc: &Document) -> bool {
        doc.kind == self.kind
            && self.status.as_deref().is_none_or(|s| doc.status == s)
            && self
                .organization_id
                .as_deref()
                .is_none_or(|o| doc.organization_id == o)
    }
}

/// Record store backend.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Fetch one document.
    async fn get_document(&self, kind: &str, id: &str) -> Result<Option<Document>>;

    /// Insert or replace a document.
    async fn put_document(&self, doc: &Document) -> Result<()>;

    /// Delete a document. Missing documents are not an error.
    async fn delete_document(&self, kind: &str, id: &str) -> Result<()>;

    /// Documents matching a filter, oldest first.
    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>>;
}

const JOBS: &str = "jobs";
const WORKFLOWS: &str = "workflows";
const ORGANIZATIONS: &str = "organizations";
const INTEGRATIONS: &str = "integrations";
const RACKS: &str = "racks";

/// Typed access to the record store.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn Persistence>,
}

impl RecordStore {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn Persistence>) -> Self {
        Self { backend }
    }

    /// In-memory store, for development and tests.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryPersistence::new()))
    }

    /// Underlying backend.
    pub fn backend(&self) -> &Arc<dyn Persistence> {
        &self.backend
    }

    // Jobs

    /// Fetch a job.
    pub async fn get_job(&self, id: &str) -> Result<Job> {
        self.get(JOBS, "job", id).await
    }

    /// Save a job.
    pub async fn save_job(&self, job: &Job) -> Result<()> {
        self.put(
            JOBS,
            &job.id,
            &job.organization_id,
            job.status.as_str(),
            job.created,
            job,
        )
        .await
    }

    /// Jobs with a status, oldest first.
    pub async fn list_jobs_by_status(&self, status: Status) -> Result<Vec<Job>> {
        self.list(&DocumentFilter::kind(JOBS).status(status.as_str()))
            .await
    }

    /// Jobs in starting or running, oldest first.
    pub async fn list_active_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = self.list_jobs_by_status(Status::Starting).await?;
        jobs.extend(self.list_jobs_by_status(Status::Running).await?);
        Ok(jobs)
    }

    // Workflows

    /// Fetch a workflow.
    pub async fn get_workflow(&self, id: &str) -> Result<Workflow> {
        self.get(WORKFLOWS, "workflow", id).await
    }

    /// Save a workflow.
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.put(
            WORKFLOWS,
            &workflow.id,
            &workflow.organization_id,
            "",
            Utc::now(),
            workflow,
        )
        .await
    }

    // Organizations

    /// Fetch an organization.
    pub async fn get_organization(&self, id: &str) -> Result<Organization> {
        self.get(ORGANIZATIONS, "organization", id).await
    }

    /// Save an organization.
    pub async fn save_organization(&self, organization: &Organization) -> Result<()> {
        self.put(
            ORGANIZATIONS,
            &organization.id,
            &organization.id,
            "",
            Utc::now(),
            organization,
        )
        .await
    }

    // Integrations

    /// Fetch an integration.
    pub async fn get_integration(&self, id: &str) -> Result<IntegrationRecord> {
        self.get(INTEGRATIONS, "integration", id).await
    }

    /// Save an integration.
    pub async fn save_integration(&self, integration: &IntegrationRecord) -> Result<()> {
        self.put(
            INTEGRATIONS,
            &integration.id,
            &integration.organization_id,
            "",
            Utc::now(),
            integration,
        )
        .await
    }

    /// Every integration of an organization.
    pub async fn list_organization_integrations(
        &self,
        organization_id: &str,
    ) -> Result<Vec<IntegrationRecord>> {
        self.list(&DocumentFilter::kind(INTEGRATIONS).organization(organization_id))
            .await
    }

    // Provisioning

    /// Fetch an install, uninstall or update.
    pub async fn get_provision(&self, kind: ProvisionKind, id: &str) -> Result<ProvisionRecord> {
        self.get(kind.plural(), kind.as_str(), id).await
    }

    /// Save an install, uninstall or update.
    pub async fn save_provision(&self, record: &ProvisionRecord) -> Result<()> {
        self.put(
            record.kind.plural(),
            &record.id,
            &record.organization_id,
            record.status.as_str(),
            record.created,
            record,
        )
        .await
    }

    // Racks

    /// Fetch a rack.
    pub async fn get_rack(&self, id: &str) -> Result<Rack> {
        self.get(RACKS, "rack", id).await
    }

    /// Save a rack.
    pub async fn save_rack(&self, rack: &Rack) -> Result<()> {
        self.put(
            RACKS,
            &rack.id,
            &rack.organization_id,
            "",
            rack.created,
            rack,
        )
        .await
    }

    /// Delete a rack.
    pub async fn delete_rack(&self, id: &str) -> Result<()> {
        self.backend.delete_document(RACKS, id).await
    }

    async fn get<T: DeserializeOwned>(&self, kind: &str, label: &'static str, id: &str) -> Result<T> {
        match self.backend.get_document(kind, id).await? {
            Some(doc) => Ok(serde_json::from_value(doc.body)?),
            None => Err(Error::not_found(label, id)),
        }
    }

    async fn put<T: Serialize>(
        &self,
        kind: &str,
        id: &str,
        organization_id: &str,
        status: &str,
        created_at: DateTime<Utc>,
        record: &T,
    ) -> Result<()> {
        let doc = Document {
            kind: kind.to_string(),
            id: id.to_string(),
            organization_id: organization_id.to_string(),
            status: status.to_string(),
            created_at,
            body: serde_json::to_value(record)?,
        };
        self.backend.put_document(&doc).await
    }

    async fn list<T: DeserializeOwned>(&self, filter: &DocumentFilter) -> Result<Vec<T>> {
        self.backend
            .list_documents(filter)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc.body).map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobKind, WorkflowKind};
    use std::collections::BTreeMap;

    fn workflow() -> Workflow {
        Workflow {
            id: "w1".to_string(),
            organization_id: "o1".to_string(),
            name: "deploy".to_string(),
            kind: WorkflowKind::Merge,
            integration_id: None,
            repository: None,
            params: BTreeMap::new(),
            tasks: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_job_status_index_follows_saves() {
        let store = RecordStore::memory();
        let mut job = Job::new("j1", &workflow(), JobKind::Merge);
        store.save_job(&job).await.unwrap();

        assert!(store.list_active_jobs().await.unwrap().is_empty());

        job.status = Status::Starting;
        store.save_job(&job).await.unwrap();
        let active = store.list_active_jobs().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "j1");

        job.status = Status::Complete;
        store.save_job(&job).await.unwrap();
        assert!(store.list_active_jobs().await.unwrap().is_empty());
        assert_eq!(
            store
                .list_jobs_by_status(Status::Complete)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let store = RecordStore::memory();
        assert!(matches!(
            store.get_job("nope").await,
            Err(Error::NotFound { kind: "job", .. })
        ));
        assert!(matches!(
            store.get_provision(ProvisionKind::Uninstall, "nope").await,
            Err(Error::NotFound {
                kind: "uninstall",
                ..
            })
        ));
    }

    #[test]
    fn test_filter_matches() {
        let doc = Document {
            kind: "jobs".to_string(),
            id: "j1".to_string(),
            organization_id: "o1".to_string(),
            status: "running".to_string(),
            created_at: Utc::now(),
            body: serde_json::Value::Null,
        };
        assert!(DocumentFilter::kind("jobs").matches(&doc));
        assert!(DocumentFilter::kind("jobs").status("running").matches(&doc));
        assert!(!DocumentFilter::kind("jobs").status("starting").matches(&doc));
        assert!(!DocumentFilter::kind("jobs").organization("o2").matches(&doc));
        assert!(!DocumentFilter::kind("racks").matches(&doc));
    }
}
