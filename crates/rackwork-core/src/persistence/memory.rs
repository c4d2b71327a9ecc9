// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory record store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Document, DocumentFilter, Persistence};
use crate::error::Result;

/// Record store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    documents: RwLock<HashMap<(String, String), Document>>,
}

impl MemoryPersistence {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn get_document(&self, kind: &str, id: &str) -> Result<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents.get(&(kind.to_string(), id.to_string())).cloned())
    }

    async fn put_document(&self, doc: &Document) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.insert((doc.kind.clone(), doc.id.clone()), doc.clone());
        Ok(())
    }

    async fn delete_document(&self, kind: &str, id: &str) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.remove(&(kind.to_string(), id.to_string()));
        Ok(())
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let documents = self.documents.read().await;
        let mut matching: Vec<Document> = documents
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }
}
