// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed record store.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use super::{Document, DocumentFilter, Persistence};
use crate::error::{Error, Result};
use crate::migrations;

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
    table: String,
}

impl SqlitePersistence {
    /// Create a provider from an existing pool. The schema must already exist.
    pub fn new(pool: SqlitePool, prefix: &str) -> Self {
        Self {
            pool,
            table: format!("{}records", migrations::table_prefix(prefix)),
        }
    }

    /// Open (creating if needed) a database file and apply the schema.
    pub async fn from_path(path: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url, prefix).await
    }

    /// Connect to a database URL and apply the schema.
    pub async fn connect(url: &str, prefix: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        migrations::run_sqlite(&pool, prefix).await?;

        Ok(Self::new(pool, prefix))
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
        let created_at: String = row.try_get("created_at")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::Other(format!("invalid created_at {}: {}", created_at, e)))?
            .with_timezone(&Utc);
        let body: String = row.try_get("body")?;

        Ok(Document {
            kind: row.try_get("kind")?,
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            status: row.try_get("status")?,
            created_at,
            body: serde_json::from_str(&body)?,
        })
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn get_document(&self, kind: &str, id: &str) -> Result<Option<Document>> {
        let sql = format!(
            r#"
            SELECT kind, id, organization_id, status, created_at, body
            FROM {}
            WHERE kind = ? AND id = ?
            "#,
            self.table
        );

        let row = sqlx::query(&sql)
            .bind(kind)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn put_document(&self, doc: &Document) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (kind, id, organization_id, status, created_at, body)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (kind, id) DO UPDATE SET
                organization_id = excluded.organization_id,
                status = excluded.status,
                created_at = excluded.created_at,
                body = excluded.body
            "#,
            self.table
        );

        sqlx::query(&sql)
            .bind(&doc.kind)
            .bind(&doc.id)
            .bind(&doc.organization_id)
            .bind(&doc.status)
            .bind(timestamp(&doc.created_at))
            .bind(serde_json::to_string(&doc.body)?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_document(&self, kind: &str, id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE kind = ? AND id = ?", self.table);

        sqlx::query(&sql)
            .bind(kind)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let sql = format!(
            r#"
            SELECT kind, id, organization_id, status, created_at, body
            FROM {}
            WHERE kind = ?
              AND (? IS NULL OR status = ?)
              AND (? IS NULL OR organization_id = ?)
            ORDER BY created_at ASC, id ASC
            "#,
            self.table
        );

        let rows = sqlx::query(&sql)
            .bind(&filter.kind)
            .bind(&filter.status)
            .bind(&filter.status)
            .bind(&filter.organization_id)
            .bind(&filter.organization_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_document).collect()
    }
}
