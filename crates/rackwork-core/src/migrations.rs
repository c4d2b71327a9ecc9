// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schema setup for the SQLite record store and queue.
//!
//! Table names carry the configured prefix, so the schema is applied as raw
//! SQL after substitution rather than through an embedded migrator.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect(&config.database_url).await?;
//! rackwork_core::migrations::run_sqlite(&pool, &config.table_prefix).await?;
//! ```

use sqlx::SqlitePool;

/// Schema with `{prefix}` placeholders.
pub const SCHEMA: &str = include_str!("../migrations/schema.sql");

/// Schema text for a given table prefix.
pub fn schema(prefix: &str) -> String {
    SCHEMA.replace("{prefix}", &table_prefix(prefix))
}

/// Apply the schema. Safe to call repeatedly.
pub async fn run_sqlite(pool: &SqlitePool, prefix: &str) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(&schema(prefix)).execute(pool).await?;
    Ok(())
}

/// Normalize a prefix into something usable inside an identifier.
pub(crate) fn table_prefix(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
