// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed durable queue.
//!
//! Only the oldest message of each group is eligible for delivery, so a group
//! is blocked while its head is in flight. Receiving claims the head with an
//! optimistic `UPDATE ... WHERE visible_at <= now`, so two receivers racing
//! for the same row cannot both win.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{Delivery, Queue, VISIBILITY_TIMEOUT};
use crate::error::Result;
use crate::migrations;

/// Interval between receive attempts while long-polling.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Durable queue stored in the `{prefix}queue_messages` table.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    table: String,
    name: String,
    visibility_timeout: Duration,
}

impl SqliteQueue {
    /// Queue `name` in a database whose schema is already applied.
    pub fn new(pool: SqlitePool, prefix: &str, name: impl Into<String>) -> Self {
        Self {
            pool,
            table: format!("{}queue_messages", migrations::table_prefix(prefix)),
            name: name.into(),
            visibility_timeout: VISIBILITY_TIMEOUT,
        }
    }

    /// Override the visibility timeout.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Messages still in the queue, in flight or not.
    pub async fn len(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE queue = ?", self.table);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn try_receive(&self) -> Result<Option<Delivery>> {
        let select = format!(
            r#"
            SELECT m.seq, m.message_id, m.body, m.receive_count
            FROM {table} m
            WHERE m.queue = ?
              AND m.visible_at <= ?
              AND m.seq = (
                  SELECT MIN(h.seq) FROM {table} h
                  WHERE h.queue = m.queue AND h.group_id = m.group_id
              )
            ORDER BY m.seq ASC
            LIMIT 1
            "#,
            table = self.table
        );
        let claim = format!(
            r#"
            UPDATE {}
            SET receive_count = receive_count + 1, visible_at = ?, receipt = ?
            WHERE seq = ? AND visible_at <= ?
            "#,
            self.table
        );

        loop {
            let now = Utc::now().timestamp_millis();

            let Some(row) = sqlx::query(&select)
                .bind(&self.name)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            else {
                return Ok(None);
            };

            let seq: i64 = row.try_get("seq")?;
            let receive_count: i64 = row.try_get("receive_count")?;
            let receipt = uuid::Uuid::new_v4().to_string();
            let visible_at = now + self.visibility_timeout.as_millis() as i64;

            let claimed = sqlx::query(&claim)
                .bind(visible_at)
                .bind(&receipt)
                .bind(seq)
                .bind(now)
                .execute(&self.pool)
                .await?
                .rows_affected();

            if claimed == 0 {
                debug!(seq, "Lost race claiming queue message, retrying");
                continue;
            }

            return Ok(Some(Delivery {
                receipt,
                message_id: row.try_get("message_id")?,
                receive_count: (receive_count + 1) as u32,
                body: row.try_get("body")?,
            }));
        }
    }
}

#[async_trait]
impl Queue for SqliteQueue {
    async fn send(&self, id: &str, group: &str, body: &str) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (queue, message_id, group_id, body, receive_count, visible_at, created_at)
            VALUES (?, ?, ?, ?, 0, 0, ?)
            ON CONFLICT (queue, message_id) DO NOTHING
            "#,
            self.table
        );

        sqlx::query(&sql)
            .bind(&self.name)
            .bind(id)
            .bind(group)
            .bind(body)
            .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_receive().await? {
                return Ok(Some(delivery));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep((deadline - now).min(POLL_INTERVAL)).await;
        }
    }

    async fn delete(&self, receipt: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE queue = ? AND receipt = ?",
            self.table
        );

        sqlx::query(&sql)
            .bind(&self.name)
            .bind(receipt)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_queue(visibility: Duration) -> SqliteQueue {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        migrations::run_sqlite(&pool, "")
            .await
            .expect("Failed to apply schema");

        SqliteQueue::new(pool, "", "worker").with_visibility_timeout(visibility)
    }

    #[tokio::test]
    async fn test_send_dedups_and_receive_orders_by_group() {
        let queue = create_test_queue(Duration::from_secs(10)).await;
        queue.send("a1", "job:o1", "a1").await.unwrap();
        queue.send("a1", "job:o1", "a1").await.unwrap();
        queue.send("a2", "job:o1", "a2").await.unwrap();
        queue.send("b1", "install:o1", "b1").await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 3);

        let first = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(first.message_id, "a1");
        assert_eq!(first.receive_count, 1);

        let second = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(second.message_id, "b1");

        assert!(queue.receive(Duration::ZERO).await.unwrap().is_none());

        queue.delete(&first.receipt).await.unwrap();
        let third = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(third.message_id, "a2");
    }

    #[tokio::test]
    async fn test_redelivery_increments_count_and_invalidates_receipt() {
        let queue = create_test_queue(Duration::from_millis(20)).await;
        queue.send("j1", "job:o1", "{}").await.unwrap();

        let first = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        let second = queue
            .receive(Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.message_id, "j1");
        assert_eq!(second.receive_count, 2);

        queue.delete(&first.receipt).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 1);
        queue.delete(&second.receipt).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queues_are_isolated_by_name() {
        let queue = create_test_queue(Duration::from_secs(10)).await;
        let other = SqliteQueue::new(queue.pool.clone(), "", "other");

        queue.send("x", "job:o1", "{}").await.unwrap();
        assert!(other.receive(Duration::ZERO).await.unwrap().is_none());
        assert!(queue.receive(Duration::ZERO).await.unwrap().is_some());
    }
}
