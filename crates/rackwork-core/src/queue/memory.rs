// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory queue with the same delivery semantics as [`SqliteQueue`].
//!
//! [`SqliteQueue`]: super::SqliteQueue

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Delivery, Queue, VISIBILITY_TIMEOUT};
use crate::error::Result;

#[derive(Debug)]
struct Entry {
    id: String,
    group: String,
    body: String,
    receive_count: u32,
    visible_at: Instant,
    receipt: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<Entry>,
}

/// Queue held in process memory.
#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<State>,
    arrived: Notify,
    visibility_timeout: Duration,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    /// Empty queue with the default visibility timeout.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            arrived: Notify::new(),
            visibility_timeout: VISIBILITY_TIMEOUT,
        }
    }

    /// Override the visibility timeout.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Messages still in the queue, in flight or not.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the queue holds no messages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn try_receive(&self) -> Option<Delivery> {
        let mut state = self.lock();
        let now = Instant::now();

        // Entries are kept in send order, so the first entry seen for a group is its head.
        let mut seen_groups: Vec<&str> = Vec::new();
        let mut chosen = None;
        for (index, entry) in state.entries.iter().enumerate() {
            if seen_groups.contains(&entry.group.as_str()) {
                continue;
            }
            seen_groups.push(entry.group.as_str());
            if entry.visible_at <= now {
                chosen = Some(index);
                break;
            }
        }

        let index = chosen?;
        let entry = &mut state.entries[index];
        let receipt = uuid::Uuid::new_v4().to_string();
        entry.receive_count += 1;
        entry.visible_at = now + self.visibility_timeout;
        entry.receipt = Some(receipt.clone());

        Some(Delivery {
            receipt,
            message_id: entry.id.clone(),
            receive_count: entry.receive_count,
            body: entry.body.clone(),
        })
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn send(&self, id: &str, group: &str, body: &str) -> Result<()> {
        {
            let mut state = self.lock();
            if state.entries.iter().any(|e| e.id == id) {
                return Ok(());
            }
            state.entries.push(Entry {
                id: id.to_string(),
                group: group.to_string(),
                body: body.to_string(),
                receive_count: 0,
                visible_at: Instant::now(),
                receipt: None,
            });
        }
        self.arrived.notify_waiters();
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_receive() {
                return Ok(Some(delivery));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            // Wake on new messages, or re-check shortly for visibility expiry.
            let recheck = (deadline - now).min(Duration::from_millis(100));
            tokio::select! {
                _ = self.arrived.notified() => {}
                _ = tokio::time::sleep(recheck) => {}
            }
        }
    }

    async fn delete(&self, receipt: &str) -> Result<()> {
        let mut state = self.lock();
        state
            .entries
            .retain(|e| e.receipt.as_deref() != Some(receipt));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_group_fifo_and_cross_group_progress() {
        let queue = MemoryQueue::new();
        queue.send("a1", "job:o1", "a1").await.unwrap();
        queue.send("a2", "job:o1", "a2").await.unwrap();
        queue.send("b1", "job:o2", "b1").await.unwrap();

        let first = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(first.message_id, "a1");

        // a1 is in flight, so a2 must wait; b1 is free.
        let second = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(second.message_id, "b1");
        assert!(queue.receive(Duration::ZERO).await.unwrap().is_none());

        queue.delete(&first.receipt).await.unwrap();
        let third = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(third.message_id, "a2");
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_ignored_while_outstanding() {
        let queue = MemoryQueue::new();
        queue.send("i1", "install:o1", "x").await.unwrap();
        queue.send("i1", "install:o1", "x").await.unwrap();
        assert_eq!(queue.len(), 1);

        let delivery = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        queue.delete(&delivery.receipt).await.unwrap();
        queue.send("i1", "install:o1", "x").await.unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivery_after_visibility_timeout() {
        let queue = MemoryQueue::new();
        queue.send("j1", "job:o1", "x").await.unwrap();

        let first = queue.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(first.receive_count, 1);
        assert!(queue.receive(Duration::from_secs(5)).await.unwrap().is_none());

        let second = queue
            .receive(Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.receive_count, 2);

        // The first receipt is stale now.
        queue.delete(&first.receipt).await.unwrap();
        assert_eq!(queue.len(), 1);
        queue.delete(&second.receipt).await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_wakes_on_send() {
        let queue = std::sync::Arc::new(MemoryQueue::new());
        let sender = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            sender.send("late", "job:o1", "x").await.unwrap();
        });

        let delivery = queue.receive(Duration::from_secs(10)).await.unwrap();
        assert_eq!(delivery.unwrap().message_id, "late");
    }
}
