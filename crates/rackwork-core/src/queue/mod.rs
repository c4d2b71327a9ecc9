// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable, grouped work queue.
//!
//! Delivery is at-least-once and FIFO within a group. A received message stays
//! in the queue, invisible for the visibility timeout, until it is deleted.
//! The [`Dequeuer`] uses that to retry admission: a message the gate is not
//! ready for is simply left alone and comes back after the timeout.
//!
//! ```text
//!   enqueue ──► [ group A: a1 a2 ] [ group B: b1 ]
//!                    │ head only
//!                    ▼
//!   receive ──► count > 720 ? delete, drop
//!                    │
//!                    ▼
//!               gate.admit(item)
//!                 ready ──► delete, return item
//!                 not ready / error ──► leave for redelivery
//! ```

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryQueue;
pub use self::sqlite::SqliteQueue;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::ProvisionKind;

/// Deliveries after which a message is dropped without reaching the gate.
pub const MAX_RECEIVE_COUNT: u32 = 720;

/// How long a received message stays invisible.
pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Long-poll duration of one receive.
pub const WAIT_TIME: Duration = Duration::from_secs(10);

/// Kind of work carried by a queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkKind {
    /// Rack install.
    Install,
    /// Rack uninstall.
    Uninstall,
    /// Rack update.
    Update,
    /// Pipeline job.
    Job,
}

impl WorkKind {
    /// Wire form (`type` field).
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::Install => "install",
            WorkKind::Uninstall => "uninstall",
            WorkKind::Update => "update",
            WorkKind::Job => "job",
        }
    }

    /// Provisioning kind, for install/uninstall/update.
    pub fn provision(&self) -> Option<ProvisionKind> {
        match self {
            WorkKind::Install => Some(ProvisionKind::Install),
            WorkKind::Uninstall => Some(ProvisionKind::Uninstall),
            WorkKind::Update => Some(ProvisionKind::Update),
            WorkKind::Job => None,
        }
    }
}

impl From<ProvisionKind> for WorkKind {
    fn from(kind: ProvisionKind) -> Self {
        match kind {
            ProvisionKind::Install => WorkKind::Install,
            ProvisionKind::Uninstall => WorkKind::Uninstall,
            ProvisionKind::Update => WorkKind::Update,
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Record id; also the deduplication key.
    pub id: String,
    /// Work kind.
    #[serde(rename = "type")]
    pub kind: WorkKind,
    /// Owning organization; part of the group key.
    #[serde(rename = "organization", default)]
    pub organization_id: String,
    /// Kind-specific keys (`workflow`, `name`, ...).
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

impl WorkItem {
    /// Item without extra attributes.
    pub fn new(kind: WorkKind, id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            organization_id: organization_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// FIFO group: `{type}:{organization}`.
    pub fn group(&self) -> String {
        format!("{}:{}", self.kind, self.organization_id)
    }

    /// Attribute lookup.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Handle for deleting this delivery.
    pub receipt: String,
    /// Deduplication id the message was sent with.
    pub message_id: String,
    /// How many times the message has been received, this time included.
    pub receive_count: u32,
    /// Message body.
    pub body: String,
}

/// Transport underneath the [`Dequeuer`].
#[async_trait]
pub trait Queue: Send + Sync {
    /// Submit a message. A duplicate id still in the queue is ignored.
    async fn send(&self, id: &str, group: &str, body: &str) -> Result<()>;

    /// Receive the next eligible message, waiting up to `wait`.
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>>;

    /// Delete a received message. Stale receipts are ignored.
    async fn delete(&self, receipt: &str) -> Result<()>;
}

/// Gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed now; the message is deleted.
    Ready,
    /// Leave the message for redelivery.
    NotReady,
}

/// Decides whether a dequeued item may proceed.
#[async_trait]
pub trait Admit: Send + Sync {
    /// Decide on one item.
    async fn admit(&self, item: &WorkItem) -> Result<Admission>;
}

/// Result of one receive/admit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing arrived within the wait time.
    Empty,
    /// Receive ceiling exceeded; the message was deleted unseen by the gate.
    Dropped(String),
    /// Body could not be decoded; the message was deleted.
    Invalid(String),
    /// The gate said not ready or failed; left for redelivery.
    Deferred(WorkItem),
    /// The gate approved; the message was deleted.
    Admitted(WorkItem),
}

/// Receive loop with the giveup ceiling and admission contract.
#[derive(Clone)]
pub struct Dequeuer {
    queue: Arc<dyn Queue>,
    wait: Duration,
    max_receive_count: u32,
}

impl Dequeuer {
    /// Dequeuer over a transport with default wait and ceiling.
    pub fn new(queue: Arc<dyn Queue>) -> Self {
        Self {
            queue,
            wait: WAIT_TIME,
            max_receive_count: MAX_RECEIVE_COUNT,
        }
    }

    /// Override the long-poll duration.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Submit a work item under its group.
    pub async fn enqueue(&self, item: &WorkItem) -> Result<()> {
        let body = serde_json::to_string(item)?;
        self.queue.send(&item.id, &item.group(), &body).await
    }

    /// Block until the gate admits an item, returning it.
    ///
    /// Transport errors are returned; gate errors are logged and the message
    /// is left for redelivery.
    pub async fn dequeue(&self, gate: &dyn Admit) -> Result<WorkItem> {
        loop {
            if let PollOutcome::Admitted(item) = self.poll_once(gate).await? {
                return Ok(item);
            }
        }
    }

    /// One receive followed by the ceiling check and the gate.
    pub async fn poll_once(&self, gate: &dyn Admit) -> Result<PollOutcome> {
        let Some(delivery) = self.queue.receive(self.wait).await? else {
            return Ok(PollOutcome::Empty);
        };

        if delivery.receive_count > self.max_receive_count {
            warn!(
                message_id = %delivery.message_id,
                receive_count = delivery.receive_count,
                "Dropping message after too many deliveries"
            );
            self.queue.delete(&delivery.receipt).await?;
            return Ok(PollOutcome::Dropped(delivery.message_id));
        }

        let item = match decode(&delivery.body) {
            Ok(item) => item,
            Err(e) => {
                warn!(
                    message_id = %delivery.message_id,
                    error = %e,
                    "Deleting undecodable message"
                );
                self.queue.delete(&delivery.receipt).await?;
                return Ok(PollOutcome::Invalid(delivery.message_id));
            }
        };

        match gate.admit(&item).await {
            Ok(Admission::Ready) => {
                self.queue.delete(&delivery.receipt).await?;
                Ok(PollOutcome::Admitted(item))
            }
            Ok(Admission::NotReady) => {
                debug!(id = %item.id, kind = %item.kind, "Work not ready, leaving for redelivery");
                Ok(PollOutcome::Deferred(item))
            }
            Err(e) => {
                warn!(id = %item.id, kind = %item.kind, error = %e, "wait error");
                Ok(PollOutcome::Deferred(item))
            }
        }
    }
}

/// Decode a message body.
pub fn decode(body: &str) -> Result<WorkItem> {
    serde_json::from_str(body).map_err(|e| Error::InvalidMessage(e.to_string()))
}
