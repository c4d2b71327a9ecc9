// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error tracking.
//!
//! Unrecoverable infrastructure errors are captured with a reference id that
//! is echoed into user-facing logs so support can find the full report.

use std::fmt;

use tracing::error;

use crate::error::Result;
use crate::object_store::LogWriter;

/// Sink for unrecoverable errors.
pub trait ErrorTracker: Send + Sync {
    /// Record an error and return its reference id.
    fn capture(&self, error: &dyn fmt::Display) -> String;
}

/// Tracker that records errors in the process log.
#[derive(Debug, Default, Clone)]
pub struct LogTracker;

impl ErrorTracker for LogTracker {
    fn capture(&self, err: &dyn fmt::Display) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        error!(reference = %id, error = %err, "Captured system error");
        id
    }
}

/// Capture `err` and write the user-facing reference line to `out`.
pub async fn report(
    tracker: &dyn ErrorTracker,
    out: &LogWriter,
    err: &dyn fmt::Display,
) -> Result<String> {
    let id = tracker.capture(err);
    out.writeln(&format!(
        "ERROR: we have been notified about a system error: ({})",
        id
    ))
    .await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_report_writes_reference() {
        let store = Arc::new(MemoryObjectStore::new());
        let out = LogWriter::new(store.clone(), "organizations/o/racks/r/installs/i");

        let id = report(&LogTracker, &out, &"credentials expired")
            .await
            .unwrap();

        assert_eq!(
            store.text("organizations/o/racks/r/installs/i"),
            format!(
                "ERROR: we have been notified about a system error: ({})\n",
                id
            )
        );
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
