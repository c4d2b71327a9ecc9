// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock supervisor for testing.
//!
//! Records every start and signal and keeps processes "alive" until a test
//! calls [`MockSupervisor::exit`] or signals them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::traits::*;

/// A process started through the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockProcess {
    /// Assigned pid.
    pub pid: String,
    /// Program name.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Whether the process is still alive.
    pub running: bool,
}

/// Mock supervisor for testing.
#[derive(Default)]
pub struct MockSupervisor {
    processes: Arc<Mutex<HashMap<String, MockProcess>>>,
    order: Arc<Mutex<Vec<String>>>,
    signals: Arc<Mutex<Vec<String>>>,
    unreachable: Arc<Mutex<Vec<String>>>,
    next: AtomicU64,
    /// If true, every start fails.
    pub fail_start: bool,
}

impl MockSupervisor {
    /// Create a new mock supervisor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock supervisor whose starts always fail.
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// Mark a process as exited.
    pub async fn exit(&self, pid: &str) {
        if let Some(process) = self.processes.lock().await.get_mut(pid) {
            process.running = false;
        }
    }

    /// Make liveness probes for `pid` fail until the end of the test.
    pub async fn unreachable(&self, pid: &str) {
        self.unreachable.lock().await.push(pid.to_string());
    }

    /// Register a live process that was not started through this mock.
    pub async fn adopt(&self, pid: &str) {
        self.processes.lock().await.insert(
            pid.to_string(),
            MockProcess {
                pid: pid.to_string(),
                program: String::new(),
                args: Vec::new(),
                running: true,
            },
        );
    }

    /// Processes in start order.
    pub async fn started(&self) -> Vec<MockProcess> {
        let processes = self.processes.lock().await;
        self.order
            .lock()
            .await
            .iter()
            .filter_map(|pid| processes.get(pid).cloned())
            .collect()
    }

    /// Pids that were signalled, in order.
    pub async fn signals(&self) -> Vec<String> {
        self.signals.lock().await.clone()
    }
}

#[async_trait]
impl Supervisor for MockSupervisor {
    fn supervisor_type(&self) -> &'static str {
        "mock"
    }

    async fn start(&self, program: &str, args: &[String]) -> Result<ProcessHandle> {
        if self.fail_start {
            return Err(SupervisorError::StartFailed(format!("mock refused {}", program)));
        }

        let pid = format!("mock_{}", self.next.fetch_add(1, Ordering::SeqCst) + 1);

        self.processes.lock().await.insert(
            pid.clone(),
            MockProcess {
                pid: pid.clone(),
                program: program.to_string(),
                args: args.to_vec(),
                running: true,
            },
        );
        self.order.lock().await.push(pid.clone());

        Ok(ProcessHandle {
            command: format!("{} {}", program, args.join(" ")),
            pid,
            started_at: Utc::now(),
        })
    }

    async fn alive(&self, pid: &str) -> Result<bool> {
        if self.unreachable.lock().await.iter().any(|p| p == pid) {
            return Err(SupervisorError::Api(format!("mock cannot reach {}", pid)));
        }
        Ok(self
            .processes
            .lock()
            .await
            .get(pid)
            .is_some_and(|p| p.running))
    }

    async fn signal(&self, pid: &str) -> Result<()> {
        self.signals.lock().await.push(pid.to_string());
        self.exit(pid).await;
        Ok(())
    }
}
