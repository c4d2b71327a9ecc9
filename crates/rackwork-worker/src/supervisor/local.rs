// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local process supervisor used in development mode.
//!
//! Children run in their own process group so a signal reaches the whole
//! tree they spawn (git, the rack CLI, terraform). A background task waits on
//! each child so exited processes do not linger as zombies and fail the
//! signal-0 liveness probe as soon as they exit.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::traits::*;

/// Runs processes on this machine.
#[derive(Debug, Clone, Default)]
pub struct LocalSupervisor {
    bin_dir: Option<PathBuf>,
}

impl LocalSupervisor {
    /// Supervisor resolving programs through `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve programs in `dir` instead of `PATH`.
    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    fn program_path(&self, program: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(program),
            None => PathBuf::from(program),
        }
    }
}

fn parse_pid(pid: &str) -> Result<Pid> {
    pid.parse::<i32>()
        .ok()
        .filter(|p| *p > 0)
        .map(Pid::from_raw)
        .ok_or_else(|| SupervisorError::InvalidPid(pid.to_string()))
}

#[async_trait]
impl Supervisor for LocalSupervisor {
    fn supervisor_type(&self) -> &'static str {
        "local"
    }

    async fn start(&self, program: &str, args: &[String]) -> Result<ProcessHandle> {
        let path = self.program_path(program);

        let mut child = Command::new(&path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .process_group(0)
            .spawn()
            .map_err(|e| SupervisorError::StartFailed(format!("{}: {}", path.display(), e)))?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::StartFailed(format!("{} exited immediately", program)))?;

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(pid = pid, status = %status, "Local process exited"),
                Err(e) => warn!(pid = pid, error = %e, "Waiting on local process failed"),
            }
        });

        let command = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        info!(pid = pid, command = %command, "Started local process");

        Ok(ProcessHandle {
            pid: pid.to_string(),
            command,
            started_at: Utc::now(),
        })
    }

    async fn alive(&self, pid: &str) -> Result<bool> {
        let Ok(target) = parse_pid(pid) else {
            return Ok(false);
        };

        match signal::kill(target, None) {
            Ok(()) | Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(SupervisorError::SignalFailed {
                pid: pid.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn signal(&self, pid: &str) -> Result<()> {
        let target = parse_pid(pid)?;

        signal::killpg(target, Signal::SIGTERM).map_err(|e| SupervisorError::SignalFailed {
            pid: pid.to_string(),
            reason: e.to_string(),
        })?;

        info!(pid = %pid, "Sent SIGTERM to local process group");
        Ok(())
    }
}
