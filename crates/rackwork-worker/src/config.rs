// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker timing and program names.

use std::time::Duration;

use rackwork_core::Config;

use crate::reaper::ReaperConfig;

/// Worker settings derived from the shared [`Config`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the reaper sweeps running jobs.
    pub reap_interval: Duration,
    /// Jobs that started running more recently than this are never reaped.
    pub reap_grace: Duration,
    /// Long-poll duration of one queue receive.
    pub receive_wait: Duration,
    /// Program spawned for pipeline jobs.
    pub job_program: String,
    /// Program spawned for install/uninstall/update.
    pub rack_program: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            reap_interval: Duration::from_secs(60),
            reap_grace: Duration::from_secs(60),
            receive_wait: rackwork_core::queue::WAIT_TIME,
            job_program: "job".to_string(),
            rack_program: "rack".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Settings for the configured mode: development sweeps every 10 seconds.
    pub fn from_config(config: &Config) -> Self {
        let mut worker = Self::default();
        if config.development {
            worker.reap_interval = Duration::from_secs(10);
        }
        worker
    }

    /// Reaper settings.
    pub fn reaper(&self) -> ReaperConfig {
        ReaperConfig {
            poll_interval: self.reap_interval,
            grace: self.reap_grace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reap_interval_by_mode() {
        let production = WorkerConfig::from_config(&Config::default());
        assert_eq!(production.reap_interval, Duration::from_secs(60));
        assert_eq!(production.reap_grace, Duration::from_secs(60));

        let development = WorkerConfig::from_config(&Config {
            development: true,
            ..Config::default()
        });
        assert_eq!(development.reap_interval, Duration::from_secs(10));
        assert_eq!(development.reap_grace, Duration::from_secs(60));
    }
}
