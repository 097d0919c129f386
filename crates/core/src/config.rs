//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Monitor configuration
///
/// All values are fixed at startup; there is no dynamic reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Delay between cycles, shared by every updater and the aggregator
    pub poll_delay_secs: u64,
    /// Per-request timeout for quote fetches
    pub fetch_timeout_secs: u64,
    /// Consecutive below-quorum cycles tolerated before shutdown
    pub staleness_limit: u32,
    /// Minimum populated sources for an aggregation row
    pub quorum: usize,
    /// Quote log rotation interval
    pub rotate_every_secs: u64,
    /// Maximum attempts when a source rate-limits us
    pub max_retry_attempts: u32,
    /// Base delay for rate-limit backoff (doubles each attempt)
    pub retry_base_delay_secs: u64,
    /// Optional wall-clock budget for the updaters; None runs forever
    pub run_for_secs: Option<u64>,
    /// Directory for the rotating quote log; None disables recording
    pub record_dir: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_delay_secs: 5,
            fetch_timeout_secs: 10,
            staleness_limit: 10,
            quorum: 3,
            rotate_every_secs: 600,
            max_retry_attempts: 5,
            retry_base_delay_secs: 1,
            run_for_secs: None,
            record_dir: None,
        }
    }
}

impl WatchConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }

    pub fn run_for(&self) -> Option<Duration> {
        self.run_for_secs.map(Duration::from_secs)
    }
}
