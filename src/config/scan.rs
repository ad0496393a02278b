//! Scan configuration: request deadlines and timeout polling

use serde::Deserialize;
use std::time::Duration;

/// Scan settings
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Deadline for each scan in seconds; None adopts the agent's advertised timeout
    pub timeout_secs: Option<u64>,
    /// How often pending scans are checked for expiry (milliseconds)
    pub tick_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            tick_ms: 250,
        }
    }
}

/// Scan settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileScan {
    pub timeout_secs: Option<u64>,
    pub tick_ms: Option<u64>,
}

impl ScanConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileScan>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            // Zero means "no override"
            timeout_secs: file.timeout_secs.filter(|secs| *secs > 0),
            tick_ms: file.tick_ms.filter(|ms| *ms > 0).unwrap_or(defaults.tick_ms),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}
