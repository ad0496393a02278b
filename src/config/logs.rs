//! Logging configuration: filter level and the optional JSON log file

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{self, RollingFileAppender};

/// Rolled files are named `blescope.<period>`
pub const LOG_FILE_PREFIX: &str = "blescope";

/// When the JSON log file rolls over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl LogRotation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Never => "never",
        }
    }

    pub fn appender(self, dir: &Path) -> RollingFileAppender {
        match self {
            Self::Hourly => rolling::hourly(dir, LOG_FILE_PREFIX),
            Self::Daily => rolling::daily(dir, LOG_FILE_PREFIX),
            Self::Never => rolling::never(dir, LOG_FILE_PREFIX),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level for blescope's own events when RUST_LOG is unset
    pub level: String,
    /// JSON log directory; None keeps logs off disk
    pub dir: Option<PathBuf>,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            rotation: LogRotation::Daily,
        }
    }
}

/// Logging settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileLogging {
    pub level: Option<String>,
    pub dir: Option<PathBuf>,
    pub rotation: Option<LogRotation>,
}

impl LoggingConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            level: file
                .level
                .filter(|level| !level.trim().is_empty())
                .unwrap_or(defaults.level),
            // `dir = ""` reads the same as leaving it out
            dir: file.dir.filter(|dir| !dir.as_os_str().is_empty()),
            rotation: file.rotation.unwrap_or(defaults.rotation),
        }
    }

    /// EnvFilter directive used when RUST_LOG is unset
    pub fn default_filter(&self) -> String {
        format!("blescope={}", self.level)
    }
}
