//! Configuration for the explorer
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/blescope/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod logs;
mod scan;
mod serialization;

#[cfg(test)]
mod tests;

pub use logs::{FileLogging, LogRotation, LoggingConfig};
pub use scan::{FileScan, ScanConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Agent endpoint used when nothing else is configured
pub const DEFAULT_AGENT_URL: &str = "ws://localhost:2021";

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket URL of the scanning agent
    pub agent_url: String,

    /// Whether to enable the TUI (can be disabled for headless mode)
    pub enable_tui: bool,

    /// Demo mode: talk to the in-process demo agent instead of the network
    pub demo_mode: bool,

    /// Scan deadlines and timeout polling
    pub scan: ScanConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_url: DEFAULT_AGENT_URL.to_string(),
            enable_tui: true,
            demo_mode: false,
            scan: ScanConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure (subset of Config that makes sense to persist)
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub agent_url: Option<String>,

    /// Optional [scan] section
    pub scan: Option<FileScan>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Truthy runtime flag values: "1" or "true" (any case)
fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl Config {
    /// Get the config file path: ~/.config/blescope/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("blescope").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    /// Called during startup to help users discover configuration options
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }

        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Overwrite the config file with the default template
    pub fn reset_file() -> Result<PathBuf> {
        let path = Self::config_path().context("Cannot determine home directory")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, Self::default().to_toml())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Read and parse a config file; a missing file yields defaults
    ///
    /// A file that exists but cannot be read or parsed is an error. A broken
    /// config should fail fast rather than silently fall back to defaults.
    pub(crate) fn load_file(path: &Path) -> Result<FileConfig> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).with_context(|| {
                format!(
                    "Failed to parse {}\n  Check for missing quotes, invalid booleans or typos in \
                     section names.\n  To reset, run `blescope config --reset`.",
                    path.display()
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(e).with_context(|| format!("Cannot read {}", path.display())),
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn from_env() -> Result<Self> {
        let file = match Self::config_path() {
            Some(path) => Self::load_file(&path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with environment lookups
    pub(crate) fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Agent URL: env > file > default
        let agent_url = env("BLESCOPE_URL")
            .or(file.agent_url)
            .unwrap_or_else(|| DEFAULT_AGENT_URL.to_string());

        // TUI toggle: env only (runtime flag)
        let enable_tui = env("BLESCOPE_NO_TUI")
            .map(|v| !is_truthy(&v))
            .unwrap_or(true);

        // Demo mode: env only (runtime flag)
        let demo_mode = env("BLESCOPE_DEMO")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        // Scan timeout: env > file > agent-advertised (left unset here)
        let mut scan = ScanConfig::from_file(file.scan);
        if let Some(raw) = env("BLESCOPE_SCAN_TIMEOUT") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("BLESCOPE_SCAN_TIMEOUT must be whole seconds, got '{raw}'"))?;
            scan.timeout_secs = Some(secs);
        }

        let logging = LoggingConfig::from_file(file.logging);

        Ok(Self {
            agent_url,
            enable_tui,
            demo_mode,
            scan,
            logging,
        })
    }
}
