//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// Render the config as a commented TOML file
    pub fn to_toml(&self) -> String {
        // An unset timeout is written commented out so the agent's value applies
        let timeout_line = match self.scan.timeout_secs {
            Some(secs) => format!("timeout_secs = {secs}"),
            None => "# timeout_secs = 10".to_string(),
        };
        let dir_line = match &self.logging.dir {
            Some(dir) => format!("dir = \"{}\"", dir.display().to_string().replace('\\', "/")),
            None => "# dir = \"./logs\"".to_string(),
        };

        format!(
            r#"# blescope configuration

# WebSocket URL of the BLE scanning agent (BLESCOPE_URL overrides)
agent_url = "{agent_url}"

# Scan behaviour
[scan]
# Seconds to wait for each scan; when unset the agent's advertised timeout is used
{timeout_line}
# How often pending scans are checked for expiry (milliseconds)
tick_ms = {tick_ms}

# Logging (RUST_LOG overrides the level)
[logging]
level = "{log_level}"
# Directory for JSON log files; unset keeps logs off disk
{dir_line}
# When the log file rolls over: "hourly", "daily" or "never"
rotation = "{rotation}"
"#,
            agent_url = self.agent_url,
            tick_ms = self.scan.tick_ms,
            log_level = self.logging.level,
            rotation = self.logging.rotation.as_str(),
        )
    }
}
