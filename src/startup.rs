// Startup module - displays banner and session settings
//
// Printed before the TUI takes over the screen (or in headless mode), and
// echoed into the TUI log panel so the boot sequence is visible there too.

use crate::config::{Config, VERSION};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// One line of the settings summary
#[derive(Debug, PartialEq)]
pub struct SettingStatus {
    pub name: &'static str,
    pub enabled: bool,
    pub description: String,
}

/// Print the startup banner and settings
pub fn print_startup(config: &Config) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}blescope{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Lazy explorer for a remote BLE scanning agent{RESET}");
    println!();

    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}✓{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!();

    for setting in settings(config) {
        print_setting(&setting);
    }
    println!();

    if config.demo_mode {
        println!("  {YELLOW}▸{RESET} {YELLOW}Demo mode active{RESET} {DIM}(in-process agent){RESET}");
    } else {
        println!(
            "  {MAGENTA}▸{RESET} Agent at {BOLD}{}{RESET}",
            config.agent_url
        );
    }
    println!();
}

fn settings(config: &Config) -> Vec<SettingStatus> {
    let timeout = match config.scan.timeout_secs {
        Some(secs) => format!("Scan timeout {secs}s"),
        None => "Scan timeout from agent".to_string(),
    };

    vec![
        SettingStatus {
            name: "tui",
            enabled: config.enable_tui,
            description: "Terminal interface".to_string(),
        },
        SettingStatus {
            name: "timeout",
            enabled: config.scan.timeout_secs.is_some(),
            description: timeout,
        },
        SettingStatus {
            name: "file-log",
            enabled: config.logging.dir.is_some(),
            description: match &config.logging.dir {
                Some(dir) => format!("JSON logs in {}", dir.display()),
                None => "JSON log file".to_string(),
            },
        },
    ]
}

fn print_setting(setting: &SettingStatus) {
    use colors::*;

    let (icon, style) = if setting.enabled {
        (format!("{GREEN}✓{RESET}"), "")
    } else {
        (format!("{DIM}○{RESET}"), DIM)
    };

    println!(
        "    {icon} {style}{:<12}{RESET} {DIM}{}{RESET}",
        setting.name, setting.description
    );
}

/// Print startup messages to the TUI log panel
pub fn log_startup(config: &Config) {
    tracing::info!("═══════════════════════════════════");
    tracing::info!("  BLESCOPE v{}", VERSION);
    tracing::info!("═══════════════════════════════════");

    for setting in settings(config) {
        let icon = if setting.enabled { "✓" } else { "○" };
        tracing::info!("  {} {} - {}", icon, setting.name, setting.description);
    }

    if config.demo_mode {
        tracing::info!("▸ Demo mode active (in-process agent)");
    } else {
        tracing::info!("▸ Connecting to {}", config.agent_url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_reflect_config() {
        let mut config = Config::default();
        config.scan.timeout_secs = Some(15);
        config.enable_tui = false;

        let settings = settings(&config);
        assert!(!settings[0].enabled);
        assert!(settings[1].enabled);
        assert_eq!(settings[1].description, "Scan timeout 15s");
        assert!(!settings[2].enabled);
    }
}
