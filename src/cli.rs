// CLI module - command-line argument parsing and handlers
//
// With no subcommand the explorer runs (TUI or headless). Subcommands:
// - config --show: Display effective configuration
// - config --path: Show the config file location
// - config --reset: Regenerate config file with defaults
// - dump: Handshake, expand some paths, print the render tree as JSON

use crate::config::{Config, VERSION};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;

/// blescope - lazy explorer for a remote BLE scanning agent
#[derive(Parser, Debug)]
#[command(name = "blescope")]
#[command(version = VERSION)]
#[command(about = "Browse interfaces, devices, services and characteristics of a remote BLE agent", long_about = None)]
pub struct Cli {
    /// Agent WebSocket URL (overrides BLESCOPE_URL and the config file)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Use the built-in demo agent instead of connecting
    #[arg(long, global = true)]
    pub demo: bool,

    /// Run without the terminal UI
    #[arg(long)]
    pub no_tui: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Print the tree as JSON after expanding the given paths
    Dump {
        /// Slash-separated path to expand, e.g. hci0/84:2E:14:87:66:97 (repeatable)
        #[arg(long = "expand", value_name = "PATH")]
        expand: Vec<String>,
    },
}

impl Cli {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.agent_url = url.clone();
        }
        if self.demo {
            config.demo_mode = true;
        }
        if self.no_tui {
            config.enable_tui = false;
        }
    }
}

/// Handle `blescope config`
pub fn handle_config(show: bool, reset: bool, path: bool) -> Result<()> {
    if path {
        let path = Config::config_path().context("Could not determine config path")?;
        println!("{}", path.display());
    } else if show {
        handle_config_show()?;
    } else if reset {
        handle_config_reset()?;
    } else {
        println!("Usage: blescope config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
    }
    Ok(())
}

fn handle_config_show() -> Result<()> {
    let config = Config::from_env()?;

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
    Ok(())
}

fn handle_config_reset() -> Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;

    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let path = Config::reset_file()?;
    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from(["blescope", "--url", "ws://blepi:2021", "--demo", "--no-tui"]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.agent_url, "ws://blepi:2021");
        assert!(config.demo_mode);
        assert!(!config.enable_tui);
    }

    #[test]
    fn test_dump_collects_repeated_expands() {
        let cli = Cli::parse_from([
            "blescope",
            "dump",
            "--expand",
            "hci0",
            "--expand",
            "hci0/84:2E:14:87:66:97",
            "--demo",
        ]);
        assert!(cli.demo);
        match cli.command {
            Some(Commands::Dump { expand }) => {
                assert_eq!(expand, vec!["hci0", "hci0/84:2E:14:87:66:97"]);
            }
            other => panic!("expected dump, got {other:?}"),
        }
    }

    #[test]
    fn test_no_flags_leave_config_alone() {
        let cli = Cli::parse_from(["blescope"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.agent_url, crate::config::DEFAULT_AGENT_URL);
        assert!(config.enable_tui);
        assert!(cli.command.is_none());
    }
}
