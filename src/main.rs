// blescope - lazy tree explorer for a remote BLE scanning agent
//
// The agent answers JSON commands over a WebSocket. blescope fetches its
// full state once, then scans each level (interfaces, devices, services,
// characteristics, values) only when the user opens a node.
//
// Architecture:
// - Protocol: message contract spoken with the agent
// - Tree + scan: the node store and the pending-request table
// - Sync: one session's synchronizer, fed by user intents and agent replies
// - Channel (tokio-tungstenite): WebSocket transport, or the in-process demo agent
// - TUI (ratatui): draws the render tree; headless mode logs or dumps JSON instead

mod channel;
mod cli;
mod config;
mod demo;
mod error;
mod headless;
mod logging;
mod protocol;
mod render;
mod scan;
mod startup;
mod sync;
mod tree;
mod tui;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use logging::{LogBuffer, TuiLogLayer};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with conditional output
///
/// In TUI mode logs are captured to the buffer (prevents garbling the
/// display); headless they go to stdout, or stderr when stdout carries a
/// dump. File logging optionally writes JSON to rotating files on top.
///
/// Precedence: RUST_LOG env var > config file > default "info"
fn init_tracing(config: &Config, log_buffer: &LogBuffer, to_stderr: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.default_filter().into());

    let tui_layer = config
        .enable_tui
        .then(|| TuiLogLayer::new(log_buffer.clone()));

    let console_layer = (!config.enable_tui).then(|| {
        let writer = if to_stderr {
            BoxMakeWriter::new(std::io::stderr)
        } else {
            BoxMakeWriter::new(std::io::stdout)
        };
        tracing_subscriber::fmt::layer().with_writer(writer)
    });

    // The guard must stay alive for the whole run so buffered lines flush
    let mut guard = None;
    let file_layer = config.logging.dir.as_deref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: Could not create log directory {:?}: {}", dir, e);
            return None;
        }
        let appender = config.logging.rotation.appender(dir);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tui_layer)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config subcommands exit before any logging is set up
    if let Some(Commands::Config { show, reset, path }) = &cli.command {
        return cli::handle_config(*show, *reset, *path);
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let mut config = Config::from_env()?;
    cli.apply(&mut config);

    let dumping = matches!(cli.command, Some(Commands::Dump { .. }));
    if dumping {
        config.enable_tui = false;
    }

    let log_buffer = LogBuffer::new();
    let _file_guard = init_tracing(&config, &log_buffer, dumping);

    match cli.command {
        Some(Commands::Dump { expand }) => {
            let tree = headless::dump(&config, &expand).await?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
            Ok(())
        }
        _ if config.enable_tui => {
            startup::print_startup(&config);
            let (channel, events) = channel::open(&config.agent_url, config.demo_mode).await?;
            startup::log_startup(&config);
            tui::run_tui(config, log_buffer, channel, events).await
        }
        _ => {
            startup::print_startup(&config);
            headless::run(&config).await
        }
    }
}
