// TUI module - Terminal User Interface
//
// This module manages the terminal UI using ratatui. It handles:
// - Terminal initialization and cleanup
// - Event loop (keyboard input, channel events, timeout ticks)
// - Feeding user intents into the synchronizer
//
// Every mutation of the tree happens on this one task.

pub mod app;
pub mod toast;
pub mod ui;

use crate::channel::{self, AgentChannel, ChannelEvent};
use crate::config::Config;
use crate::logging::LogBuffer;
use crate::sync::{SyncOptions, TreeSync};
use crate::tree::ScanState;
use anyhow::{Context, Result};
use app::App;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

type Session = TreeSync<AgentChannel, App>;

/// Run the TUI against an already-open channel
pub async fn run_tui(
    config: Config,
    log_buffer: LogBuffer,
    channel: AgentChannel,
    events: mpsc::Receiver<ChannelEvent>,
) -> Result<()> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to setup terminal")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let agent = if config.demo_mode {
        "demo agent".to_string()
    } else {
        config.agent_url.clone()
    };
    let options = SyncOptions {
        scan_timeout: config.scan.timeout(),
    };
    let mut sync = TreeSync::new(channel, App::new(log_buffer, agent), options);

    let result = run_event_loop(&mut terminal, &mut sync, Some(events), &config).await;

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to restore terminal")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    result
}

/// Next channel event; pends forever once the connection is gone
async fn next_event(events: &mut Option<mpsc::Receiver<ChannelEvent>>) -> ChannelEvent {
    match events {
        Some(rx) => rx
            .recv()
            .await
            .unwrap_or_else(|| ChannelEvent::Closed("channel task ended".to_string())),
        None => std::future::pending().await,
    }
}

/// Main event loop
///
/// Waits on keyboard input, channel events and the timeout tick with
/// tokio::select!, redrawing after whichever fires.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    sync: &mut Session,
    mut events: Option<mpsc::Receiver<ChannelEvent>>,
    config: &Config,
) -> Result<()> {
    let mut tick_interval = tokio::time::interval(config.scan.tick_interval());

    sync.start(Instant::now())?;

    loop {
        sync.renderer_mut().pending = sync.pending().len();
        terminal
            .draw(|f| ui::draw(f, sync.renderer_mut()))
            .context("Failed to draw terminal")?;

        tokio::select! {
            key = async {
                if event::poll(Duration::from_millis(10)).unwrap_or(false) {
                    match event::read() {
                        Ok(Event::Key(key_event)) => Some(key_event),
                        _ => None,
                    }
                } else {
                    None
                }
            } => {
                if let Some(key_event) = key {
                    handle_key_event(sync, &mut events, config, key_event).await;
                }
            }

            _ = tick_interval.tick() => {
                sync.tick(Instant::now());
                sync.renderer_mut().tick_animation();
            }

            event = next_event(&mut events) => match event {
                ChannelEvent::Message(text) => {
                    if let Err(e) = sync.handle_text(&text) {
                        tracing::debug!("Reply not applied: {}", e);
                    }
                }
                ChannelEvent::Closed(reason) => {
                    events = None;
                    sync.renderer_mut().connected = false;
                    sync.reset(&format!("Connection lost: {reason}"));
                }
            },
        }

        if sync.renderer().should_quit {
            break;
        }
    }

    Ok(())
}

/// Handle keyboard input
async fn handle_key_event(
    sync: &mut Session,
    events: &mut Option<mpsc::Receiver<ChannelEvent>>,
    config: &Config,
    key_event: KeyEvent,
) {
    if key_event.kind != KeyEventKind::Press {
        return;
    }

    let selected = sync
        .renderer()
        .selected_row()
        .map(|row| (row.path.clone(), row.state));

    match key_event.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
            sync.renderer_mut().should_quit = true;
        }
        KeyCode::Up | KeyCode::Char('k') => sync.renderer_mut().select_prev(),
        KeyCode::Down | KeyCode::Char('j') => sync.renderer_mut().select_next(),
        KeyCode::Enter | KeyCode::Char(' ') => {
            if let Some((path, _)) = selected {
                let _ = sync.toggle(&path, Instant::now());
            }
        }
        // Right opens, Left closes (or jumps to the parent)
        KeyCode::Right | KeyCode::Char('l') => {
            if let Some((path, ScanState::Collapsed)) = selected {
                let _ = sync.toggle(&path, Instant::now());
            }
        }
        KeyCode::Left | KeyCode::Char('h') => match selected {
            Some((path, ScanState::Expanded)) if !path.is_root() => {
                let _ = sync.toggle(&path, Instant::now());
            }
            _ => sync.renderer_mut().select_parent(),
        },
        KeyCode::Char('r') | KeyCode::Char('R') => {
            if events.is_none() {
                reconnect(sync, events, config).await;
            } else if let Some((path, _)) = selected {
                if let Err(e) = sync.rescan(&path, Instant::now()) {
                    sync.renderer_mut().show_toast(e.to_string());
                }
            }
        }
        _ => {}
    }
}

/// Open a fresh connection and redo the handshake
async fn reconnect(
    sync: &mut Session,
    events: &mut Option<mpsc::Receiver<ChannelEvent>>,
    config: &Config,
) {
    sync.renderer_mut().show_toast("Reconnecting…");
    match channel::open(&config.agent_url, config.demo_mode).await {
        Ok((channel, rx)) => {
            *sync.channel_mut() = channel;
            *events = Some(rx);
            sync.renderer_mut().connected = true;
            if let Err(e) = sync.start(Instant::now()) {
                tracing::error!("Handshake request failed: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("Reconnect failed: {:#}", e);
            sync.renderer_mut().show_toast(format!("Reconnect failed: {e}"));
        }
    }
}
