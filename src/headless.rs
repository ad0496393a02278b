// Headless module - runs a session without the terminal UI
//
// Two modes share one event pump:
// - run: handshake, then keep the session open and log what happens
// - dump: handshake, expand the requested paths one at a time, return the tree

use crate::channel::{self, AgentChannel, ChannelEvent};
use crate::config::Config;
use crate::render::RenderTree;
use crate::sync::{Notice, NoticeLevel, Renderer, SyncOptions, TreeSync};
use crate::tree::{NodePath, ScanState};
use anyhow::{bail, Result};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Renderer that reports to the log instead of a screen
#[derive(Default)]
pub struct LogRenderer {
    rows: usize,
    fatal: Option<String>,
}

impl Renderer for LogRenderer {
    fn render(&mut self, tree: &RenderTree) {
        let rows = tree.rows().len();
        if rows != self.rows {
            tracing::debug!("{} visible node(s)", rows);
            self.rows = rows;
        }
    }

    fn notify(&mut self, notice: Notice) {
        match notice.level {
            NoticeLevel::Transient => tracing::warn!("{}", notice.message),
            NoticeLevel::Fatal => {
                tracing::error!("{}", notice.message);
                self.fatal = Some(notice.message);
            }
        }
    }
}

type Session = TreeSync<AgentChannel, LogRenderer>;

struct Pump {
    events: mpsc::Receiver<ChannelEvent>,
    tick: Interval,
}

impl Pump {
    /// Feed channel events and ticks into the session until `done` holds
    async fn until(&mut self, sync: &mut Session, done: impl Fn(&Session) -> bool) -> Result<()> {
        while !done(sync) {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(ChannelEvent::Message(text)) => {
                        if let Err(e) = sync.handle_text(&text) {
                            tracing::debug!("Reply not applied: {}", e);
                        }
                    }
                    Some(ChannelEvent::Closed(reason)) => {
                        sync.reset(&format!("Connection lost: {reason}"));
                        bail!("Agent connection closed: {reason}");
                    }
                    None => {
                        sync.reset("Connection lost");
                        bail!("Agent connection closed");
                    }
                },
                _ = self.tick.tick() => {
                    sync.tick(Instant::now());
                }
            }
        }
        Ok(())
    }
}

/// Connect and complete the handshake
async fn open_session(config: &Config) -> Result<(Session, Pump)> {
    let (channel, events) = channel::open(&config.agent_url, config.demo_mode).await?;
    let options = SyncOptions {
        scan_timeout: config.scan.timeout(),
    };
    let mut sync = TreeSync::new(channel, LogRenderer::default(), options);

    let mut tick = interval(config.scan.tick_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pump = Pump { events, tick };

    sync.start(Instant::now())?;
    pump.until(&mut sync, |s| !s.is_awaiting_handshake()).await?;

    if !sync.is_loaded() {
        let reason = sync
            .renderer()
            .fatal
            .clone()
            .unwrap_or_else(|| "no full state received".to_string());
        bail!("Handshake failed: {reason}");
    }
    Ok((sync, pump))
}

/// Expand `paths` in order, waiting for each scan, and return the final tree
pub async fn dump(config: &Config, paths: &[String]) -> Result<RenderTree> {
    let (mut sync, mut pump) = open_session(config).await?;

    for raw in paths {
        let path = NodePath::parse(raw);
        let state = sync
            .snapshot()
            .root()
            .and_then(|root| root.find(path.segments()).map(|node| node.scan_state));

        match state {
            None => bail!("No node at '{raw}' (expand its parent first)"),
            Some(ScanState::Expanded) => continue,
            Some(_) => {}
        }

        sync.toggle(&path, Instant::now())?;
        pump.until(&mut sync, |s| !s.pending().contains(&path)).await?;
    }

    Ok(sync.render_tree().clone())
}

/// Keep a session open until Ctrl+C or the agent goes away
pub async fn run(config: &Config) -> Result<()> {
    let (mut sync, mut pump) = open_session(config).await?;

    if let Some(root) = sync.render_tree().root.as_ref() {
        for iface in &root.children {
            tracing::info!(
                "  {} {}",
                iface.label,
                iface.detail.as_deref().unwrap_or_default()
            );
        }
    }
    tracing::info!("Session open. Press Ctrl+C to exit.");

    tokio::select! {
        result = pump.until(&mut sync, |_| false) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;

    fn demo_config() -> Config {
        Config {
            demo_mode: true,
            enable_tui: false,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_dump_without_expansion_lists_interfaces() {
        let tree = dump(&demo_config(), &[]).await.unwrap();
        let root = tree.root.unwrap();

        assert_eq!(root.label, "blescope-demo");
        let ifaces: Vec<_> = root.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(ifaces, vec!["hci0", "hci1"]);
    }

    #[tokio::test]
    async fn test_dump_expands_paths_in_order() {
        let paths = vec![
            "hci0".to_string(),
            "hci0/84:2E:14:87:66:97".to_string(),
        ];
        let tree = dump(&demo_config(), &paths).await.unwrap();

        let device = tree
            .rows()
            .into_iter()
            .find(|row| row.path == NodePath::from(["hci0", "84:2E:14:87:66:97"]))
            .cloned()
            .unwrap();
        assert_eq!(device.state, ScanState::Expanded);
        assert_eq!(device.children.len(), 3);
        assert!(device.children.iter().all(|c| c.kind == NodeKind::Service));
    }

    #[tokio::test]
    async fn test_dump_survives_remote_error() {
        let tree = dump(&demo_config(), &["hci1".to_string()]).await.unwrap();
        let hci1 = tree.find("n-hci1").unwrap();
        assert_eq!(hci1.state, ScanState::Collapsed);
    }

    #[tokio::test]
    async fn test_dump_rejects_unknown_path() {
        let err = dump(&demo_config(), &["hci0/AA:BB".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No node at 'hci0/AA:BB'"));
    }
}
