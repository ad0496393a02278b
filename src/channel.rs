// Channel module - duplex transport to the scanning agent
//
// The agent speaks JSON text frames over a WebSocket. One background task
// owns the socket: it forwards queued requests out and delivers inbound
// frames as ChannelEvents. The synchronizer only ever sees the AgentChannel
// handle (the outbound queue) and the event receiver.

use crate::error::{SyncError, SyncResult};
use crate::protocol::Request;
use crate::sync::Channel;
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;

/// Requests queued for the writer before sends start failing
pub const OUTBOUND_BUFFER: usize = 64;

/// Inbound frames buffered ahead of the UI loop
pub const INBOUND_BUFFER: usize = 256;

/// Something that happened on the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One text frame from the agent
    Message(String),
    /// The connection is gone; carries a human-readable reason
    Closed(String),
}

/// Outbound handle: serialises requests onto the writer queue
#[derive(Debug, Clone)]
pub struct AgentChannel {
    tx: mpsc::Sender<String>,
}

impl AgentChannel {
    pub(crate) fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl Channel for AgentChannel {
    fn send(&mut self, request: &Request) -> SyncResult<()> {
        let json = request
            .to_json()
            .map_err(|e| SyncError::Channel(e.to_string()))?;

        // try_send: entry points never block the UI loop
        self.tx.try_send(json).map_err(|e| match e {
            TrySendError::Full(_) => SyncError::Channel("outbound queue is full".to_string()),
            TrySendError::Closed(_) => SyncError::Channel("connection is closed".to_string()),
        })
    }
}

/// Connect to the agent and spawn the socket task
pub async fn connect(url: &str) -> Result<(AgentChannel, mpsc::Receiver<ChannelEvent>)> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to agent at {url}"))?;
    tracing::info!("Connected to agent at {}", url);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let (event_tx, event_rx) = mpsc::channel(INBOUND_BUFFER);

    tokio::spawn(async move {
        let reason = loop {
            tokio::select! {
                Some(json) = out_rx.recv() => {
                    tracing::trace!("-> {}", json);
                    if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                        break format!("send failed: {e}");
                    }
                }
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let text = text.to_string();
                        tracing::trace!("<- {}", text);
                        if event_tx.send(ChannelEvent::Message(text)).await.is_err() {
                            break "receiver dropped".to_string();
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break "agent closed the connection".to_string();
                    }
                    // Ping/pong are answered by tungstenite; binary frames are not part of the contract
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break format!("websocket error: {e}"),
                },
            }
        };

        tracing::warn!("Agent connection ended: {}", reason);
        let _ = ws_tx.close().await;
        let _ = event_tx.send(ChannelEvent::Closed(reason)).await;
    });

    Ok((AgentChannel::new(out_tx), event_rx))
}

/// Open a session with the configured agent, or the demo agent
pub async fn open(url: &str, demo: bool) -> Result<(AgentChannel, mpsc::Receiver<ChannelEvent>)> {
    if demo {
        Ok(crate::demo::spawn())
    } else {
        connect(url).await
    }
}
