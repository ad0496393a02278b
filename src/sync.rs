// Sync module - the lazy-scan tree synchronizer
//
// One TreeSync instance lives for one agent session. It owns the tree store
// and the scan coordinator, talks to the agent through an injected Channel,
// and hands a fresh render tree to an injected Renderer after every change.
//
// All entry points (start, toggle, rescan, handle_message, tick, reset) run to
// completion on the caller's task. Each one leaves the tree with a node in
// Scanning exactly when the coordinator holds a pending entry for its path.

use crate::error::{SyncError, SyncResult};
use crate::protocol::{Operation, Request, Response};
use crate::render::{project, RenderTree};
use crate::scan::{ScanCoordinator, DEFAULT_SCAN_TIMEOUT};
use crate::tree::store::Transition;
use crate::tree::{NodePath, TreeSnapshot, TreeStore};
use std::time::{Duration, Instant};

/// Outbound half of the duplex channel
pub trait Channel {
    fn send(&mut self, request: &Request) -> SyncResult<()>;
}

/// Presentation callback
pub trait Renderer {
    /// Called with the new render tree after every mutation
    fn render(&mut self, tree: &RenderTree);

    /// User-facing notice (timeouts, agent errors, lost connection)
    fn notify(&mut self, _notice: Notice) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Recoverable; the user can retry
    Transient,
    /// The session cannot continue without a new handshake
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Fatal,
            message: message.into(),
        }
    }
}

/// Tunables for a session
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Pins the scan deadline; when None the agent's advertised timeout is used
    pub scan_timeout: Option<Duration>,
}

pub struct TreeSync<C, R> {
    store: TreeStore,
    scans: ScanCoordinator,
    channel: C,
    renderer: R,
    options: SyncOptions,
    handshake_deadline: Option<Instant>,
    last_render: RenderTree,
}

impl<C: Channel, R: Renderer> TreeSync<C, R> {
    pub fn new(channel: C, renderer: R, options: SyncOptions) -> Self {
        let timeout = options.scan_timeout.unwrap_or(DEFAULT_SCAN_TIMEOUT);
        Self {
            store: TreeStore::new(),
            scans: ScanCoordinator::new(timeout),
            channel,
            renderer,
            options,
            handshake_deadline: None,
            last_render: RenderTree::default(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Entry points
    // ─────────────────────────────────────────────────────────────────────

    /// Ask the agent for its full state
    pub fn start(&mut self, now: Instant) -> SyncResult<()> {
        tracing::info!("Requesting full state from agent");
        self.channel.send(&Request::handshake())?;
        self.handshake_deadline = Some(now + self.scans.timeout());
        Ok(())
    }

    /// User opened or closed a node
    ///
    /// Unknown paths are a logged no-op (the tree may have been reset under
    /// the view); the error is still returned for callers that care.
    pub fn toggle(&mut self, path: &NodePath, now: Instant) -> SyncResult<Transition> {
        let transition = match self.store.toggle(path) {
            Ok(transition) => transition,
            Err(e) => {
                tracing::warn!("Ignoring toggle: {}", e);
                return Err(e);
            }
        };

        match transition {
            Transition::Pending => {
                tracing::debug!("'{}' is already scanning", path);
                return Ok(transition);
            }
            Transition::Fetch => {
                if let Err(e) = self.dispatch(path, now) {
                    self.publish();
                    return Err(e);
                }
            }
            Transition::Opened | Transition::Closed => {}
        }

        self.publish();
        Ok(transition)
    }

    /// Explicit re-scan of a node, whatever its current state
    pub fn rescan(&mut self, path: &NodePath, now: Instant) -> SyncResult<()> {
        if let Err(e) = self.store.begin_scan(path) {
            tracing::warn!("Ignoring rescan: {}", e);
            return Err(e);
        }

        let result = self.dispatch(path, now);
        self.publish();
        result
    }

    /// Parse and apply one inbound text frame
    pub fn handle_text(&mut self, text: &str) -> SyncResult<()> {
        match Response::parse(text) {
            Ok(response) => self.handle_message(response),
            Err(e) => {
                tracing::warn!("Dropping undecodable message: {} ({})", e, text);
                Ok(())
            }
        }
    }

    /// Apply one reply from the agent
    pub fn handle_message(&mut self, response: Response) -> SyncResult<()> {
        if response.op == Operation::GetFullState {
            return self.apply_handshake(&response);
        }

        if let Some(message) = response.remote_error() {
            let message = message.to_string();
            let path = self.scans.resolve(&response);
            if let Some(path) = &path {
                self.revert(path);
            }
            tracing::warn!(
                "{} failed{}: {}",
                response.op.as_str(),
                path.as_ref().map(|p| format!(" for '{p}'")).unwrap_or_default(),
                message
            );
            let error = SyncError::RemoteError { path, message };
            self.renderer.notify(Notice::transient(error.to_string()));
            self.publish();
            return Err(error);
        }

        let Some(path) = self.scans.resolve(&response) else {
            tracing::warn!(
                "Dropping stale {} reply for {}",
                response.op.as_str(),
                response
                    .addressed_path()
                    .map(|p| format!("'{p}'"))
                    .unwrap_or_else(|| "an unknown path".to_string())
            );
            return Ok(());
        };

        let merged = response
            .partial_state()
            .and_then(|state| state.child_records(response.op))
            .and_then(|records| self.store.merge_scan_result(&path, records));

        let result = match merged {
            Ok(()) => {
                // Descendants that were mid-scan may have been replaced
                let store = &self.store;
                for orphan in self.scans.retain(|pending| store.is_scanning(pending)) {
                    tracing::debug!("Discarding pending scan of replaced node '{}'", orphan);
                }
                Ok(())
            }
            Err(SyncError::UnknownPath(path)) => {
                tracing::warn!("Discarding reply for '{}': node no longer exists", path);
                Err(SyncError::UnknownPath(path))
            }
            Err(e) => {
                tracing::warn!("Discarding reply for '{}': {}", path, e);
                self.revert(&path);
                self.renderer
                    .notify(Notice::transient(format!("Scan of '{path}' failed: {e}")));
                Err(e)
            }
        };

        self.publish();
        result
    }

    /// Expire overdue scans; returns the paths that timed out
    pub fn tick(&mut self, now: Instant) -> Vec<NodePath> {
        if self.handshake_deadline.is_some_and(|deadline| deadline <= now) {
            self.handshake_deadline = None;
            tracing::error!("Agent did not answer the handshake");
            self.renderer
                .notify(Notice::fatal("Agent did not answer the full-state request"));
        }

        let expired = self.scans.expire(now);
        for path in &expired {
            self.revert(path);
            let error = SyncError::RequestTimeout(path.clone());
            tracing::warn!("{}", error);
            self.renderer.notify(Notice::transient(error.to_string()));
        }
        if !expired.is_empty() {
            self.publish();
        }
        expired
    }

    /// Channel lost or reset: discard everything
    pub fn reset(&mut self, reason: &str) {
        tracing::warn!("Resetting tree: {}", reason);
        self.store.clear();
        self.scans.clear();
        self.handshake_deadline = None;
        self.renderer.notify(Notice::fatal(reason.to_string()));
        self.publish();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn apply_handshake(&mut self, response: &Response) -> SyncResult<()> {
        self.handshake_deadline = None;
        self.scans.clear();

        if let Some(message) = response.remote_error() {
            self.store.clear();
            let error = SyncError::RemoteError {
                path: None,
                message: message.to_string(),
            };
            tracing::error!("Handshake failed: {}", error);
            self.renderer.notify(Notice::fatal(error.to_string()));
            self.publish();
            return Err(error);
        }

        let applied = response.full_state().and_then(|state| {
            let root = state.root_record()?;
            self.store.apply_handshake(root)?;
            Ok(state)
        });

        match applied {
            Ok(state) => {
                if self.options.scan_timeout.is_none() {
                    if let Some(secs) = state.timeout.filter(|secs| *secs > 0) {
                        self.scans.set_timeout(Duration::from_secs(secs));
                    }
                }
                tracing::info!(
                    "Loaded {} interface(s) from {}",
                    state.interfaces.as_ref().map_or(0, |m| m.len()),
                    state.hostname.as_deref().unwrap_or("agent")
                );
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.store.clear();
                tracing::error!("Rejecting handshake: {}", e);
                self.renderer.notify(Notice::fatal(e.to_string()));
                self.publish();
                Err(e)
            }
        }
    }

    /// Register and send the scan for a node already marked Scanning
    fn dispatch(&mut self, path: &NodePath, now: Instant) -> SyncResult<()> {
        let request = match self.scans.request_children(path, now) {
            Ok(request) => request,
            // The original request is still in flight and owns the Scanning state
            Err(SyncError::AlreadyPending(path)) => {
                tracing::debug!("Scan of '{}' already pending", path);
                return Err(SyncError::AlreadyPending(path));
            }
            Err(e) => {
                self.revert(path);
                return Err(e);
            }
        };

        tracing::debug!("Sending {} {:?}", request.op.as_str(), request.args());
        if let Err(e) = self.channel.send(&request) {
            self.scans.cancel(path);
            self.revert(path);
            tracing::warn!("Could not send scan of '{}': {}", path, e);
            self.renderer
                .notify(Notice::transient(format!("Could not scan '{path}': {e}")));
            return Err(e);
        }
        Ok(())
    }

    fn revert(&mut self, path: &NodePath) {
        if let Err(e) = self.store.revert_scan(path) {
            tracing::debug!("Nothing to revert: {}", e);
        }
    }

    fn publish(&mut self) {
        let tree = project(&self.store.snapshot());
        self.renderer.render(&tree);
        self.last_render = tree;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> TreeSnapshot {
        self.store.snapshot()
    }

    /// Most recently published render tree
    pub fn render_tree(&self) -> &RenderTree {
        &self.last_render
    }

    pub fn is_loaded(&self) -> bool {
        self.store.is_loaded()
    }

    pub fn is_awaiting_handshake(&self) -> bool {
        self.handshake_deadline.is_some()
    }

    pub fn pending(&self) -> Vec<NodePath> {
        self.scans.pending_paths()
    }

    #[cfg(test)]
    pub fn scan_timeout(&self) -> Duration {
        self.scans.timeout()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}
