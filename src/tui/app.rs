// TUI application state
//
// App is the Renderer the synchronizer draws into. It keeps the latest render
// tree flattened into visible rows, the selection (tracked by node id so it
// survives re-renders), the current toast and the shared log buffer.

use super::toast::Toast;
use crate::logging::LogBuffer;
use crate::render::{RenderNode, RenderTree};
use crate::sync::{Notice, Renderer};
use crate::tree::{NodeKind, NodePath, ScanState};
use ratatui::widgets::ListState;
use std::time::Instant;

/// One visible line of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: String,
    pub path: NodePath,
    pub kind: NodeKind,
    pub label: String,
    pub detail: Option<String>,
    pub state: ScanState,
    pub has_children: bool,
    pub depth: usize,
}

impl From<&RenderNode> for Row {
    fn from(node: &RenderNode) -> Self {
        Self {
            id: node.id.clone(),
            path: node.path.clone(),
            kind: node.kind,
            label: node.label.clone(),
            detail: node.detail.clone(),
            state: node.state,
            has_children: node.has_children,
            depth: node.depth,
        }
    }
}

/// Main application state for the TUI
pub struct App {
    /// Visible rows in display order
    pub rows: Vec<Row>,

    /// Id of the selected row
    selected: Option<String>,

    /// Scroll position of the tree list
    pub list_state: ListState,

    /// Whether the app should quit
    pub should_quit: bool,

    /// Log buffer for the log panel
    pub log_buffer: LogBuffer,

    /// Active notification
    pub toast: Option<Toast>,

    /// Where the session points (URL or "demo")
    pub agent: String,

    /// False after the channel closed, until a reconnect succeeds
    pub connected: bool,

    /// Scans in flight, refreshed before each draw
    pub pending: usize,

    /// Spinner frame for scanning rows
    pub frame: usize,

    pub start_time: Instant,
}

impl App {
    pub fn new(log_buffer: LogBuffer, agent: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            selected: None,
            list_state: ListState::default(),
            should_quit: false,
            log_buffer,
            toast: None,
            agent: agent.into(),
            connected: true,
            pending: 0,
            frame: 0,
            start_time: Instant::now(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────

    pub fn selected_index(&self) -> Option<usize> {
        let id = self.selected.as_ref()?;
        self.rows.iter().position(|row| &row.id == id)
    }

    pub fn selected_row(&self) -> Option<&Row> {
        self.selected_index().map(|idx| &self.rows[idx])
    }

    fn select_index(&mut self, idx: usize) {
        self.selected = self.rows.get(idx).map(|row| row.id.clone());
        self.list_state.select(self.selected.as_ref().map(|_| idx));
    }

    pub fn select_next(&mut self) {
        let next = match self.selected_index() {
            Some(idx) => (idx + 1).min(self.rows.len().saturating_sub(1)),
            None => 0,
        };
        self.select_index(next);
    }

    pub fn select_prev(&mut self) {
        let prev = self
            .selected_index()
            .map(|idx| idx.saturating_sub(1))
            .unwrap_or(0);
        self.select_index(prev);
    }

    /// Move the selection to the parent row, if it is visible
    pub fn select_parent(&mut self) {
        let Some(parent) = self.selected_row().and_then(|row| row.path.parent()) else {
            return;
        };
        if let Some(idx) = self.rows.iter().position(|row| row.path == parent) {
            self.select_index(idx);
        }
    }

    /// Re-point the selection after the rows changed
    ///
    /// Keeps the same node when it is still visible, otherwise falls back to
    /// its closest visible ancestor, otherwise the first row.
    fn reconcile_selection(&mut self, previous: Option<NodePath>) {
        if let Some(idx) = self.selected_index() {
            self.list_state.select(Some(idx));
            return;
        }

        let mut candidate = previous;
        while let Some(path) = candidate {
            if let Some(idx) = self.rows.iter().position(|row| row.path == path) {
                self.select_index(idx);
                return;
            }
            candidate = path.parent();
        }
        self.select_index(0);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Toasts and ticks
    // ─────────────────────────────────────────────────────────────────────

    pub fn show_toast(&mut self, message: impl Into<String>) {
        self.toast = Some(Toast::new(message));
    }

    /// Advance the spinner and drop an expired toast
    pub fn tick_animation(&mut self) {
        self.frame = self.frame.wrapping_add(1);
        if self.toast.as_ref().is_some_and(Toast::is_expired) {
            self.toast = None;
        }
    }

    /// Root label (the agent's hostname once loaded)
    pub fn hostname(&self) -> Option<&str> {
        self.rows
            .first()
            .filter(|row| row.kind == NodeKind::Root)
            .map(|row| row.label.as_str())
    }

    pub fn uptime(&self) -> String {
        let secs = self.start_time.elapsed().as_secs();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

impl Renderer for App {
    fn render(&mut self, tree: &RenderTree) {
        let previous = self.selected_row().map(|row| row.path.clone());
        self.rows = tree.rows().into_iter().map(Row::from).collect();
        self.reconcile_selection(previous);
    }

    fn notify(&mut self, notice: Notice) {
        self.toast = Some(Toast::from_notice(notice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::project;
    use crate::tree::{ChildRecord, TreeStore};

    fn store() -> TreeStore {
        let mut store = TreeStore::new();
        store
            .apply_handshake(ChildRecord::new("", "blepi").with_children(vec![
                ChildRecord::new("hci0", "hci0").with_children(vec![
                    ChildRecord::new("AA", "Heart Monitor"),
                    ChildRecord::new("BB", "Flower care"),
                ]),
                ChildRecord::new("hci1", "hci1"),
            ]))
            .unwrap();
        store
    }

    fn app() -> App {
        App::new(LogBuffer::new(), "demo")
    }

    #[test]
    fn test_first_render_selects_root() {
        let mut app = app();
        app.render(&project(&store().snapshot()));

        assert_eq!(app.rows.len(), 3);
        assert_eq!(app.selected_row().unwrap().kind, NodeKind::Root);
        assert_eq!(app.hostname(), Some("blepi"));
    }

    #[test]
    fn test_selection_follows_node_across_renders() {
        let mut store = store();
        let mut app = app();
        app.render(&project(&store.snapshot()));

        // Select hci1, then expand hci0 above it: hci1 moves down but stays selected
        app.select_next();
        app.select_next();
        assert_eq!(app.selected_row().unwrap().label, "hci1");

        store.toggle(&NodePath::from(["hci0"])).unwrap();
        app.render(&project(&store.snapshot()));

        assert_eq!(app.rows.len(), 5);
        assert_eq!(app.selected_row().unwrap().label, "hci1");
        assert_eq!(app.selected_index(), Some(4));
    }

    #[test]
    fn test_hidden_selection_falls_back_to_ancestor() {
        let mut store = store();
        store.toggle(&NodePath::from(["hci0"])).unwrap();
        let mut app = app();
        app.render(&project(&store.snapshot()));

        // Select device BB, then collapse its interface
        for _ in 0..3 {
            app.select_next();
        }
        assert_eq!(app.selected_row().unwrap().label, "Flower care");

        store.toggle(&NodePath::from(["hci0"])).unwrap();
        app.render(&project(&store.snapshot()));
        assert_eq!(app.selected_row().unwrap().label, "hci0");
    }

    #[test]
    fn test_select_parent_and_bounds() {
        let mut store = store();
        store.toggle(&NodePath::from(["hci0"])).unwrap();
        let mut app = app();
        app.render(&project(&store.snapshot()));

        app.select_prev();
        assert_eq!(app.selected_index(), Some(0));

        app.select_next();
        app.select_next();
        app.select_parent();
        assert_eq!(app.selected_row().unwrap().label, "hci0");

        for _ in 0..10 {
            app.select_next();
        }
        assert_eq!(app.selected_index(), Some(4));
    }

    #[test]
    fn test_notice_becomes_toast() {
        let mut app = app();
        app.notify(Notice::transient("Scan of 'hci1' timed out"));
        assert_eq!(
            app.toast.as_ref().map(|t| t.message.as_str()),
            Some("Scan of 'hci1' timed out")
        );
    }
}
