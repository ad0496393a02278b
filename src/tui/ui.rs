// UI rendering - draws the title bar, tree, log panel and status bar

use super::app::{App, Row};
use crate::logging::{LogEntry, LogLevel};
use crate::tree::{NodeKind, ScanState};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

/// Spinner frames for rows that are being scanned
const SPINNER: [&str; 4] = ["⠋", "⠙", "⠸", "⠴"];

/// Height of the log panel including borders
const LOG_PANEL_HEIGHT: u16 = 8;

/// Main draw function
pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(LOG_PANEL_HEIGHT),
            Constraint::Length(1),
        ])
        .split(f.area());

    render_title(f, chunks[0], app);
    render_tree(f, chunks[1], app);
    render_logs(f, chunks[2], app);
    render_status(f, chunks[3], app);

    if let Some(toast) = &app.toast {
        toast.render(f, f.area());
    }
}

fn render_title(f: &mut Frame, area: Rect, app: &App) {
    let (state, color) = if app.connected {
        ("connected", Color::Green)
    } else {
        ("disconnected", Color::Red)
    };

    let line = Line::from(vec![
        Span::styled(
            " blescope ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("│ "),
        Span::styled(
            app.hostname().unwrap_or("waiting for agent…").to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" │ "),
        Span::styled(app.agent.clone(), Style::default().fg(Color::DarkGray)),
        Span::raw(" │ "),
        Span::styled(state, Style::default().fg(color)),
    ]);

    let title = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(title, area);
}

fn marker(row: &Row, frame: usize) -> &'static str {
    match row.state {
        ScanState::Scanning => SPINNER[frame % SPINNER.len()],
        ScanState::Expanded => "▾",
        ScanState::Collapsed if row.has_children => "▸",
        ScanState::Collapsed => "·",
    }
}

fn kind_style(kind: NodeKind) -> Style {
    match kind {
        NodeKind::Root => Style::default().add_modifier(Modifier::BOLD),
        NodeKind::Interface => Style::default().fg(Color::Cyan),
        NodeKind::Device => Style::default().fg(Color::Green),
        NodeKind::Service => Style::default().fg(Color::Magenta),
        NodeKind::Characteristic => Style::default().fg(Color::Yellow),
        NodeKind::Value => Style::default().fg(Color::White),
    }
}

fn format_row(row: &Row, frame: usize) -> ListItem<'static> {
    let mut spans = vec![
        Span::raw("  ".repeat(row.depth)),
        Span::raw(format!("{} ", marker(row, frame))),
        Span::styled(row.label.clone(), kind_style(row.kind)),
    ];
    if let Some(detail) = &row.detail {
        spans.push(Span::styled(
            format!("  {detail}"),
            Style::default().fg(Color::DarkGray),
        ));
    }
    if row.state == ScanState::Expanded && !row.has_children {
        spans.push(Span::styled(
            "  (none found)",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        ));
    }
    ListItem::new(Line::from(spans))
}

fn render_tree(f: &mut Frame, area: Rect, app: &mut App) {
    let items: Vec<ListItem> = app
        .rows
        .iter()
        .map(|row| format_row(row, app.frame))
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Interfaces · Devices · Services · Characteristics ");

    if items.is_empty() {
        let hint = if app.connected {
            "Waiting for the agent's full state…"
        } else {
            "Disconnected. Press r to reconnect."
        };
        let empty = Paragraph::new(hint)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn level_style(level: LogLevel) -> Style {
    match level {
        LogLevel::Error => Style::default().fg(Color::Red),
        LogLevel::Warn => Style::default().fg(Color::Yellow),
        LogLevel::Info => Style::default(),
        LogLevel::Debug | LogLevel::Trace => Style::default().fg(Color::DarkGray),
    }
}

/// Last segment of the event's module path (`blescope::sync` -> `sync`)
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

fn format_log_entry(entry: &LogEntry) -> ListItem<'static> {
    ListItem::new(format!(
        "[{}] {:5} {}: {}",
        entry.timestamp.format("%H:%M:%S"),
        entry.level.as_str(),
        short_target(&entry.target),
        entry.message
    ))
    .style(level_style(entry.level))
}

fn render_logs(f: &mut Frame, area: Rect, app: &App) {
    let visible = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .log_buffer
        .recent(visible)
        .iter()
        .map(format_log_entry)
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Logs "));
    f.render_widget(list, area);
}

fn render_status(f: &mut Frame, area: Rect, app: &App) {
    let scans = match app.pending {
        0 => "idle".to_string(),
        1 => "1 scan pending".to_string(),
        n => format!("{n} scans pending"),
    };
    let text = format!(
        " {} │ {} │ ↑↓ move  ⏎/space toggle  ←→ close/open  r rescan  q quit",
        app.uptime(),
        scans
    );
    f.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::Gray)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogBuffer;
    use crate::render::project;
    use crate::sync::Renderer;
    use crate::tree::{ChildRecord, NodePath, TreeStore};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|line| line.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_draw_shows_tree_and_markers() {
        let mut store = TreeStore::new();
        store
            .apply_handshake(ChildRecord::new("", "blepi").with_children(vec![
                ChildRecord::new("hci0", "hci0").with_attribute("Address", "B8:27:EB:00:00:01"),
                ChildRecord::new("hci1", "hci1").with_children(vec![]),
            ]))
            .unwrap();
        store.toggle(&NodePath::from(["hci1"])).unwrap();

        let mut app = App::new(LogBuffer::new(), "ws://localhost:2021");
        app.render(&project(&store.snapshot()));

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| draw(f, &mut app)).unwrap();
        let screen = buffer_text(&terminal);

        assert!(screen.contains("▾ blepi"));
        assert!(screen.contains("▸ hci0  B8:27:EB:00:00:01"));
        assert!(screen.contains("▾ hci1  (none found)"));
        assert!(screen.contains("connected"));
    }

    #[test]
    fn test_log_panel_shows_module_and_message() {
        let log_buffer = LogBuffer::new();
        log_buffer.add(LogEntry {
            timestamp: chrono::Utc::now(),
            level: LogLevel::Warn,
            target: "blescope::scan".to_string(),
            message: "Scan of 'hci0' timed out".to_string(),
        });
        let mut app = App::new(log_buffer, "demo");

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| draw(f, &mut app)).unwrap();
        assert!(buffer_text(&terminal).contains("WARN  scan: Scan of 'hci0' timed out"));
    }

    #[test]
    fn test_draw_empty_disconnected() {
        let mut app = App::new(LogBuffer::new(), "demo");
        app.connected = false;

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| draw(f, &mut app)).unwrap();
        assert!(buffer_text(&terminal).contains("Press r to reconnect"));
    }
}
