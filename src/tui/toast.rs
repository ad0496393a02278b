//! Toast notification component
//!
//! A non-blocking overlay that auto-dismisses after a configurable duration.
//! Renders in the bottom-right corner on top of all other content.

use crate::sync::{Notice, NoticeLevel};
use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use std::time::{Duration, Instant};

/// A toast notification that auto-dismisses
pub struct Toast {
    pub message: String,
    pub level: NoticeLevel,
    created_at: Instant,
    duration: Duration,
}

impl Toast {
    /// Create a transient toast with the default 3-second duration
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NoticeLevel::Transient,
            created_at: Instant::now(),
            duration: Duration::from_secs(3),
        }
    }

    /// Fatal notices stay up longer
    pub fn from_notice(notice: Notice) -> Self {
        let duration = match notice.level {
            NoticeLevel::Transient => Duration::from_secs(4),
            NoticeLevel::Fatal => Duration::from_secs(10),
        };
        Self {
            message: notice.message,
            level: notice.level,
            created_at: Instant::now(),
            duration,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.duration
    }

    /// Render the toast in the bottom-right corner
    pub fn render(&self, f: &mut Frame, area: Rect) {
        let max_width = area.width.saturating_sub(4).max(10);
        let width = (self.message.chars().count() as u16 + 4).min(max_width);
        let inner = width.saturating_sub(4).max(1) as usize;
        let lines = self.message.chars().count().div_ceil(inner).max(1) as u16;
        let height = (lines + 2).min(area.height.saturating_sub(2).max(3));

        let x = area.right().saturating_sub(width + 2);
        let y = area.bottom().saturating_sub(height + 2);
        let toast_area = Rect::new(x, y, width, height);

        let accent = match self.level {
            NoticeLevel::Transient => Color::Yellow,
            NoticeLevel::Fatal => Color::Red,
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(accent));

        let text = Paragraph::new(self.message.as_str())
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(block);

        // Clear first so the toast sits on top
        f.render_widget(Clear, toast_area);
        f.render_widget(text, toast_area);
    }
}
