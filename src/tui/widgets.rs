//! Custom widgets for the watch TUI

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::terminal::{ConnectionState, TerminalKind, TerminalState};
use crate::tracker::CodeAction;
use crate::webhook::WorkspaceReadiness;

use super::theme::Theme;

/// Truncate a string to at most `max_width` display columns.
fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(1);
        if used + w + 1 > max_width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

/// Top bar: stream connection state plus webhook readiness summary.
pub struct HeaderBar<'a> {
    pub connection: ConnectionState,
    pub readiness: Option<&'a WorkspaceReadiness>,
}

impl Widget for HeaderBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let connection_style = match self.connection {
            ConnectionState::Connected => Theme::connected(),
            ConnectionState::Connecting => Theme::connecting(),
            ConnectionState::Disconnected | ConnectionState::Error => Theme::disconnected(),
        };

        let mut spans = vec![
            Span::styled(" deskhook watch ", Theme::title()),
            Span::styled("· stream ", Theme::muted()),
            Span::styled(self.connection.to_string(), connection_style),
            Span::styled(" · webhook ", Theme::muted()),
        ];

        match self.readiness {
            Some(r) if r.connected => {
                spans.push(Span::styled("up", Theme::connected()));
                if !r.workspace_ready {
                    spans.push(Span::styled(" (no workspace)", Theme::warning()));
                } else if r.chat_busy {
                    spans.push(Span::styled(" (chat busy)", Theme::warning()));
                }
            }
            Some(_) => spans.push(Span::styled("unreachable", Theme::disconnected())),
            None => spans.push(Span::styled("…", Theme::muted())),
        }

        let block = Block::default().borders(Borders::BOTTOM).border_style(Theme::border());
        Paragraph::new(Line::from(spans)).block(block).render(area, buf);
    }
}

/// Left panel: terminal roster with badges and subscription markers.
pub struct TerminalListPanel<'a> {
    pub terminals: &'a [&'a TerminalState],
    pub selected: usize,
    pub focused: bool,
}

impl Widget for TerminalListPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let border_style = if self.focused {
            Theme::border_focused()
        } else {
            Theme::border()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(Span::styled(" terminals ", Theme::title()));
        let inner = block.inner(area);
        block.render(area, buf);

        if self.terminals.is_empty() {
            Paragraph::new(Span::styled("no terminals", Theme::dim())).render(inner, buf);
            return;
        }

        let width = inner.width as usize;
        let mut lines = Vec::new();
        for (i, terminal) in self.terminals.iter().enumerate() {
            let badge = match terminal.kind {
                TerminalKind::Managed => Span::styled(" M ", Theme::managed_badge()),
                TerminalKind::Ambient => Span::styled(" A ", Theme::ambient_badge()),
            };
            let marker = if terminal.subscribed { "●" } else { "○" };
            let marker_style = if terminal.subscribed {
                Theme::success()
            } else {
                Theme::muted()
            };
            let label_style = if i == self.selected {
                Theme::selected()
            } else if terminal.open {
                Theme::text()
            } else {
                Theme::dim()
            };
            let label = truncate_to_width(terminal.label(), width.saturating_sub(7));

            lines.push(Line::from(vec![
                Span::styled(format!("{} ", marker), marker_style),
                badge,
                Span::raw(" "),
                Span::styled(label, label_style),
            ]));
        }

        Paragraph::new(lines).render(inner, buf);
    }
}

/// Main panel: scrollback of the selected terminal.
pub struct OutputPanel<'a> {
    pub terminal: Option<&'a TerminalState>,
    /// Lines scrolled up from the bottom
    pub scroll_offset: usize,
}

impl Widget for OutputPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = self
            .terminal
            .map(|t| format!(" {} ", t.label()))
            .unwrap_or_else(|| " output ".to_string());
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::border())
            .title(Span::styled(title, Theme::title()));
        let inner = block.inner(area);
        block.render(area, buf);

        let Some(terminal) = self.terminal else {
            Paragraph::new(Span::styled("select a terminal", Theme::dim())).render(inner, buf);
            return;
        };

        // Flatten chunks into display lines, newest at the bottom
        let mut display: Vec<&str> = Vec::new();
        for chunk in terminal.lines() {
            for line in chunk.data.lines() {
                display.push(line);
            }
        }

        let height = inner.height as usize;
        let end = display.len().saturating_sub(self.scroll_offset);
        let start = end.saturating_sub(height);
        let visible: Vec<Line> = display[start..end]
            .iter()
            .map(|l| Line::from(Span::styled(truncate_to_width(l, inner.width as usize), Theme::text())))
            .collect();

        Paragraph::new(visible).render(inner, buf);
    }
}

/// Bottom strip: the most recent tracked actions.
pub struct ActionsPanel<'a> {
    pub actions: &'a [CodeAction],
}

impl Widget for ActionsPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::border())
            .title(Span::styled(" recent actions ", Theme::title()));
        let inner = block.inner(area);
        block.render(area, buf);

        if self.actions.is_empty() {
            Paragraph::new(Span::styled("nothing sent yet", Theme::dim())).render(inner, buf);
            return;
        }

        let width = inner.width as usize;
        let lines: Vec<Line> = self
            .actions
            .iter()
            .take(inner.height as usize)
            .map(|action| {
                let status_style = match action.status {
                    s if s.is_success_or_fallback() => Theme::success(),
                    crate::tracker::ActionStatus::Failed => Theme::error(),
                    _ => Theme::warning(),
                };
                let status = format!("{:<15}", action.status.to_string());
                let time = action.created_at.format("%H:%M:%S").to_string();
                let preview = truncate_to_width(&action.preview, width.saturating_sub(26));
                Line::from(vec![
                    Span::styled(format!("{} ", time), Theme::muted()),
                    Span::styled(status, status_style),
                    Span::raw(" "),
                    Span::styled(preview, Theme::text()),
                ])
            })
            .collect();

        Paragraph::new(lines).render(inner, buf);
    }
}

/// Key hints footer.
pub struct HelpBar;

impl Widget for HelpBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let hints = [
            ("q", "quit"),
            ("↑/↓", "select"),
            ("s", "subscribe"),
            ("a", "all"),
            ("c", "new terminal"),
            ("l", "refresh"),
            ("PgUp/PgDn", "scroll"),
        ];

        let mut spans = Vec::new();
        for (key, desc) in hints {
            spans.push(Span::styled(format!(" {} ", key), Theme::key()));
            spans.push(Span::styled(format!("{} ", desc), Theme::key_desc()));
        }

        Paragraph::new(Line::from(spans)).render(area, buf);
    }
}
