//! Color theme for the TUI - using ANSI colors for better terminal compatibility

use ratatui::style::{Color, Modifier, Style};

/// Theme using ANSI colors that work well across terminal themes
pub struct Theme;

impl Theme {
    pub const CYAN: Color = Color::Cyan;
    pub const GREEN: Color = Color::Green;
    pub const YELLOW: Color = Color::Yellow;
    pub const RED: Color = Color::Red;
    pub const MAGENTA: Color = Color::Magenta;
    pub const DARK_GRAY: Color = Color::DarkGray;

    // Semantic styles
    pub fn title() -> Style {
        Style::default()
            .fg(Self::CYAN)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text() -> Style {
        Style::default()
    }

    pub fn dim() -> Style {
        Style::default().add_modifier(Modifier::DIM)
    }

    pub fn success() -> Style {
        Style::default().fg(Self::GREEN)
    }

    pub fn warning() -> Style {
        Style::default().fg(Self::YELLOW)
    }

    pub fn error() -> Style {
        Style::default().fg(Self::RED)
    }

    pub fn muted() -> Style {
        Style::default().fg(Self::DARK_GRAY)
    }

    pub fn border() -> Style {
        Style::default().fg(Self::DARK_GRAY)
    }

    pub fn border_focused() -> Style {
        Style::default().fg(Self::CYAN)
    }

    pub fn selected() -> Style {
        Style::default()
            .fg(Self::CYAN)
            .add_modifier(Modifier::BOLD | Modifier::REVERSED)
    }

    // Badge styles
    pub fn managed_badge() -> Style {
        Style::default()
            .bg(Self::GREEN)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    }

    pub fn ambient_badge() -> Style {
        Style::default()
            .bg(Self::DARK_GRAY)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    }

    // Connection indicators
    pub fn connected() -> Style {
        Style::default()
            .fg(Self::GREEN)
            .add_modifier(Modifier::BOLD)
    }

    pub fn connecting() -> Style {
        Style::default().fg(Self::YELLOW)
    }

    pub fn disconnected() -> Style {
        Style::default().fg(Self::RED)
    }

    // Key hints
    pub fn key() -> Style {
        Style::default()
            .fg(Self::CYAN)
            .add_modifier(Modifier::BOLD)
    }

    pub fn key_desc() -> Style {
        Style::default().fg(Self::DARK_GRAY)
    }
}
