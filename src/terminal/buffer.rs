//! Bounded per-terminal scrollback.
//!
//! Buffering is independent of the stream connection: the buffers outlive
//! reconnects, and the stream client only dispatches events. Each terminal
//! keeps at most `max_lines` lines, dropping the oldest first.

use crate::terminal::protocol::{terminal_kind, ServerMessage, TerminalKind};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};

/// One received output chunk.
#[derive(Debug, Clone)]
pub struct TerminalOutputLine {
    pub data: String,
    pub received_at: DateTime<Utc>,
}

/// Client-side view of one terminal.
#[derive(Debug, Clone)]
pub struct TerminalState {
    pub id: String,
    pub name: Option<String>,
    pub kind: TerminalKind,
    pub subscribed: bool,
    pub open: bool,
    lines: VecDeque<TerminalOutputLine>,
}

impl TerminalState {
    fn new(id: String, name: Option<String>) -> Self {
        let kind = terminal_kind(&id);
        Self {
            id,
            name,
            kind,
            subscribed: false,
            open: true,
            lines: VecDeque::new(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &TerminalOutputLine> {
        self.lines.iter()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Display label: name when the server gave one, id otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// All terminal scrollbacks, keyed by terminal id.
#[derive(Debug)]
pub struct TerminalBuffers {
    terminals: BTreeMap<String, TerminalState>,
    max_lines: usize,
}

impl TerminalBuffers {
    pub fn new(max_lines: usize) -> Self {
        Self {
            terminals: BTreeMap::new(),
            max_lines: max_lines.max(1),
        }
    }

    /// Fold one server message into the buffers.
    pub fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::Terminals { terminals } => {
                for info in terminals {
                    self.terminals
                        .entry(info.id.clone())
                        .and_modify(|t| {
                            t.open = true;
                            if info.name.is_some() {
                                t.name = info.name.clone();
                            }
                        })
                        .or_insert_with(|| TerminalState::new(info.id.clone(), info.name.clone()));
                }
            }
            ServerMessage::Output { id, data } => {
                self.push_output(id, data.clone());
            }
            ServerMessage::TerminalOpened { id, name }
            | ServerMessage::TerminalCreated { id, name } => {
                self.terminals
                    .entry(id.clone())
                    .and_modify(|t| {
                        t.open = true;
                        if name.is_some() {
                            t.name = name.clone();
                        }
                    })
                    .or_insert_with(|| TerminalState::new(id.clone(), name.clone()));
            }
            ServerMessage::TerminalClosed { id } => {
                // Keep the scrollback; just mark the terminal gone
                if let Some(t) = self.terminals.get_mut(id) {
                    t.open = false;
                    t.subscribed = false;
                }
            }
            ServerMessage::Subscribed { id } => {
                if let Some(t) = self.terminals.get_mut(id) {
                    t.subscribed = true;
                }
            }
            ServerMessage::Unsubscribed { id } => {
                if let Some(t) = self.terminals.get_mut(id) {
                    t.subscribed = false;
                }
            }
            ServerMessage::Error { .. } => {}
        }
    }

    /// Append output to a terminal, creating the entry if the roster has not
    /// been seen yet. The line cap is enforced on every push.
    pub fn push_output(&mut self, id: &str, data: String) {
        let terminal = self
            .terminals
            .entry(id.to_string())
            .or_insert_with(|| TerminalState::new(id.to_string(), None));

        terminal.lines.push_back(TerminalOutputLine {
            data,
            received_at: Utc::now(),
        });
        while terminal.lines.len() > self.max_lines {
            terminal.lines.pop_front();
        }
    }

    pub fn get(&self, id: &str) -> Option<&TerminalState> {
        self.terminals.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TerminalState> {
        self.terminals.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.terminals.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.terminals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terminals.is_empty()
    }
}
