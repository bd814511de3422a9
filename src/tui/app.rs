//! Watch TUI application

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::sync::{mpsc, RwLock};

use crate::terminal::{
    ConnectionState, StreamEvent, StreamHandle, TerminalBuffers, TerminalStream,
};
use crate::tracker::{ActionStore, CodeAction};
use crate::webhook::{WebhookClient, WorkspaceReadiness};
use crate::{DeskhookConfig, Result};

use super::widgets::{ActionsPanel, HeaderBar, HelpBar, OutputPanel, TerminalListPanel};

/// UI poll timeout for responsive input handling
const POLL_TIMEOUT: Duration = Duration::from_millis(16);
/// How often the webhook health is re-probed
const HEALTH_INTERVAL: Duration = Duration::from_secs(5);
/// Rows in the recent-actions strip
const ACTIONS_ROWS: usize = 4;

/// Live watch application: terminal streams, connection status, action
/// history.
pub struct WatchApp {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    stream_handle: StreamHandle,
    event_rx: mpsc::Receiver<StreamEvent>,
    health_rx: mpsc::Receiver<WorkspaceReadiness>,
    store: Arc<RwLock<ActionStore>>,
    buffers: TerminalBuffers,
    connection: ConnectionState,
    readiness: Option<WorkspaceReadiness>,
    recent_actions: Vec<CodeAction>,
    selected: usize,
    scroll_offset: usize,
    should_quit: bool,
}

impl WatchApp {
    /// Set up the terminal and connect the stream. Commands sent before the
    /// socket is up are queued and flushed on connect.
    pub fn new(
        config: &DeskhookConfig,
        client: WebhookClient,
        store: Arc<RwLock<ActionStore>>,
    ) -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;

        let (stream_handle, event_rx) = TerminalStream::new(config).connect();

        // Health probes run in their own task so a slow endpoint never
        // freezes the UI loop.
        let (health_tx, health_rx) = mpsc::channel::<WorkspaceReadiness>(4);
        tokio::spawn(async move {
            loop {
                let readiness = client.check_workspace_ready().await;
                if health_tx.send(readiness).await.is_err() {
                    break;
                }
                tokio::time::sleep(HEALTH_INTERVAL).await;
            }
        });

        Ok(Self {
            terminal,
            stream_handle,
            event_rx,
            health_rx,
            store,
            buffers: TerminalBuffers::new(config.max_lines_per_terminal),
            connection: ConnectionState::Disconnected,
            readiness: None,
            recent_actions: Vec::new(),
            selected: 0,
            scroll_offset: 0,
            should_quit: false,
        })
    }

    /// Run the main event loop until quit.
    pub async fn run(&mut self) -> Result<()> {
        let _ = self.stream_handle.list().await;
        let _ = self.stream_handle.subscribe_all().await;

        let mut last_draw = Instant::now() - POLL_TIMEOUT;

        while !self.should_quit {
            // Drain stream events (non-blocking)
            while let Ok(ev) = self.event_rx.try_recv() {
                match ev {
                    StreamEvent::StateChanged(state) => self.connection = state,
                    StreamEvent::Message(msg) => self.buffers.apply(&msg),
                }
            }

            // Latest health snapshot, if the prober produced one
            while let Ok(readiness) = self.health_rx.try_recv() {
                self.readiness = Some(readiness);
            }

            // Snapshot recent actions without ever stalling the UI
            if let Ok(store) = self.store.try_read() {
                self.recent_actions = store.recent_actions(ACTIONS_ROWS).to_vec();
            }

            self.selected = self.selected.min(self.buffers.len().saturating_sub(1));

            if last_draw.elapsed() >= POLL_TIMEOUT {
                self.draw()?;
                last_draw = Instant::now();
            }

            if event::poll(POLL_TIMEOUT)? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key(key.code, key.modifiers).await;
                }
            }
        }

        self.restore()?;
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        self.stream_handle.shutdown();
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    async fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                self.scroll_offset = 0;
            }
            KeyCode::Down => {
                if self.selected + 1 < self.buffers.len() {
                    self.selected += 1;
                }
                self.scroll_offset = 0;
            }
            KeyCode::Char('s') => {
                let target = self
                    .buffers
                    .iter()
                    .nth(self.selected)
                    .map(|t| (t.id.clone(), t.subscribed));
                if let Some((id, subscribed)) = target {
                    let _ = if subscribed {
                        self.stream_handle.unsubscribe(id).await
                    } else {
                        self.stream_handle.subscribe(id).await
                    };
                }
            }
            KeyCode::Char('a') => {
                let _ = self.stream_handle.subscribe_all().await;
            }
            KeyCode::Char('l') => {
                let _ = self.stream_handle.list().await;
            }
            KeyCode::Char('c') => {
                let _ = self.stream_handle.create_terminal(None).await;
            }
            KeyCode::PageUp => self.scroll_offset = self.scroll_offset.saturating_add(10),
            KeyCode::PageDown => self.scroll_offset = self.scroll_offset.saturating_sub(10),
            KeyCode::End => self.scroll_offset = 0,
            _ => {}
        }
    }

    fn draw(&mut self) -> io::Result<()> {
        let Self {
            terminal,
            buffers,
            connection,
            readiness,
            recent_actions,
            selected,
            scroll_offset,
            ..
        } = self;

        terminal.draw(|f| {
            let outer = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(2),
                    Constraint::Min(5),
                    Constraint::Length(ACTIONS_ROWS as u16 + 2),
                    Constraint::Length(1),
                ])
                .split(f.area());

            let main = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
                .split(outer[1]);

            f.render_widget(
                HeaderBar {
                    connection: *connection,
                    readiness: readiness.as_ref(),
                },
                outer[0],
            );

            let terminals: Vec<_> = buffers.iter().collect();
            f.render_widget(
                TerminalListPanel {
                    terminals: &terminals,
                    selected: *selected,
                    focused: true,
                },
                main[0],
            );

            f.render_widget(
                OutputPanel {
                    terminal: terminals.get(*selected).copied(),
                    scroll_offset: *scroll_offset,
                },
                main[1],
            );

            f.render_widget(ActionsPanel { actions: recent_actions }, outer[2]);
            f.render_widget(HelpBar, outer[3]);
        })?;
        Ok(())
    }
}
