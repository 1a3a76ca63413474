use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::common::{Notice, NoticeLevel, SendOutcome, SyncCommand, SyncEvent};
use crate::sync::{AuthIdentity, LifecycleSignal};

use super::components::input_bar::{self, InputAction};
use super::components::{chat_area, sidebar};
use super::state::AppState;

const INPUT_POLL: Duration = Duration::from_millis(100);

/// Terminal host for the sync core.
pub struct ChatApp {
    state: AppState,
    /// Text in the input box.
    input: String,
    /// Line submitted as a message; the input box is cleared once the
    /// server accepted it.
    pending_line: Option<String>,
    typing: bool,
    show_help: bool,
    should_quit: bool,
    command_sender: mpsc::Sender<SyncCommand>,
    event_receiver: mpsc::Receiver<SyncEvent>,
}

impl ChatApp {
    pub fn new(
        command_sender: mpsc::Sender<SyncCommand>,
        event_receiver: mpsc::Receiver<SyncEvent>,
    ) -> Self {
        Self {
            state: AppState::new(),
            input: String::new(),
            pending_line: None,
            typing: false,
            show_help: false,
            should_quit: false,
            command_sender,
            event_receiver,
        }
    }

    pub async fn run(mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

        let res = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        res
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        while !self.should_quit {
            if !self.drain_sync_events() {
                break;
            }
            terminal.draw(|f| self.ui(f))?;

            if event::poll(INPUT_POLL)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key).await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns `false` once the core has shut down.
    fn drain_sync_events(&mut self) -> bool {
        loop {
            match self.event_receiver.try_recv() {
                Ok(event) => self.handle_sync_event(event),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle_sync_event(&mut self, event: SyncEvent) {
        let notice = match &event {
            SyncEvent::SessionStarted { user_id } => Some(format!("Signed in as {user_id}")),
            SyncEvent::LoggedOut => Some("Signed out".to_string()),
            _ => None,
        };
        if let SyncEvent::Send(outcome) = &event {
            let submitted = self.pending_line.take();
            let accepted = matches!(outcome, SendOutcome::Sent(_));
            if accepted && submitted.as_deref() == Some(self.input.as_str()) {
                self.input.clear();
            }
        }

        self.state.apply(event);
        if let Some(text) = notice {
            self.state.push_notice(Notice::info(text));
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match key.code {
            KeyCode::Enter => {
                self.show_help = false;
                let line = self.input.clone();
                self.stop_typing().await;
                self.submit(line).await;
            }
            KeyCode::Esc => {
                if self.show_help {
                    self.show_help = false;
                } else {
                    self.input.clear();
                    self.stop_typing().await;
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
                if self.input.is_empty() {
                    self.stop_typing().await;
                }
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                if !self.typing && !self.input.starts_with('/') {
                    self.typing = true;
                    self.send_command(SyncCommand::Typing(true)).await;
                }
            }
            _ => {}
        }
    }

    async fn stop_typing(&mut self) {
        if self.typing {
            self.typing = false;
            self.send_command(SyncCommand::Typing(false)).await;
        }
    }

    async fn submit(&mut self, line: String) {
        let action = match input_bar::parse(&line) {
            None => return,
            Some(Err(message)) => {
                self.state.push_notice(Notice::warning(message));
                return;
            }
            Some(Ok(action)) => action,
        };

        let mut keep_input = false;
        let command = match action {
            InputAction::Send(draft) => {
                self.state.draft = draft.clone();
                self.pending_line = Some(line);
                keep_input = true;
                SyncCommand::SendMessage(draft)
            }
            InputAction::Retry => {
                if self.state.draft.is_empty() {
                    self.state.push_notice(Notice::warning("Nothing to resend"));
                    return;
                }
                SyncCommand::SendMessage(self.state.draft.clone())
            }
            InputAction::Delete(id) => SyncCommand::DeleteMessage(id),
            InputAction::Clear => SyncCommand::ClearMessages,
            InputAction::Ban(request) => SyncCommand::Ban(request),
            InputAction::Unban(user_id) => SyncCommand::Unban { user_id },
            InputAction::ListBans => SyncCommand::ListBans,
            InputAction::AddModerator { user_id, user_name } => {
                SyncCommand::AddModerator { user_id, user_name }
            }
            InputAction::RemoveModerator(user_id) => SyncCommand::RemoveModerator { user_id },
            InputAction::ListModerators => SyncCommand::ListModerators,
            InputAction::TestNotification => SyncCommand::TestNotification,
            InputAction::Login {
                user_id,
                user_name,
                admin,
            } => SyncCommand::Lifecycle(LifecycleSignal::AuthChanged(Some(
                AuthIdentity::new(user_id, user_name).with_admin_hint(admin),
            ))),
            InputAction::Logout => SyncCommand::Logout,
            InputAction::Hide => SyncCommand::Lifecycle(LifecycleSignal::Hidden),
            InputAction::Show => SyncCommand::Lifecycle(LifecycleSignal::Visible),
            InputAction::Help => {
                self.input.clear();
                self.show_help = true;
                return;
            }
            InputAction::Quit => {
                self.should_quit = true;
                return;
            }
        };

        if !keep_input {
            self.input.clear();
        }
        self.send_command(command).await;
    }

    async fn send_command(&mut self, command: SyncCommand) {
        if let Err(err) = self.command_sender.send(command).await {
            log::warn!("Failed to send command to sync core: {err}");
        }
    }

    fn ui(&self, f: &mut Frame<'_>) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(
                [
                    Constraint::Min(3),
                    Constraint::Length(6),
                    Constraint::Length(3),
                ]
                .as_ref(),
            )
            .split(f.size());
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)].as_ref())
            .split(rows[0]);

        chat_area::render(f, columns[0], &self.state);
        sidebar::render(f, columns[1], &self.state);
        self.render_notices(f, rows[1]);
        input_bar::render(f, rows[2], &self.input, &self.state.composer);

        if self.show_help {
            render_help(f);
        }
    }

    fn render_notices(&self, f: &mut Frame<'_>, area: Rect) {
        let visible = usize::from(area.height.saturating_sub(2));
        let items: Vec<ListItem> = self
            .state
            .notices
            .iter()
            .rev()
            .take(visible)
            .map(|notice| {
                let style = match notice.level {
                    NoticeLevel::Info => Style::default(),
                    NoticeLevel::Warning => Style::default().fg(Color::Yellow),
                };
                ListItem::new(Line::from(Span::styled(notice.text.clone(), style)))
            })
            .collect();

        let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(list, area);
    }
}

fn render_help(f: &mut Frame<'_>) {
    let area = centered_rect(70, 70, f.size());
    let mut lines: Vec<Line> = input_bar::HELP.lines().map(Line::from).collect();
    lines.push(Line::from(""));
    lines.push(Line::from("Press Esc to close"));

    f.render_widget(Clear, area);
    let help = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Commands"))
        .wrap(Wrap { trim: false });
    f.render_widget(help, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
