//! Application state and event handling.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use omichat_proto::message::MessageId;
use omichat_proto::snapshot::{Delivery, HistoryEntry};

use crate::chat::connection::SyncStatus;
use crate::chat::format_sent_at;
use crate::net::{NetCommand, NetEvent};
use crate::session::SessionEvent;

/// Default number of messages kept on screen.
const DEFAULT_MAX_DISPLAY: usize = 500;

/// Lines shown by `/help`.
const HELP_LINES: [&str; 9] = [
    "Commands:",
    "  /refresh   poll now (also resumes a stopped connection)",
    "  /export    write history to a text file",
    "  /clear     clear local history",
    "  /users     list online users",
    "  /settings  show session settings",
    "  /logout    log out and forget local state",
    "  /quit      exit (local state is kept)",
    "Enter sends, Esc clears the input, Tab switches panel.",
];

/// Which screen is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Username prompt.
    Login,
    /// Chat view.
    Chat,
}

/// Which panel is currently focused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelFocus {
    /// Input box is focused (default).
    Input,
    /// Chat message list is focused.
    Chat,
}

/// A message for display in the chat panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    /// Message id; `None` for system lines.
    pub id: Option<MessageId>,
    /// Sender's display name.
    pub sender: String,
    /// Message content.
    pub content: String,
    /// Formatted timestamp (e.g., "14:23").
    pub timestamp: String,
    /// Delivery state of a local echo.
    pub delivery: Delivery,
    /// Whether the local user wrote it.
    pub is_own: bool,
    /// Whether this is a client notice rather than a chat message.
    pub is_system: bool,
}

impl DisplayMessage {
    fn from_entry(entry: &HistoryEntry, timestamp_format: &str) -> Self {
        Self {
            id: Some(entry.message.id),
            sender: entry.message.author.clone(),
            content: entry.message.body.clone(),
            timestamp: format_sent_at(&entry.message.sent_at, timestamp_format),
            delivery: entry.delivery,
            is_own: entry.is_own,
            is_system: false,
        }
    }

    fn system(content: String) -> Self {
        Self {
            id: None,
            sender: String::new(),
            content,
            timestamp: chrono::Local::now().format("%H:%M").to_string(),
            delivery: Delivery::Stored,
            is_own: false,
            is_system: true,
        }
    }
}

/// Connection indicator shown in the status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionDisplay {
    /// No poll has completed yet.
    Connecting,
    /// Last known sync status.
    Sync(SyncStatus),
}

/// Main application state.
pub struct App {
    /// Current screen.
    pub mode: Mode,
    /// Current text input.
    pub input: String,
    /// Cursor position in input (character index).
    pub cursor_position: usize,
    /// Messages and notices, oldest first.
    pub messages: Vec<DisplayMessage>,
    /// Which panel is focused.
    pub focus: PanelFocus,
    /// Scroll offset for message list.
    pub message_scroll: usize,
    /// Online users, local user first.
    pub online_users: Vec<String>,
    /// Logged-in user.
    pub user: Option<String>,
    /// Connection indicator.
    pub connection: ConnectionDisplay,
    /// Messages that arrived while the terminal was unfocused.
    pub unread: u32,
    /// Last login error, shown on the login screen.
    pub login_error: Option<String>,
    /// Where the store lives, for the status bar.
    pub endpoint_label: String,
    /// Whether the app should quit.
    pub should_quit: bool,
    timestamp_format: String,
    max_display: usize,
}

impl App {
    /// Create an app showing the login prompt.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: Mode::Login,
            input: String::new(),
            cursor_position: 0,
            messages: Vec::new(),
            focus: PanelFocus::Input,
            message_scroll: 0,
            online_users: Vec::new(),
            user: None,
            connection: ConnectionDisplay::Connecting,
            unread: 0,
            login_error: None,
            endpoint_label: String::new(),
            should_quit: false,
            timestamp_format: "%H:%M".to_string(),
            max_display: DEFAULT_MAX_DISPLAY,
        }
    }

    /// Set the chrono format used for message times.
    #[must_use]
    pub fn with_timestamp_format(mut self, format: &str) -> Self {
        format.clone_into(&mut self.timestamp_format);
        self
    }

    /// Set how many messages are kept on screen.
    #[must_use]
    pub fn with_max_display(mut self, max: usize) -> Self {
        self.max_display = max.max(1);
        self
    }

    /// Set the endpoint label shown in the status bar.
    #[must_use]
    pub fn with_endpoint_label(mut self, label: impl Into<String>) -> Self {
        self.endpoint_label = label.into();
        self
    }

    /// Append a client notice.
    pub fn push_system_message(&mut self, content: String) {
        self.push_display(DisplayMessage::system(content));
    }

    fn push_display(&mut self, message: DisplayMessage) {
        self.messages.push(message);
        let excess = self.messages.len().saturating_sub(self.max_display);
        if excess > 0 {
            self.messages.drain(..excess);
        }
        // Auto-scroll to bottom
        self.message_scroll = self.messages.len().saturating_sub(1);
    }

    /// Handle a key event.
    ///
    /// Returns a [`NetCommand`] when the key press needs the session.
    pub fn handle_key_event(&mut self, key: KeyEvent) -> Option<NetCommand> {
        // Global shortcuts
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return None;
            }
            (KeyCode::Esc, _) => {
                self.clear_input();
                return None;
            }
            (KeyCode::Tab | KeyCode::BackTab, _) if self.mode == Mode::Chat => {
                self.toggle_focus();
                return None;
            }
            _ => {}
        }

        match self.focus {
            PanelFocus::Input => self.handle_input_key(key),
            PanelFocus::Chat => {
                self.handle_chat_key(key);
                None
            }
        }
    }

    /// Handle key event when input is focused.
    fn handle_input_key(&mut self, key: KeyEvent) -> Option<NetCommand> {
        match key.code {
            KeyCode::Enter => return self.submit(),
            KeyCode::Char(c) => self.enter_char(c),
            KeyCode::Backspace => self.delete_char(),
            KeyCode::Left => self.move_cursor_left(),
            KeyCode::Right => self.move_cursor_right(),
            KeyCode::Home => self.cursor_position = 0,
            KeyCode::End => self.cursor_position = self.input.chars().count(),
            _ => {}
        }
        None
    }

    /// Handle key event when chat is focused.
    fn handle_chat_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.scroll_up(),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_down(),
            _ => {}
        }
    }

    const fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            PanelFocus::Input => PanelFocus::Chat,
            PanelFocus::Chat => PanelFocus::Input,
        };
    }

    /// Submit the current input as a login, slash command or message.
    fn submit(&mut self) -> Option<NetCommand> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return None;
        }
        self.clear_input();

        if self.mode == Mode::Login {
            self.login_error = None;
            return Some(NetCommand::Login { user: text });
        }
        if text.starts_with('/') {
            return self.run_command(&text);
        }
        Some(NetCommand::SendMessage { text })
    }

    /// Execute a slash command.
    fn run_command(&mut self, text: &str) -> Option<NetCommand> {
        let name = text.split_whitespace().next().unwrap_or(text);
        match name {
            "/refresh" => Some(NetCommand::Refresh),
            "/export" => Some(NetCommand::Export),
            "/clear" => Some(NetCommand::ClearHistory),
            "/settings" => Some(NetCommand::Settings),
            "/logout" => Some(NetCommand::Logout),
            "/quit" => {
                self.should_quit = true;
                None
            }
            "/users" => {
                let listing = format!(
                    "Online ({}): {}",
                    self.online_users.len(),
                    self.online_users.join(", ")
                );
                self.push_system_message(listing);
                None
            }
            "/help" => {
                for line in HELP_LINES {
                    self.push_system_message(line.to_string());
                }
                None
            }
            other => {
                self.push_system_message(format!("Unknown command: {other} (try /help)"));
                None
            }
        }
    }

    /// Apply an event from the background tasks.
    pub fn apply_net_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Session(event) => self.apply_session_event(event),
            NetEvent::LoginFailed(reason) => self.login_error = Some(reason),
            NetEvent::SendFailed(reason) => {
                self.push_system_message(format!("Send failed: {reason}"));
            }
            NetEvent::Notice(text) => {
                for line in text.lines() {
                    self.push_system_message(line.to_string());
                }
            }
            NetEvent::Error(text) => self.push_system_message(format!("Error: {text}")),
        }
    }

    fn apply_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Started {
                user,
                history,
                online_users,
            } => {
                self.mode = Mode::Chat;
                self.login_error = None;
                self.messages = history
                    .iter()
                    .map(|e| DisplayMessage::from_entry(e, &self.timestamp_format))
                    .collect();
                self.online_users = online_users;
                self.connection = ConnectionDisplay::Connecting;
                self.unread = 0;
                self.push_system_message(format!("Logged in as {user}. Type /help for commands."));
                self.user = Some(user);
            }
            SessionEvent::PingCompleted { reachable } => {
                if !reachable {
                    self.push_system_message("Message store is not reachable".to_string());
                }
            }
            SessionEvent::MessagesApplied(entries) => {
                for entry in &entries {
                    let message = DisplayMessage::from_entry(entry, &self.timestamp_format);
                    self.push_display(message);
                }
            }
            SessionEvent::Echoed(entry) => {
                let message = DisplayMessage::from_entry(&entry, &self.timestamp_format);
                self.push_display(message);
            }
            SessionEvent::DeliveryChanged { id, delivery } => {
                if let Some(message) = self
                    .messages
                    .iter_mut()
                    .rev()
                    .find(|m| m.is_own && m.id == Some(id) && m.delivery != Delivery::Stored)
                {
                    message.delivery = delivery;
                }
            }
            SessionEvent::StatusChanged(status) => {
                let was = self.connection;
                self.connection = ConnectionDisplay::Sync(status);
                match status {
                    SyncStatus::Halted => self.push_system_message(
                        "Connection lost. Use /refresh to try again.".to_string(),
                    ),
                    SyncStatus::Connected
                        if was == ConnectionDisplay::Sync(SyncStatus::Halted) =>
                    {
                        self.push_system_message("Reconnected".to_string());
                    }
                    _ => {}
                }
            }
            SessionEvent::PresenceChanged(users) => self.online_users = users,
            SessionEvent::UnreadChanged(count) => self.unread = count,
            SessionEvent::HistoryCleared => {
                self.messages.clear();
                self.message_scroll = 0;
            }
            SessionEvent::LoggedOut => {
                self.mode = Mode::Login;
                self.focus = PanelFocus::Input;
                self.messages.clear();
                self.message_scroll = 0;
                self.online_users.clear();
                self.user = None;
                self.unread = 0;
                self.connection = ConnectionDisplay::Connecting;
            }
        }
    }

    /// Title for the chat panel, with the unread badge when there is one.
    #[must_use]
    pub fn chat_title(&self) -> String {
        if self.unread > 0 {
            format!("Chat ({} new)", self.unread)
        } else {
            "Chat".to_string()
        }
    }

    fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Byte offset of the cursor.
    fn cursor_byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.input.len(), |(i, _)| i)
    }

    /// Insert a character at the cursor position.
    fn enter_char(&mut self, c: char) {
        let index = self.cursor_byte_index();
        self.input.insert(index, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let index = self.cursor_byte_index();
            self.input.remove(index);
        }
    }

    /// Move cursor left.
    const fn move_cursor_left(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
        }
    }

    /// Move cursor right.
    fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.chars().count() {
            self.cursor_position += 1;
        }
    }

    /// Scroll message list up.
    const fn scroll_up(&mut self) {
        if self.message_scroll > 0 {
            self.message_scroll -= 1;
        }
    }

    /// Scroll message list down.
    fn scroll_down(&mut self) {
        if self.message_scroll < self.messages.len().saturating_sub(1) {
            self.message_scroll += 1;
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
