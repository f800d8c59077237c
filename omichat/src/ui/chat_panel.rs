//! Chat panel rendering (message list + input box).

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use super::theme;
use crate::app::{App, DisplayMessage, PanelFocus};

/// Render the chat panel (messages + input box).
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    // Split into message area and input area
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    render_messages(frame, chunks[0], app);
    render_input(frame, chunks[1], app);
}

fn message_line(msg: &DisplayMessage) -> Line<'_> {
    if msg.is_system {
        return Line::from(vec![
            Span::styled(&msg.timestamp, theme::timestamp()),
            Span::raw(" "),
            Span::styled(&msg.content, theme::system_line()),
        ]);
    }

    let mut spans = vec![
        Span::styled(&msg.timestamp, theme::timestamp()),
        Span::raw(" "),
        Span::styled(&msg.sender, theme::sender(&msg.sender, msg.is_own)),
        Span::raw(": "),
        Span::styled(&msg.content, theme::text()),
    ];
    let symbol = msg.delivery.symbol();
    if !symbol.is_empty() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(symbol, theme::delivery(msg.delivery)));
    }
    Line::from(spans)
}

/// Render the message list.
fn render_messages(frame: &mut Frame, area: Rect, app: &App) {
    let is_focused = app.focus == PanelFocus::Chat;

    let items: Vec<ListItem> = app
        .messages
        .iter()
        .map(|msg| ListItem::new(message_line(msg)))
        .collect();

    let block = Block::default()
        .title(Span::styled(
            app.chat_title(),
            theme::title(theme::ACCENT),
        ))
        .borders(Borders::ALL)
        .border_style(if is_focused {
            theme::focused_border()
        } else {
            theme::text()
        });

    let list = List::new(items).block(block);
    let mut state = ListState::default();
    if !app.messages.is_empty() {
        state.select(Some(app.message_scroll.min(app.messages.len() - 1)));
    }

    frame.render_stateful_widget(list, area, &mut state);
}

/// Render the input box. The title names the user messages are sent as.
fn render_input(frame: &mut Frame, area: Rect, app: &App) {
    let is_focused = app.focus == PanelFocus::Input;

    let input_line = if is_focused {
        let index = app
            .input
            .char_indices()
            .nth(app.cursor_position)
            .map_or(app.input.len(), |(i, _)| i);
        let (before, after) = app.input.split_at(index);
        Line::from(Span::styled(format!("{before}█{after}"), theme::input()))
    } else if app.input.is_empty() {
        Line::from(Span::styled("Type a message or /help", theme::muted()))
    } else {
        Line::from(Span::styled(app.input.as_str(), theme::input()))
    };

    let title = app
        .user
        .as_deref()
        .map_or_else(|| "Message".to_string(), |user| format!("Message as {user}"));
    let border = if is_focused {
        theme::focused_border()
    } else {
        theme::text()
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border);

    frame.render_widget(Paragraph::new(input_line).block(block), area);
}
