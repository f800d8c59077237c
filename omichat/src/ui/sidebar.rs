//! Sidebar rendering for the online-user list.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
};

use super::theme;
use crate::app::App;

/// Render the sidebar with the online users, local user first.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .online_users
        .iter()
        .map(|user| {
            let is_self = app.user.as_deref() == Some(user.as_str());
            let mut spans = vec![
                Span::styled("● ", theme::text().fg(theme::GOOD)),
                Span::styled(user.as_str(), theme::sender(user, is_self)),
            ];
            if is_self {
                spans.push(Span::styled(" (you)", theme::muted()));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let block = Block::default()
        .title(Span::styled(
            format!("Online ({})", app.online_users.len()),
            theme::title(theme::SIDEBAR_TITLE),
        ))
        .borders(Borders::ALL)
        .border_style(theme::text());

    frame.render_widget(List::new(items).block(block), area);
}
