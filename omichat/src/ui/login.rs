//! Login prompt rendering.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use super::theme;
use crate::app::App;

/// Render the username prompt centred in `area`.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(6),
            Constraint::Fill(1),
        ])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(44),
            Constraint::Fill(1),
        ])
        .split(rows[1]);

    let mut input = app.input.clone();
    input.push('█');

    let mut lines = vec![
        Line::from(Span::styled("Choose a username:", theme::muted())),
        Line::from(Span::styled(input, theme::input())),
        Line::from(""),
    ];
    if let Some(error) = &app.login_error {
        lines.push(Line::from(Span::styled(
            error.as_str(),
            Style::default().fg(theme::DANGER),
        )));
    }

    let block = Block::default()
        .title(Span::styled(" OMI Chat ", theme::title(theme::ACCENT)))
        .borders(Borders::ALL)
        .border_style(theme::focused_border());

    frame.render_widget(Paragraph::new(lines).block(block), columns[1]);
}
