//! Status bar rendering.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
};

use super::theme;
use crate::app::{App, ConnectionDisplay, Mode, PanelFocus};

/// Render the status bar at the bottom of the screen.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let help_text = match (app.mode, app.focus) {
        (Mode::Login, _) => "Enter: log in | Esc: clear | Ctrl+C: quit",
        (Mode::Chat, PanelFocus::Input) => {
            "Enter: send | /help: commands | Tab: switch panel | Esc: clear | Ctrl+C: quit"
        }
        (Mode::Chat, PanelFocus::Chat) => "Tab: switch panel | ↑↓/jk: scroll | Ctrl+C: quit",
    };

    let status_text = match app.connection {
        ConnectionDisplay::Sync(status) => capitalize(&status.to_string()),
        ConnectionDisplay::Connecting => "Connecting".to_string(),
    };

    let mut spans = vec![
        Span::styled(
            concat!("OMI Chat v", env!("CARGO_PKG_VERSION")),
            theme::emphasis(),
        ),
        Span::raw(" | "),
    ];
    if app.mode == Mode::Chat {
        spans.push(Span::styled("●", theme::text().fg(theme::connection(app.connection))));
        spans.push(Span::raw(format!(" {status_text}")));
        if !app.endpoint_label.is_empty() {
            spans.push(Span::styled(format!(" ({})", app.endpoint_label), theme::muted()));
        }
        if app.unread > 0 {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(format!(" {} new ", app.unread), theme::unread_badge()));
        }
        spans.push(Span::raw(" | "));
    }
    spans.push(Span::styled(help_text, theme::muted()));

    let paragraph = Paragraph::new(Line::from(spans)).style(theme::status_bar());
    frame.render_widget(paragraph, area);
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
