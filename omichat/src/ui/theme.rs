//! Colours and styles for the OMI Chat terminal UI.

use ratatui::style::{Color, Modifier, Style};

use omichat_proto::snapshot::Delivery;

use crate::app::ConnectionDisplay;
use crate::chat::connection::SyncStatus;

/// Brand accent: focused borders, titles, the login box.
pub const ACCENT: Color = Color::Rgb(64, 196, 180);

/// Body text.
pub const TEXT: Color = Color::White;

/// Secondary text: hints, metadata, placeholders.
pub const MUTED: Color = Color::Gray;

/// Status bar and badge background.
pub const SURFACE: Color = Color::Rgb(24, 32, 40);

/// Healthy state colour.
pub const GOOD: Color = Color::Green;

/// Failure colour.
pub const DANGER: Color = Color::Red;

/// Title colour of the online-users panel.
pub const SIDEBAR_TITLE: Color = Color::Blue;

/// Palette for other users' names.
const SENDER_PALETTE: [Color; 8] = [
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::LightBlue,
    Color::LightRed,
    Color::Rgb(255, 165, 0),
    Color::Rgb(180, 120, 255),
];

/// Colour used for the local user's own name.
const OWN_NAME: Color = ACCENT;

#[must_use]
pub fn text() -> Style {
    Style::default().fg(TEXT)
}

#[must_use]
pub fn muted() -> Style {
    Style::default().fg(MUTED)
}

#[must_use]
pub fn emphasis() -> Style {
    text().add_modifier(Modifier::BOLD)
}

/// Border of the focused panel.
#[must_use]
pub fn focused_border() -> Style {
    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
}

/// Panel title in `color`.
#[must_use]
pub fn title(color: Color) -> Style {
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

/// Notices and command output in the message list.
#[must_use]
pub fn system_line() -> Style {
    Style::default()
        .fg(Color::Rgb(100, 140, 180))
        .add_modifier(Modifier::ITALIC)
}

#[must_use]
pub fn timestamp() -> Style {
    Style::default().fg(Color::Rgb(120, 120, 120))
}

/// Text being typed, including the block cursor.
#[must_use]
pub fn input() -> Style {
    emphasis()
}

#[must_use]
pub fn status_bar() -> Style {
    Style::default().fg(TEXT).bg(SURFACE)
}

/// Unread counter in the status bar.
#[must_use]
pub fn unread_badge() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .bg(SURFACE)
        .add_modifier(Modifier::BOLD)
}

/// Name style for a message author.
#[must_use]
pub fn sender(name: &str, is_own: bool) -> Style {
    let color = if is_own { OWN_NAME } else { sender_color(name) };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

/// Stable palette colour for `name`.
#[must_use]
pub fn sender_color(name: &str) -> Color {
    // FNV-1a
    let hash = name.bytes().fold(0x811c_9dc5_u32, |acc, b| {
        (acc ^ u32::from(b)).wrapping_mul(0x0100_0193)
    });
    SENDER_PALETTE[hash as usize % SENDER_PALETTE.len()]
}

/// Style of the delivery marker after an own message.
#[must_use]
pub fn delivery(state: Delivery) -> Style {
    match state {
        Delivery::Failed => Style::default().fg(DANGER),
        Delivery::Sent => Style::default().fg(GOOD),
        Delivery::Pending | Delivery::Stored => muted(),
    }
}

/// Dot colour for the sync status indicator.
#[must_use]
pub const fn connection(display: ConnectionDisplay) -> Color {
    match display {
        ConnectionDisplay::Connecting => Color::DarkGray,
        ConnectionDisplay::Sync(SyncStatus::Connected) => GOOD,
        ConnectionDisplay::Sync(SyncStatus::Reconnecting { .. }) => Color::Yellow,
        ConnectionDisplay::Sync(SyncStatus::Halted) => DANGER,
    }
}
