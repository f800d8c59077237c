//! Plain-text export of the local history.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

use omichat_proto::snapshot::HistoryEntry;

use crate::chat::format_sent_at;

/// Width of the header separator line.
const SEPARATOR_WIDTH: usize = 50;

/// Errors that can occur while exporting history.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// There is nothing to export.
    #[error("no messages to export")]
    Empty,

    /// No user is logged in.
    #[error("no active session")]
    NotActive,

    /// Writing the export file failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// File name for an export taken on `date`: `omichat_export_YYYY-MM-DD.txt`.
#[must_use]
pub fn export_file_name<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("omichat_export_{}.txt", date.format("%Y-%m-%d"))
}

/// Renders the export document.
///
/// The header names the client version, export time, user and message count,
/// followed by a 50-character `=` rule, a blank line, and one
/// `[HH:MM] user: text` line per entry.
#[must_use]
pub fn render_export(
    version: &str,
    user: &str,
    entries: &[HistoryEntry],
    exported_at: &DateTime<Local>,
) -> String {
    let mut out = format!(
        "OMI Chat v{version} - history export\n\
         Date: {}\n\
         User: {user}\n\
         Messages: {}\n\
         {}\n\n",
        exported_at.format("%Y-%m-%d %H:%M:%S"),
        entries.len(),
        "=".repeat(SEPARATOR_WIDTH),
    );
    let lines: Vec<String> = entries
        .iter()
        .map(|e| {
            format!(
                "[{}] {}: {}",
                format_sent_at(&e.message.sent_at, "%H:%M"),
                e.message.author,
                e.message.body
            )
        })
        .collect();
    out.push_str(&lines.join("\n"));
    out
}

/// Renders and writes an export into `dir`, returning the file path.
///
/// # Errors
///
/// Returns [`ExportError::Empty`] when `entries` is empty and
/// [`ExportError::Io`] if the directory or file cannot be written.
pub fn write_export(
    dir: &Path,
    version: &str,
    user: &str,
    entries: &[HistoryEntry],
) -> Result<PathBuf, ExportError> {
    if entries.is_empty() {
        return Err(ExportError::Empty);
    }
    let now = Local::now();
    let path = dir.join(export_file_name(&now));
    std::fs::create_dir_all(dir)
        .and_then(|()| std::fs::write(&path, render_export(version, user, entries, &now)))
        .map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
    tracing::info!(path = %path.display(), messages = entries.len(), "history exported");
    Ok(path)
}
