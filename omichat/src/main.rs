//! `omichat`: terminal chat client for the OMI Chat message store.
//!
//! Launches the TUI and polls a remote message store for new messages.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/omichat/config.toml`).
//!
//! ```bash
//! # Offline demo mode (in-process store)
//! cargo run --bin omichat
//!
//! # Talk to a deployed store
//! cargo run --bin omichat -- --endpoint https://script.google.com/macros/s/XXX/exec \
//!     --user alice
//!
//! # Or via environment variables
//! OMICHAT_ENDPOINT=https://script.google.com/macros/s/XXX/exec cargo run
//! ```

use std::io;
use std::path::Path;

use clap::Parser;
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use omichat::app::App;
use omichat::config::{CliArgs, ClientConfig};
use omichat::net::{self, NetCommand, NetConfig, NetEvent};
use omichat::storage::LocalStorage;
use omichat::store::http::HttpStore;
use omichat::store::loopback::LoopbackStore;
use omichat::ui;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load configuration: {e}");
            ClientConfig::default()
        }
    };

    // Initialize logging before terminal setup (logs go to file, not stdout).
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "omichat starting");

    let storage = open_storage(&config);
    let resume_user = config
        .user
        .clone()
        .or_else(|| storage.as_ref().and_then(LocalStorage::resume_user));

    let mut app = App::new()
        .with_timestamp_format(&config.timestamp_format)
        .with_max_display(config.history_capacity);
    let net_config = NetConfig {
        channel_capacity: config.channel_capacity,
        ..NetConfig::new(config.to_session_config(), config.export_dir.clone())
    };

    let (cmd_tx, evt_rx) = match &config.endpoint {
        Some(endpoint) => match HttpStore::new(endpoint.clone(), config.request_timeout) {
            Ok(store) => {
                app = app.with_endpoint_label(endpoint.host_str().unwrap_or("remote"));
                net::spawn_session(store, storage, net_config)
            }
            Err(e) => {
                eprintln!("Error: could not set up HTTP client: {e}");
                return Ok(());
            }
        },
        None => {
            app = app.with_endpoint_label("offline demo");
            app.push_system_message(
                "No endpoint configured: running against an in-process demo store".to_string(),
            );
            let store = LoopbackStore::new();
            store.seed("omi", "Welcome to OMI Chat! Messages here stay on this machine.");
            net::spawn_session(store, storage, net_config)
        }
    };

    if let Some(user) = resume_user {
        let _ = cmd_tx.try_send(NetCommand::Login { user });
    }

    // Set up terminal.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app.
    let result = run_app(&mut terminal, app, &cmd_tx, evt_rx, &config);

    // Restore terminal.
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    tracing::info!("omichat exiting");
    result
}

/// Initialize file-based logging.
///
/// Logs are written to a file (never stdout, since ratatui owns the terminal).
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("omichat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Open local storage; without it the client still runs, it just does not
/// remember anything across restarts.
fn open_storage(config: &ClientConfig) -> Option<LocalStorage> {
    let opened = match &config.data_dir {
        Some(dir) => LocalStorage::open(dir),
        None => LocalStorage::open_default(),
    };
    match opened {
        Ok(storage) => {
            tracing::debug!(root = %storage.root().display(), "local storage ready");
            Some(storage)
        }
        Err(e) => {
            tracing::warn!(error = %e, "local storage unavailable, state will not persist");
            None
        }
    }
}

/// Main application loop.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: App,
    cmd_tx: &mpsc::Sender<NetCommand>,
    mut evt_rx: mpsc::Receiver<NetEvent>,
    config: &ClientConfig,
) -> io::Result<()> {
    loop {
        // Step 1: Draw the UI frame.
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Step 2: Drain all pending NetEvents (non-blocking).
        while let Ok(event) = evt_rx.try_recv() {
            app.apply_net_event(event);
        }

        // Step 3: Poll for terminal input events.
        if event::poll(config.poll_timeout)? {
            let command = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key_event(key),
                Event::FocusGained => Some(NetCommand::SetForeground(true)),
                Event::FocusLost => Some(NetCommand::SetForeground(false)),
                _ => None,
            };
            if let Some(command) = command {
                dispatch(&mut app, cmd_tx, command);
            }
        }

        if app.should_quit {
            let _ = cmd_tx.try_send(NetCommand::Shutdown);
            return Ok(());
        }
    }
}

/// Hand a command to the background tasks, reporting back-pressure.
fn dispatch(app: &mut App, cmd_tx: &mpsc::Sender<NetCommand>, command: NetCommand) {
    match cmd_tx.try_send(command) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            app.push_system_message("Busy, command dropped. Try again.".to_string());
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            app.push_system_message("Background tasks stopped".to_string());
        }
    }
}
