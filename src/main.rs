mod app;
mod detect;
mod event;
mod group;
mod hooks;
mod normalize;
mod scheduler;
mod session;
mod storage;
mod tmux;
mod tracker;
mod ui;
mod watcher;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io;
use tokio::sync::mpsc;

use app::{App, Mode};
use event::{Event, EventHandler};
use scheduler::StatusScheduler;

#[derive(Parser)]
#[command(
    name = "agent-deck",
    about = "Terminal session manager for AI coding agents",
    disable_version_flag = true
)]
struct Cli {
    /// Print the version banner.
    #[arg(short = 'v', long = "version")]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version || matches!(cli.command, Some(Commands::Version)) {
        println!("Agent Deck v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_debug_logging();

    if !tmux::tmux_available() {
        eprintln!("Error: tmux not found in PATH");
        eprintln!();
        eprintln!("Agent Deck requires tmux. Install with:");
        eprintln!("  brew install tmux   (macOS)");
        eprintln!("  apt install tmux    (Debian/Ubuntu)");
        std::process::exit(1);
    }

    run_tui().await
}

/// `AGENTDECK_DEBUG=1` routes per-tick state-machine events to
/// `~/.agent-deck/debug.log`. Read once here, injected via the global
/// subscriber; stdout stays clean for the TUI.
fn init_debug_logging() {
    if std::env::var("AGENTDECK_DEBUG").as_deref() != Ok("1") {
        return;
    }
    let Some(home) = dirs::home_dir() else {
        return;
    };
    let dir = home.join(".agent-deck");
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    if let Ok(file) = std::fs::File::create(dir.join("debug.log")) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("agent_deck=debug"))
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .try_init();
    }
}

async fn run_tui() -> Result<()> {
    let work_dir = std::env::current_dir()
        .context("failed to get current directory")?
        .to_string_lossy()
        .to_string();

    let storage = storage::Storage::new()?;
    let scheduler = StatusScheduler::new(Arc::new(tmux::TmuxClient));
    let mut app = App::new(work_dir, storage, scheduler);

    // Hook endpoint and log watcher are optional companions; the deck
    // runs fine without either.
    let (hook_tx, mut hook_rx) = mpsc::channel(64);
    let _hook_task = match hooks::spawn_listener(hooks::SOCKET_PATH, hook_tx) {
        Ok(task) => Some(task),
        Err(err) => {
            tracing::debug!(%err, "hook socket unavailable");
            None
        }
    };
    let (watch_tx, mut watch_rx) = mpsc::channel(64);
    let _log_watcher = dirs::home_dir().and_then(|home| {
        watcher::LogWatcher::new(&home.join(".agent-deck").join("logs"), watch_tx).ok()
    });

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.load().await;
    app.refresh_statuses().await;
    app.refresh_preview().await;

    let mut events = EventHandler::new(scheduler::TICK_INTERVAL);

    let result = run_loop(&mut terminal, &mut app, &mut events, &mut hook_rx, &mut watch_rx).await;

    // One persistence write is the final act before teardown.
    app.save().await;
    hooks::cleanup_socket(std::path::Path::new(hooks::SOCKET_PATH));

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    events: &mut EventHandler,
    hook_rx: &mut mpsc::Receiver<hooks::HookEvent>,
    watch_rx: &mut mpsc::Receiver<String>,
) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::draw(frame, app))?;

        if app.should_quit {
            return Ok(());
        }

        tokio::select! {
            event = events.next() => match event {
                Some(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    handle_key(app, key).await;
                    app.refresh_preview().await;
                }
                Some(Event::Tick) => {
                    app.refresh_statuses().await;
                    app.refresh_preview().await;
                }
                Some(Event::Key(_)) | Some(Event::Resize) => {}
                None => return Ok(()),
            },
            Some(hook) = hook_rx.recv() => app.handle_hook(&hook),
            Some(name) = watch_rx.recv() => app.handle_log_activity(&name).await,
        }
    }
}

async fn handle_key(app: &mut App, key: KeyEvent) {
    match app.mode.clone() {
        Mode::Browse => handle_browse_key(app, key).await,
        Mode::Attached => handle_attached_key(app, key).await,
        Mode::NewSessionName => handle_input_key(app, key, InputTarget::SessionName).await,
        Mode::NewGroupName { .. } => handle_input_key(app, key, InputTarget::GroupName).await,
        Mode::RenameGroup { .. } | Mode::RenameSession { .. } => {
            handle_input_key(app, key, InputTarget::Rename).await
        }
        Mode::NewSessionTool => handle_tool_select_key(app, key.code).await,
        Mode::MoveSession => handle_group_select_key(app, key.code).await,
        Mode::ConfirmDelete => handle_confirm_delete_key(app, key.code).await,
    }
}

async fn handle_browse_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.quit(),
        KeyCode::Char('j') | KeyCode::Down => app.cursor_down(),
        KeyCode::Char('k') | KeyCode::Up => app.cursor_up(),
        KeyCode::Char('J') => app.move_selected_down().await,
        KeyCode::Char('K') => app.move_selected_up().await,
        KeyCode::Enter => {
            let selected = app.selected_item().cloned();
            match selected {
                Some(group::FlatItem::Group { .. }) => app.toggle_selected_group().await,
                Some(group::FlatItem::Session { .. }) => app.attach_selected(),
                None => {}
            }
        }
        KeyCode::Char('h') | KeyCode::Left => app.collapse_selected_group().await,
        KeyCode::Char('n') => app.start_new_session(),
        KeyCode::Char('g') => app.start_new_group(),
        KeyCode::Char('G') => app.start_new_subgroup(),
        KeyCode::Char('d') => app.request_delete(),
        KeyCode::Char('m') => app.start_move_session(),
        KeyCode::Char('R') => app.start_rename(),
        KeyCode::Esc => app.status_message = None,
        _ => {}
    }
}

async fn handle_attached_key(app: &mut App, key: KeyEvent) {
    // The single detach hotkey; everything else goes to the session.
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.detach().await;
        return;
    }

    if let Some(session) = app.selected_session() {
        if let Some(tmux_key) = tmux::keycode_to_tmux(key.code, key.modifiers) {
            let _ = session.send_keys(app.mux(), &tmux_key).await;
        }
    }
}

enum InputTarget {
    SessionName,
    GroupName,
    Rename,
}

async fn handle_input_key(app: &mut App, key: KeyEvent, target: InputTarget) {
    match key.code {
        KeyCode::Enter => match target {
            InputTarget::SessionName => app.submit_session_name(),
            InputTarget::GroupName => app.confirm_new_group().await,
            InputTarget::Rename => app.confirm_rename().await,
        },
        KeyCode::Esc => app.cancel_mode(),
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Char(c) => app.input.push(c),
        _ => {}
    }
}

async fn handle_tool_select_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Enter => app.confirm_new_session().await,
        KeyCode::Esc => app.cancel_mode(),
        KeyCode::Char('j') | KeyCode::Down => app.tool_select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.tool_select_prev(),
        _ => {}
    }
}

async fn handle_group_select_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Enter => app.confirm_move_session().await,
        KeyCode::Esc => app.cancel_mode(),
        KeyCode::Char('j') | KeyCode::Down => app.group_select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.group_select_prev(),
        _ => {}
    }
}

async fn handle_confirm_delete_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char('y') => app.confirm_delete().await,
        KeyCode::Esc | KeyCode::Char('n') => app.cancel_mode(),
        _ => {}
    }
}
