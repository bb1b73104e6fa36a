use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use tracing::{info, warn};
use worktrack_core::board::BoardScope;
use worktrack_service::{BlockingHttpService, HttpService};
use worktrack_store::{create_store, Preferences};
use worktrack_tui::app::{App, AuthInbox};
use worktrack_tui::config::Config;

fn main() -> Result<()> {
    let config = Config::parse();
    init_logging(&config)?;
    info!(api = %config.api_url, "worktrack starting");

    let store = create_store(&config.store_config()).context("opening preference store")?;
    let preferences = Preferences::new(store);

    let inbox = AuthInbox::new();
    let http = HttpService::new(&config.http_config()).with_auth_hook(inbox.hook());
    let service = BlockingHttpService::new(http).context("starting HTTP client")?;

    let scope = resolve_scope(&config, &service);
    let app = App::new(service, preferences, inbox, scope, config.user_email.clone());

    run_tui(app)
}

/// The terminal belongs to the UI, so logs go to a file.
fn init_logging(config: &Config) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("opening log file {}", config.log_file.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Explicit organization and project, or the organization's first project.
fn resolve_scope(config: &Config, service: &BlockingHttpService) -> Option<BoardScope> {
    if let Some(scope) = config.board_scope() {
        return Some(scope);
    }
    let organization = config.organization.as_deref()?;
    match service.board_projects(organization) {
        Ok(projects) => projects
            .into_iter()
            .next()
            .map(|p| BoardScope::new(organization, p.name)),
        Err(e) => {
            warn!(organization, "listing board projects failed: {e}");
            None
        }
    }
}

fn run_tui(app: App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(ref e) = result {
        eprintln!("Error: {e}");
    }

    result
}

fn event_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        terminal.draw(|frame| app.render(frame))?;

        // The optimistic board is on screen; now send the moves.
        if app.has_pending_moves() {
            app.settle_moves();
            continue;
        }

        let key = if app.needs_polling() {
            if event::poll(Duration::from_secs(1))? {
                read_key()?
            } else {
                app.tick();
                continue;
            }
        } else {
            read_key()?
        };
        let Some(key) = key else {
            continue;
        };

        // Ctrl+C always quits
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            break;
        }
        // q quits unless we're in an input mode
        if key.code == KeyCode::Char('q') && !app.is_input_mode() {
            break;
        }
        app.handle_key(key);
    }

    info!("worktrack exiting");
    Ok(())
}

fn read_key() -> Result<Option<event::KeyEvent>> {
    match event::read()? {
        Event::Key(key) if key.kind == event::KeyEventKind::Press => Ok(Some(key)),
        _ => Ok(None),
    }
}
