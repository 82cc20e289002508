//! defcache - a terminal viewer for cached game definition tables.
//!
//! On startup every table in the catalog is made available locally
//! (downloaded once, reused afterwards) and the definitions are shown in a
//! scrollable grid. A few flags run the same machinery without the TUI.

mod app;
mod ui;

use std::io;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use defcache_core::{
    resolve_index, stored_counts, Config, ContentClient, DefinitionStore, Populator, Slot,
    TableOutcome,
};

use app::{App, AppState};
use ui::input::handle_input;
use ui::render::{grid_area, render};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

/// Log file written while the TUI owns the terminal
const LOG_FILE: &str = "defcache.log";

/// Initialize the tracing subscriber for logging.
///
/// The TUI draws over stderr, so it logs to a file in the cache directory;
/// the headless commands log to stderr. Use RUST_LOG to change the level.
fn init_tracing(to_file: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = if to_file {
        Config::cache_dir()
            .ok()
            .filter(|dir| std::fs::create_dir_all(dir).is_ok())
    } else {
        None
    };
    match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE));
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

enum Command {
    Tui,
    Populate,
    Get { table_name: String, offset: u64 },
    Resolve { index: i64 },
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args.get(1).map(String::as_str) {
        None => Ok(Command::Tui),
        Some("--populate") => Ok(Command::Populate),
        Some("--get") => {
            let (Some(table_name), Some(offset)) = (args.get(2), args.get(3)) else {
                bail!("usage: defcache --get <table> <offset>");
            };
            let offset = offset
                .parse()
                .with_context(|| format!("Invalid offset: {}", offset))?;
            Ok(Command::Get {
                table_name: table_name.clone(),
                offset,
            })
        }
        Some("--resolve") => {
            let Some(index) = args.get(2) else {
                bail!("usage: defcache --resolve <index>");
            };
            let index = index
                .parse()
                .with_context(|| format!("Invalid index: {}", index))?;
            Ok(Command::Resolve { index })
        }
        Some(other) => bail!(
            "Unknown argument: {} (expected --populate, --get or --resolve)",
            other
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;

    let _log_guard = init_tracing(matches!(command, Command::Tui));

    let mut config = Config::load()?;
    config.apply_env();

    let db_path = config.database_path()?;
    let store = DefinitionStore::open(&db_path)
        .with_context(|| format!("Failed to open definition store at {}", db_path.display()))?;
    info!(path = store.location(), "Definition store open");

    match command {
        Command::Tui => run_tui(config, store).await,
        Command::Populate => populate(&config, store).await,
        Command::Get { table_name, offset } => get_definition(&store, &table_name, offset).await,
        Command::Resolve { index } => resolve(&config, &store, index).await,
    }
}

/// Populate every catalog table and print one line per table
async fn populate(config: &Config, store: DefinitionStore) -> Result<()> {
    let client = ContentClient::new(config.origin.clone(), config.request_timeout_secs)?;
    let catalog = config.catalog();

    eprintln!("Populating {} tables from {}...", catalog.len(), config.origin);
    let reports = Populator::new(store, client)
        .with_concurrency(config.concurrency)
        .run(&catalog)
        .await;

    let mut failed = 0;
    for report in &reports {
        let outcome = match report.outcome {
            TableOutcome::Cached => "cached".to_string(),
            TableOutcome::Fetched => "fetched".to_string(),
            TableOutcome::Failed(ref reason) => {
                failed += 1;
                format!("failed: {}", reason)
            }
        };
        println!("{}\t{}\t{}", report.table_name, report.count, outcome);
    }

    let total: u64 = reports.iter().map(|r| r.count).sum();
    eprintln!(
        "Done! {} definitions in {} tables ({} failed).",
        total,
        reports.len(),
        failed
    );
    Ok(())
}

/// Print the stored definition at (table, offset) as JSON
async fn get_definition(store: &DefinitionStore, table_name: &str, offset: u64) -> Result<()> {
    match store.get_by_offset_async(table_name, offset).await? {
        Some(stored) => {
            println!("{}", serde_json::to_string_pretty(&stored.definition)?);
            Ok(())
        }
        None => bail!("No definition at {} offset {}", table_name, offset),
    }
}

/// Print the (table, offset) a grid index maps to, using stored counts
async fn resolve(config: &Config, store: &DefinitionStore, index: i64) -> Result<()> {
    let counts = stored_counts(store, &config.catalog()).await?;
    match resolve_index(&counts, index, config.boundary_rule) {
        Slot::Record { table_name, offset } => println!("{}\t{}", table_name, offset),
        Slot::Unknown => println!("unknown"),
    }
    Ok(())
}

async fn run_tui(config: Config, store: DefinitionStore) -> Result<()> {
    info!("defcache starting");

    let mut app = App::new(config, store);
    app.start_population()?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(ref e) = result {
        error!(error = %e, "TUI exited with an error");
        eprintln!("Error: {}", e);
    }

    info!("defcache shutting down");
    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        // Point visible cells at their slots, then draw
        terminal.draw(|f| {
            app.sync_viewport(grid_area(f.area()));
            render(f, app);
        })?;

        // Poll for events with timeout to allow background updates
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            if let Event::Key(key) = event::read()? {
                if handle_input(app, key) {
                    return Ok(());
                }
            }
        }

        // Check for population progress
        app.check_background_tasks();

        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("defcache")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        assert!(matches!(parse_args(&args(&[])).unwrap(), Command::Tui));
        assert!(matches!(
            parse_args(&args(&["--populate"])).unwrap(),
            Command::Populate
        ));
        assert!(matches!(
            parse_args(&args(&["--get", "DestinyRaceDefinition", "2"])).unwrap(),
            Command::Get { ref table_name, offset: 2 } if table_name == "DestinyRaceDefinition"
        ));
        assert!(matches!(
            parse_args(&args(&["--resolve", "-1"])).unwrap(),
            Command::Resolve { index: -1 }
        ));
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args(&["--get", "T"])).is_err());
        assert!(parse_args(&args(&["--get", "T", "x"])).is_err());
        assert!(parse_args(&args(&["--resolve"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
    }
}
