// src/main.rs

use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use tokio::sync::mpsc;
use tracing::{error, info};

use rampart_rs_scanner::config::ScanConfig;
use rampart_rs_scanner::core::error::ScanError;
use rampart_rs_scanner::core::models::ScanResult;
use rampart_rs_scanner::core::scanner::Orchestrator;
use rampart_rs_scanner::logging;

mod app;
mod ui;

use app::{App, AppState};

type ScanOutcome = std::result::Result<ScanResult, ScanError>;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::initialize_logging()?;
    let config = ScanConfig::load()?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Rampart RS.");
    let orchestrator = Arc::new(Orchestrator::new(config));

    // --- Setup ---
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let outcome = run_app(&mut terminal, orchestrator).await;

    // --- Restore Terminal ---
    stdout().execute(LeaveAlternateScreen)?;
    stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;
    outcome
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, orchestrator: Arc<Orchestrator>) -> Result<()> {
    let mut app = App::new();
    let (tx, mut rx) = mpsc::channel::<ScanOutcome>(1);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if event::poll(Duration::from_millis(100))? {
            handle_events(&mut app, &tx, &orchestrator)?;
        }

        if let Ok(outcome) = rx.try_recv() {
            app.finish_scan(outcome);
        }
        app.on_tick();
    }
    Ok(())
}

fn handle_events(app: &mut App, tx: &mpsc::Sender<ScanOutcome>, orchestrator: &Arc<Orchestrator>) -> Result<()> {
    if let Event::Key(key) = event::read()? {
        if key.kind == KeyEventKind::Press {
            match app.state {
                AppState::Disclaimer => match key.code {
                    KeyCode::Enter => app.acknowledge_disclaimer(),
                    KeyCode::Char('q') | KeyCode::Char('Q') => app.quit(),
                    _ => {}
                },
                AppState::Idle => handle_idle_input(app, key.code, tx, orchestrator),
                AppState::Finished | AppState::Rejected(_) => handle_finished_input(app, key.code),
                AppState::Scanning => {
                    if matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q')) {
                        app.quit();
                    }
                }
            }
        }
    }
    Ok(())
}

/// Typing goes to the target field, so quitting from here is on Esc.
fn handle_idle_input(app: &mut App, key_code: KeyCode, tx: &mpsc::Sender<ScanOutcome>, orchestrator: &Arc<Orchestrator>) {
    match key_code {
        KeyCode::Esc => app.quit(),
        KeyCode::Tab => app.toggle_scan_type(),
        KeyCode::Char(c) => app.input.push(c),
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Enter => {
            let Some(request) = app.start_scan() else { return };
            let tx = tx.clone();
            let orchestrator = Arc::clone(orchestrator);
            tokio::spawn(async move {
                let outcome = orchestrator.run(request).await;
                if let Err(e) = &outcome {
                    error!(error = %e, "Scan rejected.");
                }
                let _ = tx.send(outcome).await;
            });
        }
        _ => {}
    }
}

fn handle_finished_input(app: &mut App, key_code: KeyCode) {
    match key_code {
        KeyCode::Char('q') | KeyCode::Char('Q') => app.quit(),
        KeyCode::Char('n') | KeyCode::Char('N') => app.reset(),
        KeyCode::Up => app.previous_finding(),
        KeyCode::Down => app.next_finding(),
        _ => {}
    }
}
