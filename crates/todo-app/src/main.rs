//! Todo app - terminal entry point.
//!
//! Reads commands from stdin to fill in the login form and to simulate the
//! host reporting foreground/background transitions.

use anyhow::Context;
use backend_client::{FileStorage, MemoryStorage, SessionStorage};
use backend_config::{debug_flag_enabled, DEBUG_VAR};
use std::sync::Arc;
use todo_app::commands::HELP;
use todo_app::{
    AppState, AppStateEvents, ClientManager, Command, EnvConfigSource, LoginForm, RefreshOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before logging so DEBUG_FLAG is visible
    dotenvy::dotenv().ok();

    let debug = debug_flag_enabled(std::env::var(DEBUG_VAR).ok().as_deref());
    init_logging(if debug { "debug" } else { "info" });

    info!("Starting todo app...");

    let storage: Arc<dyn SessionStorage> = match std::env::var("SESSION_DIR") {
        Ok(dir) => {
            info!("Persisting sessions under {}", dir);
            Arc::new(FileStorage::new(dir))
        }
        Err(_) => {
            info!("SESSION_DIR not set, sessions are kept in memory");
            Arc::new(MemoryStorage::new())
        }
    };

    let app_state = AppStateEvents::new();
    let manager = ClientManager::new(EnvConfigSource, storage, app_state.clone());

    let client = manager
        .get_client()
        .await
        .context("Failed to create backend client")?;
    info!("Backend client ready (storage key {})", client.auth().storage_key());

    let mut outcomes = Box::pin(manager.refresh_outcomes());

    // The app starts in the foreground.
    app_state.publish(AppState::Active);

    let mut form = LoginForm::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Supabase Todo");
    println!("{}", HELP);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => run_command(command, &mut form, &manager).await,
                    Err(e) => println!("{}", e),
                }
            }
            Some(outcome) = outcomes.next() => {
                match outcome {
                    RefreshOutcome::Resumed => println!("[session] refresh resumed"),
                    RefreshOutcome::Failed(message) => println!("[session] refresh failed: {}", message),
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down...");
    manager.shutdown();
    Ok(())
}

async fn run_command(command: Command, form: &mut LoginForm, manager: &ClientManager) {
    match command {
        Command::Set(field, value) => {
            form.set(field, value);
            print_buttons(form);
        }
        Command::Press(action) => {
            if form.press(action) {
                println!("{}: not connected to a backend action yet", action.label());
            } else {
                println!("{} is disabled until email and password are filled in", action.label());
            }
        }
        Command::State(state) => {
            if manager.app_state().publish(state) == 0 {
                warn!("No lifecycle listener registered");
            }
            println!("App state: {}", state);
        }
        Command::Status => {
            println!("{:?}", form);
            print_buttons(form);
            match manager.get_client().await {
                Ok(client) => {
                    let session = client.auth().session().await.ok().flatten();
                    println!(
                        "Client: {} | session: {} | auto refresh: {}",
                        if manager.listener_registered() { "ready" } else { "no listener" },
                        if session.is_some() { "present" } else { "none" },
                        client.auth().is_auto_refreshing()
                    );
                }
                Err(e) => println!("Client unavailable: {}", e),
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

fn print_buttons(form: &LoginForm) {
    for button in form.buttons() {
        println!(
            "  [{}] {} (bg {}, opacity {})",
            if button.disabled { " " } else { "x" },
            button.label(),
            button.colors.background_color,
            button.opacity(false)
        );
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
