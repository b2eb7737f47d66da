use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use counsel_core::{BackendClient, Config, Settings, BASE_URL_ENV};

mod app;
mod clipboard;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "counsel", version)]
#[command(about = "Terminal client for legal research and document drafting")]
struct Cli {
    /// Base address of the Legal Intelligence Server (overrides config and env)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved settings and where the config file lives
    Config {
        /// Write the resolved settings to the config file if there is none yet
        #[arg(long)]
        init: bool,
    },
    /// Check that the server answers on /health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not read config, using defaults");
        Config::new()
    });
    let env_url = std::env::var(BASE_URL_ENV).ok();
    let settings = config.resolve(cli.base_url.as_deref(), env_url.as_deref());
    tracing::info!(base_url = %settings.base_url, stale_replies = settings.stale_replies.as_str(), "Settings resolved");

    match cli.command {
        None => run_tui(&settings).await,
        Some(Commands::Config { init }) => {
            if init {
                init_config(&settings)?;
            }
            print_config(&settings);
            Ok(())
        }
        Some(Commands::Health) => check_health(&settings).await,
    }
}

async fn run_tui(settings: &Settings) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let mut app = App::new(settings, events.sender());
    app.probe_health();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            if let Some(event) = events.next().await {
                handler::handle_event(&mut app, event)?;
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

fn init_config(settings: &Settings) -> Result<()> {
    match Config::init(settings)? {
        Some(path) => {
            tracing::info!(path = %path.display(), "Wrote config file");
            println!("wrote {}", path.display());
        }
        None => println!("config file already exists, leaving it as is"),
    }
    Ok(())
}

fn print_config(settings: &Settings) {
    match Config::get_config_path() {
        Ok(path) => println!("config file:   {}", path.display()),
        Err(e) => println!("config file:   unavailable ({})", e),
    }
    println!("base url:      {}", settings.base_url);
    println!("stale replies: {}", settings.stale_replies.as_str());
}

async fn check_health(settings: &Settings) -> Result<()> {
    let backend = BackendClient::new(&settings.base_url);
    match backend.health().await {
        Ok(()) => {
            println!("{} is healthy", backend.base_url());
            Ok(())
        }
        Err(e) => {
            eprintln!("Error reaching the Legal Intelligence Server: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Never log to stderr: the TUI draws there
    match open_log_file() {
        Some(file) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(env_filter).init();
        }
    }
}

fn open_log_file() -> Option<std::fs::File> {
    let dir: PathBuf = dirs::data_local_dir()?.join("counsel");
    fs::create_dir_all(&dir).ok()?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("counsel.log"))
        .ok()
}
