mod api;
mod app;
mod config;
mod handler;
mod tui;
mod ui;

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};

use crate::api::ChatClient;
use crate::app::App;
use crate::config::Config;
use crate::tui::{EventHandler, Tui};

const DEFAULT_ENDPOINT: &str = "https://personachatbot.onrender.com/api/chat";

#[derive(Parser)]
#[command(name = "persona-chat")]
#[command(about = "Terminal chat client for a persona chatbot backend", version)]
struct Cli {
    /// Chat endpoint URL (overrides the config file)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let config = Config::load().unwrap_or_default();
    let endpoint = cli
        .endpoint
        .or(config.endpoint)
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

    info!("using chat endpoint: {}", endpoint);

    let mut app = App::new(ChatClient::new(&endpoint));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event).await?;
        }
    }
    Ok(())
}

/// Log to a file in the config directory; writing to the terminal would
/// corrupt the alternate screen.
fn init_logging(verbose: bool) -> Result<()> {
    let log_dir = Config::config_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("persona-chat.log"))?;

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .init();

    Ok(())
}
