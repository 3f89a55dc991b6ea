use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

mod api;
mod app;
mod config;
mod error;
mod handler;
mod logging;
mod session;
mod tui;
mod ui;

use api::{QueryResult, RagApi, RagClient};
use app::App;
use config::{Config, Settings};
use logging::LogTarget;
use session::{DisplayMode, FORM_ERROR_MESSAGE};

#[derive(Parser)]
#[command(name = "ragchat", version)]
#[command(about = "Ask questions to a RAG backend from the terminal")]
struct Cli {
    /// Root of the backend API
    #[arg(long, global = true, env = "RAGCHAT_BASE_URL")]
    base_url: Option<String>,

    /// How answers are displayed in the interactive UI
    #[arg(long, global = true, value_enum, env = "RAGCHAT_MODE")]
    mode: Option<DisplayMode>,

    /// Config file (defaults to <config dir>/ragchat/config.json)
    #[arg(long, global = true, env = "RAGCHAT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the answer
    Ask {
        question: String,
    },
    /// Submit one or more texts for ingestion
    Add {
        #[arg(required = true)]
        texts: Vec<String>,
    },
    /// Submit a titled document
    AddDoc {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        content: String,
    },
    /// Ask the backend to resync its document store
    Sync,
    /// Show recent queries recorded by the backend
    History,
    /// Show how many documents the backend holds
    Count,
    /// Write the effective base URL and display mode to the config file
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)?;
    let settings = config.resolve(cli.base_url, cli.mode);

    let Some(command) = cli.command else {
        return run_tui(settings).await;
    };

    logging::init(LogTarget::Stderr)?;
    let client = RagClient::new(&settings.base_url);

    match command {
        Commands::Ask { question } => ask(&client, &question).await?,
        Commands::Add { texts } => {
            let response = client.add_texts(texts).await.context("adding texts")?;
            print_json(&response)?;
        }
        Commands::AddDoc { title, content } => {
            let response = client
                .add_document(&title, &content)
                .await
                .context("adding document")?;
            print_json(&response)?;
        }
        Commands::Sync => {
            let response = client.sync_database().await.context("syncing database")?;
            print_json(&response)?;
        }
        Commands::History => {
            let response = client.get_queries().await.context("fetching query history")?;
            print_json(&response)?;
        }
        Commands::Count => {
            let response = client
                .get_document_count()
                .await
                .context("fetching document count")?;
            print_json(&response)?;
        }
        Commands::Config => {
            let saved = Config {
                base_url: Some(settings.base_url),
                display_mode: Some(settings.display_mode),
            };
            saved.save(&config_path)?;
            println!("Saved {}", config_path.display());
        }
    }

    Ok(())
}

async fn run_tui(settings: Settings) -> Result<()> {
    if let Some(path) = logging::init(LogTarget::File)? {
        info!(log = %path.display(), "logging to file");
    }
    let client = RagClient::new(&settings.base_url);
    info!(base_url = client.base_url(), mode = settings.display_mode.as_str(), "starting ui");

    let client: Arc<dyn RagApi> = Arc::new(client);
    let mut app = App::new(client, settings.display_mode);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = event_loop(&mut terminal, &mut app).await;
    tui::restore()?;
    result
}

async fn event_loop(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = tui::EventHandler::new(tui::TICK_RATE);

    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        if app.should_quit {
            break;
        }

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await,
            None => break,
        }
    }

    Ok(())
}

async fn ask(client: &dyn RagApi, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question is empty");
    }

    match client.send_query(question).await {
        Ok(result) => {
            print!("{}", format_answer(&result));
            Ok(())
        }
        // The reason has already been logged; the user only sees the fixed text.
        Err(_) => bail!(FORM_ERROR_MESSAGE),
    }
}

fn format_answer(result: &QueryResult) -> String {
    let mut out = format!("{}\n", result.answer);
    if !result.sources.is_empty() {
        out.push_str(&format!("\nFontes Consultadas ({}):\n", result.sources.len()));
        for (i, source) in result.sources.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, source));
        }
    }
    out
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
