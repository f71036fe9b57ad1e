//! wikirag CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wikirag::{
    commands::{
        cmd_ask, cmd_config_show, cmd_init, cmd_status, cmd_sync, print_answer, print_status,
        print_sync_report, resolve_config_path, AskOptions, SyncOptions,
    },
    config::Config,
    error::Result,
    progress::LogWriterFactory,
    sync::SyncMode,
};

#[derive(Parser)]
#[command(name = "wikirag")]
#[command(version, about = "Keep a wiki in sync with a vector index and answer questions from it", long_about = None)]
struct Cli {
    /// Path to config file (or its directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile wiki spaces into the index
    Sync {
        /// Reconciliation mode
        #[arg(long, value_enum, default_value_t = SyncMode::Full)]
        mode: SyncMode,

        /// Profile to sync (defaults to `default_profile`)
        #[arg(short, long)]
        profile: Option<String>,

        /// Trailing window in days for incremental mode
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        since_days: Option<i64>,
    },

    /// Answer a question from the index
    Ask {
        /// The question
        question: String,

        /// Profile to query (defaults to `default_profile`)
        #[arg(short, long)]
        profile: Option<String>,

        /// Confidence (0-100) below which context is widened
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Number of chunks retrieved for the first pass
        #[arg(short)]
        k: Option<usize>,
    },

    /// Show system status
    Status {
        /// Profile to inspect (defaults to `default_profile`)
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let json_layer = cli
        .log_json
        .then(|| fmt::layer().json().with_writer(LogWriterFactory));
    let text_layer = (!cli.log_json).then(|| fmt::layer().with_writer(LogWriterFactory));
    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(filter)
        .init();

    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "wikirag", &mut std::io::stdout());
        }
        Commands::Config {
            action: ConfigAction::Init { force },
        } => {
            let path = cmd_init(&config_path, force)?;
            println!("✓ Wrote configuration to {}", path.display());
            println!("  Edit the wiki URL, username and spaces, then run 'wikirag sync'.");
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            let config = load_config(config_path)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", cmd_config_show(&config)?);
            }
        }
        Commands::Sync {
            mode,
            profile,
            since_days,
        } => {
            let config = load_config(config_path)?;
            let options = SyncOptions {
                profile,
                mode,
                since_days,
                show_progress: !cli.json,
            };
            let report = cmd_sync(&config, options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_sync_report(&report);
            }
        }
        Commands::Ask {
            question,
            profile,
            threshold,
            k,
        } => {
            let config = load_config(config_path)?;
            let options = AskOptions {
                profile,
                threshold,
                k,
            };
            let result = cmd_ask(&config, &question, options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_answer(&result);
            }
        }
        Commands::Status { profile } => {
            let config = load_config(config_path)?;
            let status = cmd_status(&config, profile.as_deref()).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

fn load_config(config_path: PathBuf) -> Result<Config> {
    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'wikirag config init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
