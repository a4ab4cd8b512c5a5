use anyhow::Result;
use clap::{Parser, Subcommand};
use stembot::commands::{
    add_bot, delete_bot, ingest_document, list_bots, query_bot, serve, show_bot,
};
use stembot::config::{Config, get_config_dir, show_config};
use stembot::services::Services;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "stembot=info,tower_http=info";

#[derive(Parser)]
#[command(name = "stembot")]
#[command(about = "PDF-grounded STEM tutoring bots: ingest, search and chat")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Start the HTTP server
    Serve {
        /// Override the configured listen host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chunk, embed and store a document for a bot
    Ingest {
        /// Storage key of the PDF
        file_path: String,
        /// Bot that owns the resulting vectors
        bot_id: String,
    },
    /// Search a bot's documents
    Query {
        /// Bot to search
        bot_id: String,
        /// Free-text question
        query: String,
        /// Number of results (clamped to 1..=20)
        #[arg(long)]
        top_k: Option<usize>,
        /// Drop results scoring below this value
        #[arg(long)]
        score_threshold: Option<f64>,
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Manage bots
    Bot {
        #[command(subcommand)]
        command: BotCommands,
    },
}

#[derive(Subcommand)]
enum BotCommands {
    /// Create a bot from a PDF
    Add {
        /// Local PDF path, or the storage key when documents live in Supabase
        file: String,
        /// Optional display name, defaults to the file name
        #[arg(long)]
        name: Option<String>,
        /// Owning user id
        #[arg(long)]
        user: Option<String>,
        /// Register the bot without ingesting the document
        #[arg(long)]
        no_process: bool,
    },
    /// List bots
    List {
        /// Only bots owned by this user
        #[arg(long)]
        user: Option<String>,
    },
    /// Show one bot
    Show { bot_id: String },
    /// Delete a bot and its vectors
    Delete { bot_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(get_config_dir()?)?;

    if let Commands::Config { show } = &cli.command {
        if *show {
            show_config(&config)?;
        } else {
            eprintln!("Edit {} to change settings.", config.config_file_path().display());
            eprintln!("Use 'stembot config --show' to print the effective configuration.");
        }
        return Ok(());
    }

    let services = Services::from_config(config).await?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Serve { host, port } => {
            serve(&services, host, port).await?;
        }
        Commands::Ingest { file_path, bot_id } => {
            ingest_document(&services, &file_path, &bot_id).await?;
        }
        Commands::Query {
            bot_id,
            query,
            top_k,
            score_threshold,
            json,
        } => {
            query_bot(&services, &bot_id, &query, top_k, score_threshold, json).await?;
        }
        Commands::Bot { command } => match command {
            BotCommands::Add {
                file,
                name,
                user,
                no_process,
            } => {
                add_bot(&services, &file, name, user, !no_process).await?;
            }
            BotCommands::List { user } => {
                list_bots(&services, user.as_deref()).await?;
            }
            BotCommands::Show { bot_id } => {
                show_bot(&services, &bot_id).await?;
            }
            BotCommands::Delete { bot_id } => {
                delete_bot(&services, &bot_id).await?;
            }
        },
    }

    Ok(())
}
