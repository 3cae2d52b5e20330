use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;
mod companion;
mod config;
mod corpus;
mod embeddings;
mod error;
mod generation;
mod logstore;
mod matcher;
mod reminder;
mod types;

#[derive(Parser)]
#[command(name = "companion")]
#[command(version)]
#[command(about = "Mental health companion with semantic coping tips")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a .companion directory
    Init {
        /// Directory to initialize .companion in
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// Talk to the companion
    Chat {
        /// Single message (omit for an interactive session)
        message: Option<String>,

        /// Current mood, recorded alongside the turn
        #[arg(short, long)]
        mood: Option<String>,
    },

    /// Manage the tip corpus
    #[command(subcommand)]
    Tips(TipsCommands),

    /// Show recent conversation logs
    Logs {
        /// Maximum entries
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Record a mood check-in
    Checkin {
        /// Mood, e.g. happy or anxious
        mood: String,

        /// Intensity from 1 to 10
        #[arg(short, long)]
        intensity: Option<u8>,

        /// Free-form notes
        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// Show mood and tip statistics
    Stats,

    /// Export conversation logs to stdout
    Export {
        /// Output format
        #[arg(short, long, default_value = "json", value_parser = ["json", "md", "csv"])]
        format: String,
    },

    /// View or set configuration
    Config {
        /// Config key
        key: Option<String>,

        /// Config value
        value: Option<String>,

        /// List available embedding models
        #[arg(long)]
        list_models: bool,
    },

    /// Set a one-shot reminder and wait for it
    Remind {
        /// Reminder message
        message: String,

        /// Delay such as 90s, 10m or 1h
        #[arg(short = 'i', long = "in", default_value = "10m")]
        delay: String,
    },

    /// Serve the REST API
    Serve {
        /// Address to bind
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum TipsCommands {
    /// List stored tips
    List,

    /// Embed and store a tip
    Add {
        /// Topic, e.g. anxiety or sleep
        topic: String,

        /// Tip text
        text: String,
    },

    /// Import tips from a YAML or JSON list of {topic, tip}
    Import {
        /// File to import
        file: String,
    },

    /// Rank tips against a message
    Match {
        /// Message to match
        query: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "3")]
        limit: usize,
    },
}

fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { path } => cli::chat::run_init(&path),
        Commands::Chat { message, mood } => cli::chat::run_chat(message.as_deref(), mood.as_deref()),
        Commands::Tips(cmd) => match cmd {
            TipsCommands::List => cli::tips::run_list(),
            TipsCommands::Add { topic, text } => cli::tips::run_add(&topic, &text),
            TipsCommands::Import { file } => cli::tips::run_import(&file),
            TipsCommands::Match { query, limit } => cli::tips::run_match(&query, limit),
        },
        Commands::Logs { limit } => cli::logs::run_logs(limit),
        Commands::Checkin {
            mood,
            intensity,
            notes,
        } => cli::logs::run_checkin(&mood, intensity, &notes),
        Commands::Stats => cli::logs::run_stats(),
        Commands::Export { format } => cli::logs::run_export(&format),
        Commands::Config {
            key,
            value,
            list_models,
        } => cli::config::run_config(key.as_deref(), value.as_deref(), list_models),
        Commands::Remind { message, delay } => cli::remind::run_remind(&message, &delay),
        Commands::Serve { bind } => cli::server::run_serve(&bind),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
