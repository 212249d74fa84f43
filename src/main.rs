use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::{path::PathBuf, time::Duration};
use tokenkeep_config::Config;
use tokenkeep_store::{SqliteTokenStore, StoreOptions};
use tokenkeep_types::{TokenRecord, TokenStore};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser, Debug)]
#[command(name = "tokenkeep", about = "tokenkeep: store for captured OAuth tokens")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// SQLite database path (default: ~/.tokenkeep/tokens.db).
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database and its tables if missing.
    Init,
    /// Record a captured token in the history and the current-state table.
    Capture {
        #[arg(long)]
        email: String,
        #[arg(long)]
        access_token: String,
        #[arg(long, default_value = "")]
        refresh_token: String,
        /// Token expiry as RFC 3339 (default: now).
        #[arg(long)]
        expiry: Option<DateTime<Utc>>,
        #[arg(long, default_value = "Bearer")]
        token_type: String,
        #[arg(long, default_value = "")]
        user_ip: String,
        #[arg(long, default_value = "")]
        user_agent: String,
        /// Write both rows in one transaction.
        #[arg(long)]
        atomic: bool,
    },
    /// Print the current token for an email.
    Show { email: String },
    /// Print every current token, ordered by email.
    List,
    /// Print the capture history for an email.
    History { email: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database = db;
    }
    init_tracing(&config);

    let store = open_store(&config).await?;
    let result = run(cli.command, &store).await;
    store.close().await;
    result
}

async fn run(command: Commands, store: &SqliteTokenStore) -> Result<()> {
    match command {
        Commands::Init => {
            eprintln!("database ready");
            Ok(())
        }
        Commands::Capture {
            email,
            access_token,
            refresh_token,
            expiry,
            token_type,
            user_ip,
            user_agent,
            atomic,
        } => {
            let now = Utc::now();
            let record = TokenRecord {
                email,
                access_token,
                refresh_token,
                expiry: expiry.unwrap_or(now),
                token_type,
                user_ip,
                user_agent,
                capture_date: now,
                last_updated: now,
            };
            let id = if atomic {
                store.capture_atomic(&record).await?
            } else {
                store.capture(&record).await?
            };
            tracing::info!(email = %record.email, history_id = id, "token captured");
            Ok(())
        }
        Commands::Show { email } => print_json(&store.get_current(&email).await?),
        Commands::List => print_json(&store.list_current().await?),
        Commands::History { email } => print_json(&store.list_history(&email).await?),
    }
}

async fn open_store(config: &Config) -> Result<SqliteTokenStore> {
    if let Some(parent) = config.database.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let options = StoreOptions {
        max_connections: config.max_connections,
        busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        capture_date: config.capture_date,
    };
    SqliteTokenStore::open_with(&config.database, &options)
        .await
        .map_err(|e| anyhow::anyhow!("database error: {e}"))
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
