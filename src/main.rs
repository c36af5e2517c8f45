//! classlog — class-session journaling server.
//!
//! Authenticated users create classes and attach dated daily entries (topic
//! notes plus up to two audio recordings) to each class. Audio is relayed to
//! hosted object storage; everything else lives in a local SQLite database.

mod auth;
mod config;
mod gateway;
mod journal;
mod media;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use auth::{TokenSigner, UserStore};
use config::Config;
use gateway::AppState;
use journal::JournalStore;
use media::{CloudinaryRelay, MediaRelay};

#[derive(Parser)]
#[command(name = "classlog", version, about = "Class-session journaling server")]
struct Cli {
    /// Path to the TOML config file (default: ./classlog.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classlog=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve(&host, port, config).await
        }
    }
}

async fn serve(host: &str, port: u16, config: Config) -> Result<()> {
    if config.auth.token_secret.is_empty() {
        anyhow::bail!(
            "No token secret configured. Set [auth] token_secret in classlog.toml \
             or the CLASSLOG_TOKEN_SECRET environment variable."
        );
    }
    if !config.media_configured() {
        anyhow::bail!(
            "Media storage is not configured. Set [media] cloud_name/api_key/api_secret \
             or the CLOUDINARY_CLOUD_NAME / CLOUDINARY_API_KEY / CLOUDINARY_API_SECRET \
             environment variables."
        );
    }

    gateway::error::set_expose_stack(config.expose_error_detail());

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let users = Arc::new(UserStore::new(&config.database.path).context("Failed to open user store")?);
    let journal =
        Arc::new(JournalStore::new(&config.database.path).context("Failed to open journal store")?);
    let relay: Arc<dyn MediaRelay> = Arc::new(
        CloudinaryRelay::new(config.media.clone()).context("Failed to build media relay")?,
    );
    let tokens = TokenSigner::new(&config.auth.token_secret, config.auth.token_ttl_days);

    tracing::info!(
        db = %config.database.path.display(),
        environment = %config.server.environment,
        "Starting classlog"
    );

    let state = AppState {
        users,
        journal,
        relay,
        tokens,
    };
    gateway::run_gateway(host, port, state).await
}
