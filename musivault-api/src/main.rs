//! musivault-api - Musivault collection import service
//!
//! Serves the CSV bulk-import API and the user's collection over HTTP, and
//! provides a `create-user` command for issuing API tokens.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use musivault_common::config::RootFolderInitializer;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use musivault_api::config::{CliOverrides, ServiceConfig};
use musivault_api::services::{DiscogsClient, DiscogsClientConfig};
use musivault_api::AppState;

/// Command-line arguments for musivault-api
#[derive(Parser, Debug)]
#[command(name = "musivault-api")]
#[command(about = "Musivault collection import service")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Config file (default: platform config locations)
    #[arg(long, global = true, env = "MUSIVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, global = true, env = "MUSIVAULT_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Port to listen on, replacing the port of the bind address
        #[arg(short, long, env = "MUSIVAULT_PORT")]
        port: Option<u16>,

        /// Address to bind, e.g. 127.0.0.1:5780
        #[arg(short, long, env = "MUSIVAULT_BIND")]
        bind: Option<String>,
    },

    /// Create a user and print its API token
    CreateUser {
        /// Unique user name
        username: String,
    },
}

fn init_tracing(default_level: &str) {
    let default_filter = format!("musivault_api={},tower_http={}", default_level, default_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve {
        port: None,
        bind: None,
    });

    let (port, bind) = match &command {
        Command::Serve { port, bind } => (*port, bind.clone()),
        Command::CreateUser { .. } => (None, None),
    };
    let overrides = CliOverrides {
        config: cli.common.config.clone(),
        root_folder: cli.common.root_folder.clone(),
        bind,
        port,
    };
    let config = ServiceConfig::resolve(&overrides).context("Failed to resolve configuration")?;

    init_tracing(&config.log_level);

    match command {
        Command::Serve { .. } => serve(config).await,
        Command::CreateUser { username } => create_user(config, &username).await,
    }
}

async fn open_database(config: &ServiceConfig) -> Result<sqlx::SqlitePool> {
    let initializer = RootFolderInitializer::new(config.root_folder.clone());
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    if !initializer.database_exists() {
        info!("Creating database: {}", config.database_path.display());
    }

    musivault_api::db::init_database_pool(&config.database_path)
        .await
        .context("Failed to open database")
}

async fn serve(config: ServiceConfig) -> Result<()> {
    info!("Starting musivault-api {}", env!("CARGO_PKG_VERSION"));
    info!("Root folder: {}", config.root_folder.display());

    config
        .require_discogs_credentials()
        .context("Cannot start without Discogs credentials")?;

    let db_pool = open_database(&config).await?;
    info!("Database: {}", config.database_path.display());

    let stale = musivault_api::db::import_jobs::cleanup_stale_jobs(&db_pool)
        .await
        .context("Failed to sweep interrupted import jobs")?;
    if stale > 0 {
        warn!(count = stale, "Marked interrupted import jobs as failed");
    }

    let client_config =
        DiscogsClientConfig::from_config(&config.discogs).context("Invalid Discogs configuration")?;
    let catalog = DiscogsClient::new(client_config).context("Failed to create Discogs client")?;

    let state = AppState::new(db_pool, Arc::new(catalog), config.import.clone());
    let app = musivault_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn create_user(config: ServiceConfig, username: &str) -> Result<()> {
    let db_pool = open_database(&config).await?;
    let (user, token) = musivault_api::db::users::create_user(&db_pool, username)
        .await
        .with_context(|| format!("Failed to create user '{}'", username))?;

    info!(user_id = %user.id, username = %user.username, "User created");
    println!("User:      {}", user.username);
    println!("API token: {}", token);
    println!("The token is shown only once; store it now.");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
