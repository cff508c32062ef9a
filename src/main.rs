use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use baseline_tracker::api::state::AppState;
use baseline_tracker::api::build_router;
use baseline_tracker::config::AppConfig;
use baseline_tracker::models::{MatchSet, Opponent, Session};
use baseline_tracker::projections::ProjectionService;
use baseline_tracker::storage::{
    EntityKind, JsonlReader, JsonlStore, StorageConfig, StorageError, Store,
};

#[derive(Parser)]
#[command(name = "baseline-tracker")]
#[command(about = "Offline-first practice tracker for racquet sports")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,

    /// Data directory path (overrides the config file)
    #[arg(long)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port number (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Rebuild materialized statistics from stored sessions
    Recompute {
        /// Rebuild a single user
        #[arg(long)]
        user: Option<Uuid>,

        /// Rebuild every user seen in the store
        #[arg(long)]
        all: bool,
    },

    /// Check stored data files for rows that do not parse or reference
    /// missing parents
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting baseline-tracker v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await?,
        Commands::Recompute { user, all } => recompute(config, user, all).await?,
        Commands::Validate => validate(config)?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let path = PathBuf::from(&cli.config);
    let mut config = if path.exists() {
        AppConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?
    } else {
        AppConfig::default()
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if cli.json_logs {
        config.log_json = true;
    }
    Ok(config)
}

async fn serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let store = JsonlStore::open(StorageConfig::new(config.data_dir.clone()))?;
    let state = AppState::new(
        Arc::new(store),
        &config.auth.api_token,
        config.auth.default_user_id,
    )
    .await;
    let app = build_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => tracing::warn!("Cannot listen for SIGTERM: {}", err),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down");
}

async fn recompute(config: AppConfig, user: Option<Uuid>, all: bool) -> Result<()> {
    let store = Arc::new(JsonlStore::open(StorageConfig::new(config.data_dir.clone()))?);
    let service = ProjectionService::new(store.clone());

    let users = if let Some(user) = user {
        vec![user]
    } else if all {
        store.list_user_ids().await?
    } else {
        eprintln!("Specify --user or --all");
        return Ok(());
    };

    for user_id in &users {
        service.recompute_for_user(*user_id).await?;
        tracing::info!("Recomputed statistics for user {}", user_id);
    }
    tracing::info!("Recomputed {} user(s)", users.len());
    Ok(())
}

fn validate(config: AppConfig) -> Result<()> {
    let storage = StorageConfig::new(config.data_dir.clone());
    if !storage.data_dir.exists() {
        return Err(StorageError::PathNotFound(storage.data_dir).into());
    }

    let (sessions, session_lines) = read_table::<Session>(&storage, EntityKind::Session)?;
    let (match_sets, set_lines) = read_table::<MatchSet>(&storage, EntityKind::MatchSet)?;
    let (opponents, opponent_lines) = read_table::<Opponent>(&storage, EntityKind::Opponent)?;

    tracing::info!(
        sessions = sessions.len(),
        match_sets = match_sets.len(),
        opponents = opponents.len(),
        "Loaded store tables"
    );

    let mut problems = 0usize;
    for (kind, rows, lines) in [
        (EntityKind::Session, sessions.len(), session_lines),
        (EntityKind::MatchSet, match_sets.len(), set_lines),
        (EntityKind::Opponent, opponents.len(), opponent_lines),
    ] {
        if rows != lines {
            problems += lines - rows;
            tracing::warn!(
                "{} table: {} line(s) are blank or do not parse",
                kind,
                lines - rows
            );
        }
    }

    let session_ids: HashSet<Uuid> = sessions.iter().map(|s| s.id).collect();
    let opponent_ids: HashSet<Uuid> = opponents.iter().map(|o| o.id).collect();
    let set_ids: HashSet<Uuid> = match_sets.iter().map(|m| m.id).collect();

    for set in &match_sets {
        if !session_ids.contains(&set.session_id) {
            problems += 1;
            tracing::warn!(
                "Match set {} references missing session {}",
                set.id,
                set.session_id
            );
        }
    }
    for session in &sessions {
        if let Some(opponent_id) = session.opponent_id {
            if !opponent_ids.contains(&opponent_id) {
                problems += 1;
                tracing::warn!(
                    "Session {} references missing opponent {}",
                    session.id,
                    opponent_id
                );
            }
        }
    }
    for (kind, total, unique) in [
        (EntityKind::Session, sessions.len(), session_ids.len()),
        (EntityKind::MatchSet, match_sets.len(), set_ids.len()),
        (EntityKind::Opponent, opponents.len(), opponent_ids.len()),
    ] {
        if total != unique {
            problems += total - unique;
            tracing::warn!("{} table holds {} duplicate id(s)", kind, total - unique);
        }
    }

    if problems == 0 {
        tracing::info!("Store is consistent");
    } else {
        tracing::warn!("Found {} problem(s)", problems);
    }
    Ok(())
}

fn read_table<T: DeserializeOwned>(
    storage: &StorageConfig,
    kind: EntityKind,
) -> Result<(Vec<T>, usize), StorageError> {
    let reader: JsonlReader<T> = JsonlReader::for_kind(storage, kind);
    let lines = reader.count()?;
    let rows = reader.read_all()?;
    Ok((rows, lines))
}
