use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{AppConfig, BackendKind},
    services::{
        allocator::IdAllocator,
        backend::{BlobStore, LocalBlobStore, MemoryBlobStore},
        file_service::FileService,
    },
    state::AppState,
};

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;
    tracing::info!(?cfg, "starting upload gateway");

    // --- Object store backend ---
    let store: Arc<dyn BlobStore> = match cfg.backend {
        BackendKind::Memory => {
            tracing::warn!("memory backend selected; uploads are lost on exit");
            Arc::new(MemoryBlobStore::new())
        }
        BackendKind::Local => {
            let local = open_local_store(&cfg).await?;
            if migrate {
                tracing::info!("database migration complete");
                return Ok(());
            }
            Arc::new(local)
        }
    };

    // --- Core services ---
    let allocator = IdAllocator::new(store.clone(), cfg.max_id_attempts);
    let files = FileService::new(store, allocator, cfg.public_url.clone());
    let state = AppState::new(files, cfg.max_file_size, cfg.stale_delay);

    let app = routes::routes::app(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(%addr, %err, %fallback_addr, "permission denied binding, falling back");
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Prepare directories, connect to SQLite and apply the schema.
async fn open_local_store(cfg: &AppConfig) -> Result<LocalBlobStore> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage dir {}", cfg.storage_dir))?;
        tracing::info!(dir = %cfg.storage_dir, "created storage directory");
    }

    let options = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database url {}", cfg.database_url))?
        .create_if_missing(true);
    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!(dir = ?parent, "created database directory");
        }
    }

    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("connecting to sqlite")?;

    let store = LocalBlobStore::new(Arc::new(db), cfg.storage_dir.clone());
    store.migrate().await?;
    Ok(store)
}
