use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, Seeds};
use models::credentials::Credentials;
use services::sqlite_backend::{self, SqliteBackend};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting atom-gateway with config: {:?}", cfg);

    // --- Open the backend database ---
    ensure_parent_dir(&cfg.database_url)?;
    let options = SqliteConnectOptions::from_str(&cfg.database_url)?.create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    // --- Schema and seeds ---
    sqlite_backend::run_migrations(&db).await?;
    let backend = SqliteBackend::new(db);
    seed(&backend, &cfg.seeds).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Build router ---
    let state = state::AppState::new(backend, cfg.gateway.clone());
    let app = routes::routes::app(state);

    // --- Start server ---
    let listener = bind_listener(&cfg).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn seed(backend: &SqliteBackend, seeds: &Seeds) -> Result<()> {
    for collection in &seeds.collections {
        if backend
            .register_collection(&collection.database, &collection.name)
            .await?
        {
            tracing::info!("Registered collection {}/{}", collection.database, collection.name);
        }
    }
    for user in &seeds.users {
        let credentials = Credentials::new(user.username.as_str(), user.password.as_str());
        backend.add_user(&user.database, &credentials).await?;
        tracing::info!("Stored user {} for {}", user.username, user.database);
    }
    Ok(())
}

/// Create the directory a file-backed SQLite URL points into.
fn ensure_parent_dir(database_url: &str) -> Result<()> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    if path.starts_with(':') {
        return Ok(());
    }
    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
            std::fs::create_dir_all(dir)?;
            tracing::info!("Created database directory {}", dir.display());
        }
        _ => {}
    }
    Ok(())
}

/// Bind the configured address. A wildcard host that is refused falls back
/// to loopback on the same port.
async fn bind_listener(cfg: &AppConfig) -> Result<TcpListener> {
    let addr = cfg.addr();
    let err = match TcpListener::bind(&addr).await {
        Ok(listener) => return Ok(listener),
        Err(err) => err,
    };
    let wildcard = matches!(cfg.host.as_str(), "0.0.0.0" | "::");
    if err.kind() != ErrorKind::PermissionDenied || !wildcard {
        return Err(anyhow::Error::new(err).context(format!("binding {}", addr)));
    }

    let loopback = format!("127.0.0.1:{}", cfg.port);
    tracing::warn!("Binding {} refused ({}), using {}", addr, err, loopback);
    Ok(TcpListener::bind(&loopback).await?)
}
