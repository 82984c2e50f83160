//! wallet-ledger - Wallet Ledger Backend API
//!
//! Internal API for wallet balances. Every balance change is an
//! optimistic-concurrency write paired with an append-only ledger entry,
//! and every mutating request is HMAC-signed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::config::StorageBackend;
use wallet_ledger::jobs::{JobScheduler, JobSchedulerConfig};
use wallet_ledger::signing::{
    InMemoryNonceStore, NonceStore, PgNonceStore, RequestVerifier, SigningKey,
};
use wallet_ledger::store::{InMemoryLedgerStore, LedgerStore, PgLedgerStore};
use wallet_ledger::{build_router, db, AppState, Config};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wallet_ledger=debug,tower_http=debug".into());

    if json {
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
}

/// Connect and verify the schema for the postgres backend
async fn connect_database(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;

    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.is_production());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(
        backend = ?config.storage_backend,
        environment = %config.environment,
        "Starting wallet-ledger server"
    );

    let (store, nonces, pool): (Arc<dyn LedgerStore>, Arc<dyn NonceStore>, Option<PgPool>) =
        match config.storage_backend {
            StorageBackend::Postgres => {
                let pool = connect_database(&config).await?;
                (
                    Arc::new(PgLedgerStore::new(pool.clone())),
                    Arc::new(PgNonceStore::new(pool.clone())),
                    Some(pool),
                )
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; state is lost on shutdown");
                (
                    Arc::new(InMemoryLedgerStore::new()),
                    Arc::new(InMemoryNonceStore::new()),
                    None,
                )
            }
        };

    let key = SigningKey::new(config.signing_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid signing secret: {}", e))?;
    let verifier = RequestVerifier::new(key, config.signature_ttl_ms, nonces.clone());
    let state = AppState::new(store, verifier, config.currencies.clone());

    let scheduler = JobScheduler::with_config(
        nonces,
        JobSchedulerConfig {
            nonce_purge_interval: Duration::from_secs(config.nonce_purge_interval_secs),
        },
    )
    .start();

    let app = build_router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    scheduler.abort();
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
