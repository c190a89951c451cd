mod admission;
mod config;
mod error;
mod handlers;
mod metrics;
mod middleware;
mod models;
mod repos;
mod services;
mod signaling;
mod state;
mod stores;
mod sweeper;
#[cfg(test)]
mod test_utils;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{Router, http};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::Config,
    metrics::Metrics,
    repos::{PgDownloadRepo, PgShareRepo, PgUserRepo, Repos},
    services::{ObjectStore, S3ObjectStore},
    signaling::{Hub, HubConfig},
    state::AppState,
    stores::{FallbackRateLimiter, RedisSessionStore, Stores},
    sweeper::{SweepConfig, Sweeper},
};

#[derive(Parser)]
#[command(name = "filebeam-api")]
#[command(about = "Filebeam control-plane server")]
struct Args {
    /// Run database migrations and exit
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = envy::prefixed("FILEBEAM_").from_env::<Config>()?;

    // Set up tracing: JSON in production, human-readable otherwise
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.is_production() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }

    let database = PgPoolOptions::new()
        .max_connections(25)
        .connect(&config.database_url)
        .await?;

    // Run migrations via init container only (--migrate flag)
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&database).await?;
        tracing::info!("Migrations complete");
        return Ok(());
    }

    let redis = redis::Client::open(config.redis_url.as_str())?;
    let storage: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&config));
    let metrics = Arc::new(Metrics::new()?);
    let hub = Arc::new(Hub::new(HubConfig::from_config(&config)));

    let repos = Repos {
        users: Arc::new(PgUserRepo::new(database.clone())),
        shares: Arc::new(PgShareRepo::new(database.clone())),
        downloads: Arc::new(PgDownloadRepo::new(database.clone())),
    };
    let stores = Stores {
        sessions: Arc::new(RedisSessionStore::new(redis.clone())),
        rate_limiter: Arc::new(FallbackRateLimiter::new(redis.clone())),
    };

    let state = AppState {
        config: Arc::new(config.clone()),
        database,
        redis,
        repos: repos.clone(),
        stores,
        storage: storage.clone(),
        hub,
        metrics: metrics.clone(),
    };

    // Background tasks: expiry sweeper and signaling heartbeat.
    tokio::spawn(
        Sweeper::new(repos, storage, metrics, SweepConfig::from_config(&config)).run(),
    );
    tokio::spawn(signaling::run_heartbeat(state.clone()));

    // Request ID header name
    let x_request_id = http::HeaderName::from_static("x-request-id");

    let app = Router::new()
        .nest("/health", handlers::health::router())
        .nest("/metrics", handlers::metrics::router())
        .nest("/auth", handlers::auth::router())
        .nest("/upload", handlers::uploads::router())
        .nest("/share", handlers::shares::router())
        .nest("/files", handlers::files::router())
        .nest("/limits", handlers::limits::router())
        .nest("/p2p", handlers::p2p::router().merge(signaling::router()))
        .with_state(state)
        // Request ID: generate UUID, include in logs, return in response
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &http::Request<axum::body::Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            },
        ))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1MB limit; file bytes never pass through here

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
