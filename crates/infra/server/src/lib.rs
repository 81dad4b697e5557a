//! # Owner Console Server
//!
//! JSON REST API over the owner services. Every route lives under `/api`
//! and needs `Authorization: Bearer <admin_token>`, except `GET /api/health`.
//! A background worker re-sends webhook deliveries whose retry is due.

mod auth;
mod config;
mod error;
pub mod routes;
mod state;
mod worker;

#[cfg(test)]
mod testing;

pub use config::{
    ADMIN_TOKEN_ENV, BillingConfig, CONFIG_ENV, Config, ConfigError, DnsConfig, LogFormat, ServerConfig,
    WebhooksConfig,
};
pub use error::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResult, ServerError};
pub use state::{API_ACTOR, AppState, Integrations};
pub use worker::spawn_retry_worker;

use axum::Router;
use axum::middleware;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let protected = routes::admin_routes().route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));
    let api = routes::public_routes().merge(protected);
    Router::new().nest("/api", api).with_state(state)
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `server.log_level`.
pub fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match server.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Plain => builder.init(),
    }
}

/// Runs the API and the retry worker until Ctrl+C.
pub async fn serve(config: Config) -> Result<(), ServerError> {
    let state = AppState::from_config(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = spawn_retry_worker(state.dispatcher.clone(), config.webhooks.retry_interval(), shutdown_rx);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "owner API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = worker.await;
    tracing::info!("owner API stopped");
    Ok(())
}
