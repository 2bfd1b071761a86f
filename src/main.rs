use std::net::SocketAddr;

use anyhow::Context;

mod app;
mod auth;
mod config;
mod error;
mod extract;
mod response;
mod state;
mod users;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "rewards=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("parse APP_HOST/APP_PORT")?;
    let grace = config.shutdown_grace();
    let request_timeout = config.request_timeout();

    let (app_state, db) = AppState::init(&config).await?;
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;

    let result = app::serve(app::build_app(app_state, request_timeout), addr, grace).await;

    if tokio::time::timeout(grace, db.close()).await.is_err() {
        tracing::warn!("database pool did not close within the grace period");
    }
    tracing::info!("server stopped");
    result
}
