use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};

use crate::{
    auth::jwt::JwtKeys,
    config::{AppConfig, DbConfig},
    users::repo::{PgUserStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub keys: JwtKeys,
    pub users: Arc<dyn UserStore>,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl AppState {
    /// State backed by PostgreSQL. The pool is returned too so `main` can close it.
    pub async fn init(config: &AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let db = connect(&config.db).await?;
        let state = Self {
            keys: JwtKeys::from_config(&config.jwt),
            users: Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>,
        };
        Ok((state, db))
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::users::memory::MemoryUserStore;

        Self {
            keys: JwtKeys::new("test", Duration::from_secs(60)),
            users: Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>,
        }
    }
}

async fn connect(cfg: &DbConfig) -> anyhow::Result<PgPool> {
    let options: PgConnectOptions = cfg.url.parse().context("parse DATABASE_URL")?;
    let options = options.options([(
        "statement_timeout",
        format!("{}ms", cfg.statement_timeout_ms),
    )]);
    PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
        .connect_with(options)
        .await
        .context("connect to database")
}
