// src/state.rs

use crate::config::Config;
use axum::extract::FromRef;
use sqlx::PgPool;

/// Shared state for the exam service: the Postgres pool holding exams,
/// questions and attempts, plus the runtime configuration (JWT secret,
/// token lifetime, bind address).
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}

// Handlers extract `State<PgPool>` or `State<Config>` directly instead of
// taking the whole state.
impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
