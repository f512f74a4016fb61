pub mod admin;
pub mod health;
pub mod pools;
pub mod users;

use crate::db::Repository;
use crate::domain::Address;
use crate::engine::{LifecycleController, Registry};
use crate::error::AppError;
use axum::{
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub registry: Arc<Registry>,
    pub lifecycle: Arc<LifecycleController>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, lifecycle: Arc<LifecycleController>) -> Self {
        Self {
            repo,
            registry: lifecycle.registry().clone(),
            lifecycle,
        }
    }
}

/// Body of commands that only need the acting identity.
#[derive(Debug, Deserialize)]
pub struct CallerBody {
    pub caller: String,
}

pub(crate) fn parse_address(raw: &str, field: &str) -> Result<Address, AppError> {
    Address::from_str(raw).map_err(|e| AppError::BadRequest(format!("Invalid {}: {}", field, e)))
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/config", get(admin::get_config))
        .route("/v1/admin/treasury", post(admin::set_treasury))
        .route("/v1/admin/exchange", post(admin::set_exchange))
        .route("/v1/admin/fee", post(admin::set_fee))
        .route("/v1/pools", post(pools::create_pool))
        .route("/v1/pools/:id", get(pools::get_pool))
        .route("/v1/pools/:id/depositors", get(pools::get_depositors))
        .route("/v1/pools/:id/deposits", post(pools::deposit))
        .route("/v1/pools/:id/deposits/:user", get(pools::get_user_deposit))
        .route("/v1/pools/:id/events", get(pools::get_events))
        .route("/v1/pools/:id/cancel", post(pools::cancel_pool))
        .route("/v1/pools/:id/finalize", post(pools::finalize_pool))
        .route(
            "/v1/pools/:id/emergency-withdraw",
            post(pools::emergency_withdraw),
        )
        .route("/v1/pools/:id/refunds", get(pools::get_refunds))
        .route("/v1/pools/:id/refunds/retry", post(pools::retry_refunds))
        .route("/v1/users/:user/pools", get(users::get_user_pools))
        .route("/v1/users/:user/deposits", get(users::get_user_deposits))
        .layer(cors)
        .with_state(state)
}
