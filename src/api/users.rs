use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::{parse_address, AppState};
use crate::domain::{Address, Amount, PoolId, UserDeposit};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPoolsResponse {
    pub user: Address,
    pub pool_ids: Vec<PoolId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDepositsResponse {
    pub user: Address,
    pub total_deposited: Amount,
    pub deposits: Vec<UserDeposit>,
}

pub async fn get_user_pools(
    Path(user): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UserPoolsResponse>, AppError> {
    let user = parse_address(&user, "user address")?;
    let pool_ids = state.repo.get_user_pools(&user).await?;
    Ok(Json(UserPoolsResponse { user, pool_ids }))
}

pub async fn get_user_deposits(
    Path(user): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UserDepositsResponse>, AppError> {
    let user = parse_address(&user, "user address")?;
    let deposits = state.repo.get_user_deposits(&user).await?;
    let total_deposited = deposits
        .iter()
        .try_fold(Amount::ZERO, |acc, d| acc.checked_add(d.amount))
        .ok_or_else(|| AppError::Internal("deposit total overflows".into()))?;
    Ok(Json(UserDepositsResponse {
        user,
        total_deposited,
        deposits,
    }))
}
