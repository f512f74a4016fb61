use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{parse_address, AppState, CallerBody};
use crate::domain::{Address, Amount, EngineEvent, Pool, PoolId, PoolStatus, Timestamp};
use crate::engine::EmergencyReport;
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolResponse {
    #[serde(flatten)]
    pub pool: Pool,
    pub status: PoolStatus,
}

impl From<Pool> for PoolResponse {
    fn from(pool: Pool) -> Self {
        let status = pool.status();
        Self { pool, status }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    pub caller: String,
    pub token: String,
    pub duration_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolResponse {
    pub pool_id: PoolId,
    pub deadline: Timestamp,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub caller: String,
    pub amount: Amount,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub pool_id: PoolId,
    pub depositor: Address,
    pub balance: Amount,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositorsResponse {
    pub pool_id: PoolId,
    pub depositors: Vec<Address>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDepositResponse {
    pub pool_id: PoolId,
    pub user: Address,
    pub amount: Amount,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub pool_id: PoolId,
    pub events: Vec<EngineEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundDto {
    pub depositor: Address,
    pub amount: Amount,
    pub reason: &'static str,
    pub status: &'static str,
}

pub async fn create_pool(
    State(state): State<AppState>,
    Json(body): Json<CreatePoolRequest>,
) -> Result<Json<CreatePoolResponse>, AppError> {
    let caller = parse_address(&body.caller, "caller")?;
    let token = parse_address(&body.token, "token")?;
    let pool = state
        .lifecycle
        .create_pool(&caller, &token, body.duration_secs)
        .await?;
    Ok(Json(CreatePoolResponse {
        pool_id: pool.id,
        deadline: pool.deadline,
    }))
}

pub async fn get_pool(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<PoolResponse>, AppError> {
    let pool = state.lifecycle.get_pool(PoolId::new(id)).await?;
    Ok(Json(pool.into()))
}

pub async fn get_depositors(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<DepositorsResponse>, AppError> {
    let pool_id = PoolId::new(id);
    let depositors = state.repo.get_pool_depositors(pool_id).await?;
    Ok(Json(DepositorsResponse {
        pool_id,
        depositors,
    }))
}

pub async fn get_user_deposit(
    Path((id, user)): Path<(u64, String)>,
    State(state): State<AppState>,
) -> Result<Json<UserDepositResponse>, AppError> {
    let pool_id = PoolId::new(id);
    let user = parse_address(&user, "user address")?;
    let amount = state.repo.get_user_deposit(pool_id, &user).await?;
    Ok(Json(UserDepositResponse {
        pool_id,
        user,
        amount,
    }))
}

pub async fn deposit(
    Path(id): Path<u64>,
    State(state): State<AppState>,
    Json(body): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, AppError> {
    let pool_id = PoolId::new(id);
    let depositor = parse_address(&body.caller, "caller")?;
    let balance = state
        .lifecycle
        .deposit(pool_id, &depositor, body.amount)
        .await?;
    Ok(Json(DepositResponse {
        pool_id,
        depositor,
        balance,
    }))
}

pub async fn get_events(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<EventsResponse>, AppError> {
    let pool_id = PoolId::new(id);
    state.lifecycle.get_pool(pool_id).await?;
    let events = state.repo.query_events(Some(pool_id)).await?;
    Ok(Json(EventsResponse { pool_id, events }))
}

pub async fn cancel_pool(
    Path(id): Path<u64>,
    State(state): State<AppState>,
    Json(body): Json<CallerBody>,
) -> Result<Json<PoolResponse>, AppError> {
    let caller = parse_address(&body.caller, "caller")?;
    let pool = state
        .lifecycle
        .cancel_pool(PoolId::new(id), &caller)
        .await?;
    Ok(Json(pool.into()))
}

pub async fn finalize_pool(
    Path(id): Path<u64>,
    State(state): State<AppState>,
    Json(body): Json<CallerBody>,
) -> Result<Json<PoolResponse>, AppError> {
    let caller = parse_address(&body.caller, "caller")?;
    let pool = state
        .lifecycle
        .finalize_pool(PoolId::new(id), &caller)
        .await?;
    Ok(Json(pool.into()))
}

pub async fn emergency_withdraw(
    Path(id): Path<u64>,
    State(state): State<AppState>,
    Json(body): Json<CallerBody>,
) -> Result<Json<EmergencyReport>, AppError> {
    let caller = parse_address(&body.caller, "caller")?;
    let report = state
        .lifecycle
        .emergency_withdraw(PoolId::new(id), &caller)
        .await?;
    Ok(Json(report))
}

pub async fn get_refunds(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<RefundDto>>, AppError> {
    let refunds = state
        .repo
        .get_refunds(PoolId::new(id))
        .await?
        .into_iter()
        .map(|r| RefundDto {
            depositor: r.depositor,
            amount: r.amount,
            reason: r.reason.as_str(),
            status: r.status.as_str(),
        })
        .collect();
    Ok(Json(refunds))
}

pub async fn retry_refunds(
    Path(id): Path<u64>,
    State(state): State<AppState>,
    Json(body): Json<CallerBody>,
) -> Result<Json<EmergencyReport>, AppError> {
    let caller = parse_address(&body.caller, "caller")?;
    let report = state
        .lifecycle
        .retry_pending_refunds(PoolId::new(id), &caller)
        .await?;
    Ok(Json(report))
}
