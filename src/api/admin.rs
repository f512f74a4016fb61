use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::{parse_address, AppState};
use crate::domain::GlobalConfig;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAddressRequest {
    pub caller: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFeeRequest {
    pub caller: String,
    pub fee_bps: u16,
}

pub async fn get_config(State(state): State<AppState>) -> Result<Json<GlobalConfig>, AppError> {
    Ok(Json(state.registry.config().await?))
}

pub async fn set_treasury(
    State(state): State<AppState>,
    Json(body): Json<SetAddressRequest>,
) -> Result<Json<GlobalConfig>, AppError> {
    let caller = parse_address(&body.caller, "caller")?;
    let treasury = parse_address(&body.address, "address")?;
    Ok(Json(state.registry.set_treasury(&caller, treasury).await?))
}

pub async fn set_exchange(
    State(state): State<AppState>,
    Json(body): Json<SetAddressRequest>,
) -> Result<Json<GlobalConfig>, AppError> {
    let caller = parse_address(&body.caller, "caller")?;
    let exchange = parse_address(&body.address, "address")?;
    Ok(Json(
        state.registry.set_exchange_service(&caller, exchange).await?,
    ))
}

pub async fn set_fee(
    State(state): State<AppState>,
    Json(body): Json<SetFeeRequest>,
) -> Result<Json<GlobalConfig>, AppError> {
    let caller = parse_address(&body.caller, "caller")?;
    Ok(Json(
        state
            .registry
            .set_platform_fee_bps(&caller, body.fee_bps)
            .await?,
    ))
}
