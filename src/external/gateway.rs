//! HTTP settlement gateway client.
//!
//! A single gateway fronts the exchange, the reward payout rail and token
//! custody. Every request carries a `requestId` so retried calls are
//! idempotent on the gateway side.

use super::{
    ExchangeService, ExternalError, PayoutService, SwapRequest, TokenCustody, TransferReceipt,
    TransferRequest,
};
use crate::domain::{Address, Amount};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    max_elapsed: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    reward_amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponse {
    transfer_id: String,
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    error: String,
}

impl HttpGateway {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_elapsed: Duration::from_secs(30),
        }
    }

    /// Bound the total time spent retrying a single call.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    async fn post_json(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ExternalError> {
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        debug!(url = %url, "gateway request");

        retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .timeout(self.max_elapsed)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(ExternalError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(ExternalError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ExternalError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if status == 409 || status == 422 {
                let reason = response
                    .json::<RejectionBody>()
                    .await
                    .map(|b| b.error)
                    .unwrap_or_else(|_| "rejected".to_string());
                warn!(url = %url, reason = %reason, "gateway rejected request");
                return Err(backoff::Error::permanent(ExternalError::Rejected(reason)));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ExternalError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(ExternalError::ParseError(e.to_string())))
        })
        .await
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, ExternalError> {
    serde_json::from_value(value).map_err(|e| ExternalError::ParseError(e.to_string()))
}

#[async_trait]
impl ExchangeService for HttpGateway {
    async fn swap(&self, request: &SwapRequest) -> Result<Amount, ExternalError> {
        let payload = json!({
            "requestId": format!("swap:{}", request.pool_id),
            "exchange": request.exchange.as_str(),
            "token": request.token.as_str(),
            "amount": request.amount.to_canonical_string(),
        });
        let body: SwapResponse = parse_body(self.post_json("/swap", payload).await?)?;
        Amount::from_str(&body.reward_amount)
            .map_err(|e| ExternalError::ParseError(format!("rewardAmount: {}", e)))
    }
}

#[async_trait]
impl PayoutService for HttpGateway {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, ExternalError> {
        let payload = json!({
            "requestId": request.idempotency_key,
            "recipient": request.recipient.as_str(),
            "amount": request.amount.to_canonical_string(),
        });
        let body: TransferResponse = parse_body(self.post_json("/transfer", payload).await?)?;
        Ok(TransferReceipt {
            id: body.transfer_id,
            idempotency_key: request.idempotency_key.clone(),
            recipient: request.recipient.clone(),
            amount: request.amount,
        })
    }

    async fn reverse(&self, receipt: &TransferReceipt) -> Result<(), ExternalError> {
        let payload = json!({
            "requestId": format!("reverse:{}", receipt.id),
            "transferId": receipt.id,
        });
        self.post_json("/reverse", payload).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenCustody for HttpGateway {
    async fn pull(
        &self,
        token: &Address,
        from: &Address,
        amount: Amount,
    ) -> Result<(), ExternalError> {
        let payload = json!({
            "requestId": Uuid::new_v4().to_string(),
            "token": token.as_str(),
            "from": from.as_str(),
            "amount": amount.to_canonical_string(),
        });
        self.post_json("/custody/pull", payload).await?;
        Ok(())
    }

    async fn release(
        &self,
        token: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), ExternalError> {
        let payload = json!({
            "requestId": Uuid::new_v4().to_string(),
            "token": token.as_str(),
            "to": to.as_str(),
            "amount": amount.to_canonical_string(),
        });
        self.post_json("/custody/release", payload).await?;
        Ok(())
    }
}
