//! Collaborators the engine depends on but does not own: token custody, the
//! exchange, reward payouts, and randomness.

use crate::domain::{Address, Amount, PoolId};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod gateway;
pub mod mock;
pub mod randomness;

pub use gateway::HttpGateway;
pub use mock::{MockCustody, MockExchange, MockPayouts, MockRandomness};
pub use randomness::{BeaconRandomness, LocalRandomness};

/// Parameters of a token-to-reward swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    /// Idempotency key: a retried finalize swaps under the same pool id.
    pub pool_id: PoolId,
    /// Exchange-service reference from the global configuration.
    pub exchange: Address,
    pub token: Address,
    pub amount: Amount,
}

/// Converts pooled tokens into the reward currency.
///
/// Implementations must return within a bounded time; the engine additionally
/// wraps each call in a timeout.
#[async_trait]
pub trait ExchangeService: Send + Sync + fmt::Debug {
    /// Swap `amount` of `token` and return the reward amount received.
    async fn swap(&self, request: &SwapRequest) -> Result<Amount, ExternalError>;
}

/// One reward transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Stable per pool and payee, e.g. `payout:7:treasury`.
    pub idempotency_key: String,
    pub recipient: Address,
    pub amount: Amount,
}

impl TransferRequest {
    pub fn treasury(pool_id: PoolId, recipient: Address, amount: Amount) -> Self {
        Self {
            idempotency_key: format!("payout:{}:treasury", pool_id),
            recipient,
            amount,
        }
    }

    pub fn winner(pool_id: PoolId, recipient: Address, amount: Amount) -> Self {
        Self {
            idempotency_key: format!("payout:{}:winner:{}", pool_id, recipient),
            recipient,
            amount,
        }
    }
}

/// Proof of an executed reward transfer, used to reverse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub id: String,
    pub idempotency_key: String,
    pub recipient: Address,
    pub amount: Amount,
}

/// Pushes reward currency to recipients.
///
/// While a transfer is in effect, a second request under the same
/// idempotency key returns the original receipt instead of paying again.
/// Once reversed, the key may be used for a fresh transfer.
#[async_trait]
pub trait PayoutService: Send + Sync + fmt::Debug {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, ExternalError>;

    /// Undo a transfer made earlier in the same settlement.
    async fn reverse(&self, receipt: &TransferReceipt) -> Result<(), ExternalError>;
}

/// Moves deposited tokens in and out of engine custody.
#[async_trait]
pub trait TokenCustody: Send + Sync + fmt::Debug {
    /// Take `amount` of `token` from `from` into custody.
    async fn pull(&self, token: &Address, from: &Address, amount: Amount)
        -> Result<(), ExternalError>;

    /// Return `amount` of `token` from custody to `to`.
    async fn release(&self, token: &Address, to: &Address, amount: Amount)
        -> Result<(), ExternalError>;
}

/// Opaque seed for winner selection plus a label describing where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub bytes: [u8; 32],
    pub provenance: String,
}

impl Seed {
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

/// Source of unpredictable seeds, consulted once per finalization.
#[async_trait]
pub trait RandomnessSource: Send + Sync + fmt::Debug {
    async fn seed(&self, pool_id: PoolId) -> Result<Seed, ExternalError>;
}

/// Error type for collaborator calls.
#[derive(Debug, Clone, Error)]
pub enum ExternalError {
    /// Network error (e.g., connection timeout, DNS failure)
    #[error("Network error: {0}")]
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Rate limited")]
    RateLimited,
    /// The collaborator refused the request (liquidity, slippage, balance)
    #[error("Rejected: {0}")]
    Rejected(String),
    /// No answer within the allotted time
    #[error("Timed out after {0}ms")]
    Timeout(u64),
}
