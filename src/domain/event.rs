//! Engine notifications, persisted alongside the state change they describe.

use crate::domain::{Address, Amount, PoolId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EngineEvent {
    #[serde(rename_all = "camelCase")]
    PoolCreated {
        pool_id: PoolId,
        creator: Address,
        token: Address,
        deadline: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    DepositRecorded {
        pool_id: PoolId,
        depositor: Address,
        amount: Amount,
        total_deposited: Amount,
    },
    #[serde(rename_all = "camelCase")]
    PoolCancelled { pool_id: PoolId, creator: Address },
    #[serde(rename_all = "camelCase")]
    PoolFinalized {
        pool_id: PoolId,
        reward_received: Amount,
        fee: Amount,
        payout_per_winner: Amount,
        winners: Vec<Address>,
    },
    #[serde(rename_all = "camelCase")]
    EmergencyWithdraw {
        pool_id: PoolId,
        admin: Address,
        amount_returned: Amount,
    },
    #[serde(rename_all = "camelCase")]
    TreasuryUpdated { old: Address, new: Address },
    #[serde(rename_all = "camelCase")]
    ExchangeUpdated { old: Address, new: Address },
    #[serde(rename_all = "camelCase")]
    PlatformFeeUpdated { old: u16, new: u16 },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::PoolCreated { .. } => "poolCreated",
            EngineEvent::DepositRecorded { .. } => "depositRecorded",
            EngineEvent::PoolCancelled { .. } => "poolCancelled",
            EngineEvent::PoolFinalized { .. } => "poolFinalized",
            EngineEvent::EmergencyWithdraw { .. } => "emergencyWithdraw",
            EngineEvent::TreasuryUpdated { .. } => "treasuryUpdated",
            EngineEvent::ExchangeUpdated { .. } => "exchangeUpdated",
            EngineEvent::PlatformFeeUpdated { .. } => "platformFeeUpdated",
        }
    }

    /// Pool the event belongs to; `None` for registry changes.
    pub fn pool_id(&self) -> Option<PoolId> {
        match self {
            EngineEvent::PoolCreated { pool_id, .. }
            | EngineEvent::DepositRecorded { pool_id, .. }
            | EngineEvent::PoolCancelled { pool_id, .. }
            | EngineEvent::PoolFinalized { pool_id, .. }
            | EngineEvent::EmergencyWithdraw { pool_id, .. } => Some(*pool_id),
            EngineEvent::TreasuryUpdated { .. }
            | EngineEvent::ExchangeUpdated { .. }
            | EngineEvent::PlatformFeeUpdated { .. } => None,
        }
    }
}
