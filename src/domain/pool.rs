//! Pool record and its lifecycle guards.

use crate::domain::{Address, Amount, PoolId, Timestamp};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Maximum number of winners drawn per pool.
pub const MAX_WINNERS: usize = 3;

/// Lifecycle state derived from the terminal flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Open,
    Finalized,
    Cancelled,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Open => "open",
            PoolStatus::Finalized => "finalized",
            PoolStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single deadpool.
///
/// `finalized` and `cancelled` are never both true. Settlement fields stay at
/// their zero values until the pool is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: PoolId,
    pub creator: Address,
    pub token: Address,
    pub created_at: Timestamp,
    pub deadline: Timestamp,
    pub total_deposited: Amount,
    pub total_reward_received: Amount,
    pub winners: Vec<Address>,
    pub finalized: bool,
    pub cancelled: bool,
    pub platform_fee_bps_snapshot: Option<u16>,
    pub fee_amount: Amount,
    pub payout_per_winner: Amount,
    pub retained_remainder: Amount,
    /// Hex seed the winners were drawn from.
    pub winner_seed: Option<String>,
    /// Where the seed came from (beacon round, local entropy, ...).
    pub seed_provenance: Option<String>,
}

impl Pool {
    /// A freshly created pool with no deposits.
    pub fn new(
        id: PoolId,
        creator: Address,
        token: Address,
        created_at: Timestamp,
        deadline: Timestamp,
    ) -> Self {
        Self {
            id,
            creator,
            token,
            created_at,
            deadline,
            total_deposited: Amount::ZERO,
            total_reward_received: Amount::ZERO,
            winners: Vec::new(),
            finalized: false,
            cancelled: false,
            platform_fee_bps_snapshot: None,
            fee_amount: Amount::ZERO,
            payout_per_winner: Amount::ZERO,
            retained_remainder: Amount::ZERO,
            winner_seed: None,
            seed_provenance: None,
        }
    }

    pub fn status(&self) -> PoolStatus {
        if self.finalized {
            PoolStatus::Finalized
        } else if self.cancelled {
            PoolStatus::Cancelled
        } else {
            PoolStatus::Open
        }
    }

    pub fn is_closed(&self) -> bool {
        self.finalized || self.cancelled
    }

    /// Deposits are admitted only while open and strictly before the deadline.
    pub fn ensure_accepting_deposits(&self, now: Timestamp) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::PoolClosed(self.id));
        }
        if now >= self.deadline {
            return Err(EngineError::PoolExpired(self.id));
        }
        Ok(())
    }

    /// Guard for cancel and finalize transitions.
    pub fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::AlreadyClosed(self.id));
        }
        Ok(())
    }

    /// Finalization is permitted from the deadline onwards (inclusive).
    pub fn ensure_expired(&self, now: Timestamp) -> Result<(), EngineError> {
        if now < self.deadline {
            return Err(EngineError::PoolNotExpired(self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn pool() -> Pool {
        Pool::new(
            PoolId::new(1),
            Address::from_str("0x1111111111111111111111111111111111111111").unwrap(),
            Address::from_str("0x2222222222222222222222222222222222222222").unwrap(),
            Timestamp::new(0),
            Timestamp::new(3600),
        )
    }

    #[test]
    fn test_new_pool_is_open() {
        let p = pool();
        assert_eq!(p.status(), PoolStatus::Open);
        assert!(p.winners.is_empty());
        assert!(p.total_deposited.is_zero());
    }

    #[test]
    fn test_deposit_window_excludes_deadline() {
        let p = pool();
        assert!(p.ensure_accepting_deposits(Timestamp::new(3599)).is_ok());
        assert!(matches!(
            p.ensure_accepting_deposits(Timestamp::new(3600)),
            Err(EngineError::PoolExpired(_))
        ));
    }

    #[test]
    fn test_closed_pool_rejects_deposits_before_expiry_check() {
        let mut p = pool();
        p.cancelled = true;
        assert!(matches!(
            p.ensure_accepting_deposits(Timestamp::new(9999)),
            Err(EngineError::PoolClosed(_))
        ));
        assert_eq!(p.status(), PoolStatus::Cancelled);
    }

    #[test]
    fn test_finalize_allowed_at_deadline() {
        let p = pool();
        assert!(matches!(
            p.ensure_expired(Timestamp::new(3599)),
            Err(EngineError::PoolNotExpired(_))
        ));
        assert!(p.ensure_expired(Timestamp::new(3600)).is_ok());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&PoolStatus::Finalized).unwrap();
        assert_eq!(json, "\"finalized\"");
    }
}
