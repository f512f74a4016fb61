//! Process-wide engine configuration owned by the registry.

use crate::domain::{Address, PoolId};
use serde::{Deserialize, Serialize};

/// Upper bound for the platform fee, in basis points (10%).
pub const MAX_PLATFORM_FEE_BPS: u16 = 1000;

/// Fee rate applied when none is configured.
pub const DEFAULT_PLATFORM_FEE_BPS: u16 = 1000;

/// Denominator for basis-point arithmetic.
pub const BPS_DENOMINATOR: u128 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    pub admin: Address,
    pub treasury: Address,
    /// Reference handed to the exchange collaborator (router identity).
    pub exchange: Address,
    pub platform_fee_bps: u16,
    pub next_pool_id: PoolId,
}

impl GlobalConfig {
    pub fn new(admin: Address, treasury: Option<Address>, exchange: Address) -> Self {
        Self {
            treasury: treasury.unwrap_or_else(|| admin.clone()),
            admin,
            exchange,
            platform_fee_bps: DEFAULT_PLATFORM_FEE_BPS,
            next_pool_id: PoolId::new(1),
        }
    }

    pub fn is_admin(&self, caller: &Address) -> bool {
        &self.admin == caller
    }
}
