//! Domain types for the deadpool engine.
//!
//! This module provides:
//! - Primitives: Address, PoolId, Timestamp, Amount
//! - The Pool record and its lifecycle guards
//! - Per-pool deposit accounting (PoolBook)
//! - Global configuration and engine events

pub mod deposit;
pub mod event;
pub mod global_config;
pub mod pool;
pub mod primitives;

pub use deposit::{DepositOutcome, PoolBook, UserDeposit};
pub use event::EngineEvent;
pub use global_config::{
    GlobalConfig, BPS_DENOMINATOR, DEFAULT_PLATFORM_FEE_BPS, MAX_PLATFORM_FEE_BPS,
};
pub use pool::{Pool, PoolStatus, MAX_WINNERS};
pub use primitives::{Address, AddressParseError, Amount, PoolId, Timestamp};
