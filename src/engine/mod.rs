//! Pool engine: registry, lifecycle transitions and settlement.

use crate::external::{ExchangeService, PayoutService, RandomnessSource, TokenCustody};
use std::sync::Arc;

pub mod clock;
pub mod emergency;
pub mod lifecycle;
pub mod registry;
pub mod settlement;

pub use clock::{Clock, ManualClock, SystemClock};
pub use emergency::EmergencyReport;
pub use lifecycle::{LifecycleController, PoolLocks, PoolPolicy};
pub use registry::Registry;
pub use settlement::{
    compute_distribution, compute_fee, select_winners, Distribution, Settlement,
    SettlementEngine,
};

/// External services the lifecycle controller drives.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub exchange: Arc<dyn ExchangeService>,
    pub payouts: Arc<dyn PayoutService>,
    pub custody: Arc<dyn TokenCustody>,
    pub randomness: Arc<dyn RandomnessSource>,
}
