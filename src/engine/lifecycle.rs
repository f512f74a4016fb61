//! Pool lifecycle: creation, deposits, cancellation and finalization.
//!
//! Every operation on a pool runs under that pool's lock and commits in one
//! ledger transaction. Collaborator side effects (custody pulls, payouts) are
//! compensated when the commit does not happen.

use super::settlement::SettlementEngine;
use super::{Clock, Collaborators, Registry};
use crate::db::{RefundReason, Repository};
use crate::domain::{Address, Amount, EngineEvent, Pool, PoolBook, PoolId};
use crate::error::EngineError;
use crate::external::TokenCustody;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info, warn};

/// Tunables for pool creation and settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPolicy {
    pub min_duration_secs: u64,
    pub max_duration_secs: u64,
    pub swap_timeout: Duration,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            min_duration_secs: 3600,
            max_duration_secs: 2_592_000,
            swap_timeout: Duration::from_secs(30),
        }
    }
}

/// One async mutex per pool id, created on first use.
#[derive(Debug, Default)]
pub struct PoolLocks {
    inner: Mutex<HashMap<PoolId, Arc<AsyncMutex<()>>>>,
}

impl PoolLocks {
    pub async fn acquire(&self, pool_id: PoolId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(pool_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the entry of a pool that reached a terminal state, unless another
    /// task holds or awaits it. Call while holding that pool's guard.
    pub fn forget(&self, pool_id: PoolId) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map plus the caller's guard.
        if map.get(&pool_id).is_some_and(|lock| Arc::strong_count(lock) <= 2) {
            map.remove(&pool_id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct LifecycleController {
    pub(crate) repo: Arc<Repository>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) settlement: SettlementEngine,
    pub(crate) custody: Arc<dyn TokenCustody>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: PoolPolicy,
    pub(crate) locks: PoolLocks,
}

impl LifecycleController {
    pub fn new(
        repo: Arc<Repository>,
        registry: Arc<Registry>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        policy: PoolPolicy,
    ) -> Self {
        let settlement = SettlementEngine::new(
            collaborators.exchange,
            collaborators.payouts,
            collaborators.randomness,
            policy.swap_timeout,
        );
        Self {
            repo,
            registry,
            settlement,
            custody: collaborators.custody,
            clock,
            policy,
            locks: PoolLocks::default(),
        }
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Create an empty pool with `deadline = now + duration_secs`.
    pub async fn create_pool(
        &self,
        creator: &Address,
        token: &Address,
        duration_secs: u64,
    ) -> Result<Pool, EngineError> {
        if token.is_zero() {
            return Err(EngineError::InvalidToken);
        }
        if duration_secs < self.policy.min_duration_secs
            || duration_secs > self.policy.max_duration_secs
        {
            return Err(EngineError::InvalidDuration(duration_secs));
        }

        let now = self.clock.now();
        let pool = self
            .repo
            .commit_pool_creation(creator, token, now, duration_secs)
            .await?
            .ok_or(EngineError::NotConfigured)?;

        info!(
            pool_id = %pool.id,
            creator = %creator,
            token = %token,
            deadline = %pool.deadline,
            "pool created"
        );
        Ok(pool)
    }

    pub async fn get_pool(&self, pool_id: PoolId) -> Result<Pool, EngineError> {
        self.repo
            .get_pool(pool_id)
            .await?
            .ok_or(EngineError::PoolNotFound(pool_id))
    }

    pub(crate) async fn load_book(&self, pool_id: PoolId) -> Result<PoolBook, EngineError> {
        self.repo
            .load_book(pool_id)
            .await?
            .ok_or(EngineError::PoolNotFound(pool_id))
    }

    /// Pull `amount` of the pool token from `depositor` and credit it.
    ///
    /// Returns the depositor's new cumulative balance.
    pub async fn deposit(
        &self,
        pool_id: PoolId,
        depositor: &Address,
        amount: Amount,
    ) -> Result<Amount, EngineError> {
        let _guard = self.locks.acquire(pool_id).await;
        let mut book = self.load_book(pool_id).await?;
        let now = self.clock.now();
        let outcome = book.record_deposit(depositor, amount, now)?;

        let token = book.pool.token.clone();
        self.custody
            .pull(&token, depositor, amount)
            .await
            .map_err(|e| {
                warn!(pool_id = %pool_id, depositor = %depositor, error = %e, "custody pull refused");
                EngineError::Custody(e)
            })?;

        let event = EngineEvent::DepositRecorded {
            pool_id,
            depositor: depositor.clone(),
            amount,
            total_deposited: outcome.new_total,
        };
        if let Err(e) = self
            .repo
            .commit_deposit(pool_id, depositor, &outcome, &event, now)
            .await
        {
            error!(pool_id = %pool_id, depositor = %depositor, error = %e, "deposit commit failed, releasing tokens");
            if let Err(release_err) = self.custody.release(&token, depositor, amount).await {
                warn!(
                    pool_id = %pool_id,
                    depositor = %depositor,
                    amount = %amount,
                    error = %release_err,
                    "failed to return pulled tokens, scheduling refund"
                );
                self.record_stranded_deposit(pool_id, depositor, amount).await;
            }
            return Err(e.into());
        }

        info!(
            pool_id = %pool_id,
            depositor = %depositor,
            amount = %amount,
            total = %outcome.new_total,
            first = outcome.first_deposit,
            "deposit recorded"
        );
        Ok(outcome.new_balance)
    }

    /// Keep a pending refund for tokens pulled by a deposit that was never
    /// recorded, so an administrator can release them later.
    async fn record_stranded_deposit(&self, pool_id: PoolId, depositor: &Address, amount: Amount) {
        match self
            .repo
            .record_refund(pool_id, depositor, amount, RefundReason::FailedDeposit)
            .await
        {
            Ok(()) => info!(
                pool_id = %pool_id,
                depositor = %depositor,
                amount = %amount,
                "stranded deposit scheduled for refund"
            ),
            Err(e) => error!(
                pool_id = %pool_id,
                depositor = %depositor,
                amount = %amount,
                error = %e,
                "stranded deposit could not be recorded"
            ),
        }
    }

    /// Creator-only cancellation of a pool nobody deposited into.
    pub async fn cancel_pool(&self, pool_id: PoolId, caller: &Address) -> Result<Pool, EngineError> {
        let _guard = self.locks.acquire(pool_id).await;
        let mut pool = self.get_pool(pool_id).await?;
        if &pool.creator != caller {
            return Err(EngineError::Unauthorized);
        }
        pool.ensure_open()?;
        if !pool.total_deposited.is_zero() {
            return Err(EngineError::PoolHasDeposits(pool_id));
        }

        let event = EngineEvent::PoolCancelled {
            pool_id,
            creator: caller.clone(),
        };
        if !self
            .repo
            .commit_cancellation(pool_id, &event, self.clock.now())
            .await?
        {
            return Err(EngineError::AlreadyClosed(pool_id));
        }

        pool.cancelled = true;
        self.locks.forget(pool_id);
        info!(pool_id = %pool_id, creator = %caller, "pool cancelled");
        Ok(pool)
    }

    /// Settle an expired pool. Any caller may trigger this.
    ///
    /// On failure the pool stays open and executed transfers are reversed, so
    /// finalize can simply be retried. A transfer whose reversal failed stays
    /// in effect under its idempotency key and is not paid again on retry.
    pub async fn finalize_pool(
        &self,
        pool_id: PoolId,
        caller: &Address,
    ) -> Result<Pool, EngineError> {
        let _guard = self.locks.acquire(pool_id).await;
        let book = self.load_book(pool_id).await?;
        book.pool.ensure_open()?;
        let now = self.clock.now();
        book.pool.ensure_expired(now)?;

        let config = self.registry.config().await?;
        let settlement = self.settlement.settle(&book, &config).await?;
        let d = settlement.distribution;

        let mut pool = book.pool.clone();
        pool.finalized = true;
        pool.total_reward_received = d.reward;
        pool.platform_fee_bps_snapshot = Some(d.fee_bps);
        pool.fee_amount = d.fee;
        pool.payout_per_winner = d.payout_per_winner;
        pool.retained_remainder = d.remainder;
        pool.winners = settlement.winners.clone();
        pool.winner_seed = settlement.seed.as_ref().map(|s| s.to_hex());
        pool.seed_provenance = settlement.seed.as_ref().map(|s| s.provenance.clone());

        let event = EngineEvent::PoolFinalized {
            pool_id,
            reward_received: d.reward,
            fee: d.fee,
            payout_per_winner: d.payout_per_winner,
            winners: pool.winners.clone(),
        };

        let committed = self
            .repo
            .commit_finalization(&pool, &settlement.payouts(), &event, now)
            .await;
        match committed {
            Ok(true) => {}
            Ok(false) => {
                self.settlement.unwind(&settlement.receipts).await;
                return Err(EngineError::AlreadyClosed(pool_id));
            }
            Err(e) => {
                error!(pool_id = %pool_id, error = %e, "finalization commit failed, unwinding transfers");
                let stranded = self.settlement.unwind(&settlement.receipts).await;
                return Err(EngineError::SettlementFailed(format!(
                    "commit: {}; {} transfer(s) could not be reversed",
                    e,
                    stranded.len()
                )));
            }
        }
        self.locks.forget(pool_id);

        info!(
            pool_id = %pool_id,
            caller = %caller,
            reward = %d.reward,
            fee = %d.fee,
            payout_per_winner = %d.payout_per_winner,
            winners = pool.winners.len(),
            "pool finalized"
        );
        Ok(pool)
    }
}
