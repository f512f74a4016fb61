//! Administrator recovery: force-cancel a pool and return deposits.

use super::LifecycleController;
use crate::db::RefundRow;
use crate::domain::{Address, Amount, EngineEvent, PoolId};
use crate::error::EngineError;
use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info};

/// Result of an emergency withdrawal or refund retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyReport {
    pub pool_id: PoolId,
    pub amount_returned: Amount,
    pub released: Vec<Address>,
    pub pending: Vec<Address>,
    /// Refunds attempted but whose outcome could not be written. They stay
    /// `in_flight` and are not retried automatically.
    pub unrecorded: Vec<Address>,
}

impl LifecycleController {
    /// Cancel an open pool regardless of deposits or deadline and schedule a
    /// refund of every balance.
    ///
    /// The cancellation and the refund schedule commit together. Releases are
    /// attempted afterwards; failed ones stay pending for
    /// [`LifecycleController::retry_pending_refunds`].
    pub async fn emergency_withdraw(
        &self,
        pool_id: PoolId,
        caller: &Address,
    ) -> Result<EmergencyReport, EngineError> {
        let _guard = self.locks.acquire(pool_id).await;
        let book = self.load_book(pool_id).await?;
        let config = self.registry.config().await?;
        if !config.is_admin(caller) {
            return Err(EngineError::Unauthorized);
        }
        book.pool.ensure_open()?;

        let refunds = book.entries();
        let amount_returned = book.pool.total_deposited;
        let event = EngineEvent::EmergencyWithdraw {
            pool_id,
            admin: caller.clone(),
            amount_returned,
        };
        if !self
            .repo
            .commit_emergency(pool_id, &refunds, &event, self.clock.now())
            .await?
        {
            return Err(EngineError::AlreadyClosed(pool_id));
        }

        info!(
            pool_id = %pool_id,
            admin = %caller,
            amount_returned = %amount_returned,
            depositors = refunds.len(),
            "emergency withdraw committed"
        );

        let outcome = self.release_refunds(pool_id, &book.pool.token).await?;
        self.locks.forget(pool_id);
        Ok(outcome.into_report(pool_id, amount_returned))
    }

    /// Reattempt pending refunds: balances of a force-cancelled pool, or
    /// tokens of a deposit that was never recorded.
    pub async fn retry_pending_refunds(
        &self,
        pool_id: PoolId,
        caller: &Address,
    ) -> Result<EmergencyReport, EngineError> {
        let _guard = self.locks.acquire(pool_id).await;
        let pool = self.get_pool(pool_id).await?;
        let config = self.registry.config().await?;
        if !config.is_admin(caller) {
            return Err(EngineError::Unauthorized);
        }

        let outcome = self.release_refunds(pool_id, &pool.token).await?;
        let amount_returned = outcome.amount;

        info!(
            pool_id = %pool_id,
            released = outcome.released.len(),
            pending = outcome.pending.len(),
            "pending refunds retried"
        );
        Ok(outcome.into_report(pool_id, amount_returned))
    }

    /// Claim the pool's pending refunds and release them concurrently.
    async fn release_refunds(
        &self,
        pool_id: PoolId,
        token: &Address,
    ) -> Result<ReleaseOutcome, EngineError> {
        let claimed = self.repo.claim_pending_refunds(pool_id).await?;
        let amount: Amount = claimed.iter().map(|r| r.amount).sum();

        let attempts = claimed.iter().map(|row| async move {
            let result = self.custody.release(token, &row.depositor, row.amount).await;
            (row, result)
        });

        let mut released: Vec<&RefundRow> = Vec::new();
        let mut failed: Vec<&RefundRow> = Vec::new();
        for (row, result) in join_all(attempts).await {
            match result {
                Ok(()) => released.push(row),
                Err(e) => {
                    error!(
                        pool_id = %row.pool_id,
                        depositor = %row.depositor,
                        amount = %row.amount,
                        error = %e,
                        "refund release failed, left pending"
                    );
                    failed.push(row);
                }
            }
        }

        let released_ids: Vec<i64> = released.iter().map(|r| r.id).collect();
        let failed_ids: Vec<i64> = failed.iter().map(|r| r.id).collect();
        if let Err(e) = self.repo.settle_refunds(&released_ids, &failed_ids).await {
            error!(
                pool_id = %pool_id,
                released = released_ids.len(),
                failed = failed_ids.len(),
                error = %e,
                "could not record refund outcomes, rows left in flight"
            );
            return Ok(ReleaseOutcome {
                amount,
                released: Vec::new(),
                pending: Vec::new(),
                unrecorded: claimed.iter().map(|r| r.depositor.clone()).collect(),
            });
        }

        Ok(ReleaseOutcome {
            amount,
            released: released.iter().map(|r| r.depositor.clone()).collect(),
            pending: failed.iter().map(|r| r.depositor.clone()).collect(),
            unrecorded: Vec::new(),
        })
    }
}

struct ReleaseOutcome {
    amount: Amount,
    released: Vec<Address>,
    pending: Vec<Address>,
    unrecorded: Vec<Address>,
}

impl ReleaseOutcome {
    fn into_report(self, pool_id: PoolId, amount_returned: Amount) -> EmergencyReport {
        EmergencyReport {
            pool_id,
            amount_returned,
            released: self.released,
            pending: self.pending,
            unrecorded: self.unrecorded,
        }
    }
}
