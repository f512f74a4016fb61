//! Settlement: swap, fee, winner draw, and payouts for a finalizing pool.

use crate::domain::{
    Address, Amount, GlobalConfig, PoolBook, BPS_DENOMINATOR, MAX_WINNERS,
};
use crate::error::EngineError;
use crate::external::{
    ExchangeService, PayoutService, RandomnessSource, Seed, SwapRequest, TransferReceipt,
    TransferRequest,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How a reward amount is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distribution {
    pub reward: Amount,
    pub fee_bps: u16,
    pub fee: Amount,
    pub distributable: Amount,
    pub payout_per_winner: Amount,
    /// Integer-division dust, kept by the platform.
    pub remainder: Amount,
}

impl Distribution {
    /// Total sent to the treasury: the fee plus undistributed dust.
    pub fn treasury_share(&self) -> Amount {
        Amount::new(self.fee.as_u128() + self.remainder.as_u128())
    }
}

/// `floor(reward * bps / 10_000)` without overflowing for any u128 reward.
pub fn compute_fee(reward: Amount, fee_bps: u16) -> Amount {
    let r = reward.as_u128();
    let bps = fee_bps as u128;
    let whole = (r / BPS_DENOMINATOR) * bps;
    let partial = (r % BPS_DENOMINATOR) * bps / BPS_DENOMINATOR;
    Amount::new(whole + partial)
}

pub fn compute_distribution(reward: Amount, fee_bps: u16, winner_count: usize) -> Distribution {
    let fee = compute_fee(reward, fee_bps);
    let distributable = reward.saturating_sub(fee);
    let (payout_per_winner, remainder) = if winner_count == 0 {
        (Amount::ZERO, distributable)
    } else {
        let n = winner_count as u128;
        (
            Amount::new(distributable.as_u128() / n),
            Amount::new(distributable.as_u128() % n),
        )
    };
    Distribution {
        reward,
        fee_bps,
        fee,
        distributable,
        payout_per_winner,
        remainder,
    }
}

/// Draw `min(MAX_WINNERS, n)` distinct depositors.
///
/// With at most `MAX_WINNERS` depositors everyone wins in deposit order.
/// Otherwise a partial Fisher-Yates shuffle is driven by
/// `sha256(seed || round)`, so the draw is reproducible from the seed.
pub fn select_winners(depositors: &[Address], seed: &[u8; 32]) -> Vec<Address> {
    if depositors.len() <= MAX_WINNERS {
        return depositors.to_vec();
    }

    let n = depositors.len();
    let mut indices: Vec<usize> = (0..n).collect();
    for round in 0..MAX_WINNERS {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update((round as u32).to_be_bytes());
        let digest = hasher.finalize();

        let mut word = [0u8; 16];
        word.copy_from_slice(&digest[..16]);
        let draw = u128::from_be_bytes(word);

        let span = (n - round) as u128;
        let j = round + (draw % span) as usize;
        indices.swap(round, j);
    }

    indices[..MAX_WINNERS]
        .iter()
        .map(|&i| depositors[i].clone())
        .collect()
}

/// Outcome of a successful settlement, not yet committed to the ledger.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub distribution: Distribution,
    pub winners: Vec<Address>,
    pub seed: Option<Seed>,
    pub receipts: Vec<TransferReceipt>,
}

impl Settlement {
    /// Winners paired with what each received.
    pub fn payouts(&self) -> Vec<(Address, Amount)> {
        self.winners
            .iter()
            .map(|w| (w.clone(), self.distribution.payout_per_winner))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SettlementEngine {
    exchange: Arc<dyn ExchangeService>,
    payouts: Arc<dyn PayoutService>,
    randomness: Arc<dyn RandomnessSource>,
    swap_timeout: Duration,
}

impl SettlementEngine {
    pub fn new(
        exchange: Arc<dyn ExchangeService>,
        payouts: Arc<dyn PayoutService>,
        randomness: Arc<dyn RandomnessSource>,
        swap_timeout: Duration,
    ) -> Self {
        Self {
            exchange,
            payouts,
            randomness,
            swap_timeout,
        }
    }

    /// Run settlement for `book` under `config`.
    ///
    /// On error no transfer survives: anything already pushed is reversed
    /// before returning. On success the caller owns the receipts and must call
    /// [`SettlementEngine::unwind`] if it cannot commit the result.
    pub async fn settle(
        &self,
        book: &PoolBook,
        config: &GlobalConfig,
    ) -> Result<Settlement, EngineError> {
        let pool = &book.pool;
        let fee_bps = config.platform_fee_bps;

        if pool.total_deposited.is_zero() {
            return Ok(Settlement {
                distribution: compute_distribution(Amount::ZERO, fee_bps, 0),
                winners: Vec::new(),
                seed: None,
                receipts: Vec::new(),
            });
        }

        let seed = if book.depositors().len() > MAX_WINNERS {
            let seed = self.randomness.seed(pool.id).await.map_err(|e| {
                warn!(pool_id = %pool.id, error = %e, "randomness unavailable");
                EngineError::SettlementFailed(format!("randomness: {}", e))
            })?;
            Some(seed)
        } else {
            None
        };

        let reward = self.swap(book, config).await?;
        let winners = match &seed {
            Some(seed) => select_winners(book.depositors(), &seed.bytes),
            None => book.depositors().to_vec(),
        };
        let distribution = compute_distribution(reward, fee_bps, winners.len());

        let mut transfers = Vec::with_capacity(winners.len() + 1);
        transfers.push(TransferRequest::treasury(
            pool.id,
            config.treasury.clone(),
            distribution.treasury_share(),
        ));
        for winner in &winners {
            transfers.push(TransferRequest::winner(
                pool.id,
                winner.clone(),
                distribution.payout_per_winner,
            ));
        }

        let mut receipts = Vec::with_capacity(transfers.len());
        for request in transfers {
            if request.amount.is_zero() {
                continue;
            }
            match self.payouts.transfer(&request).await {
                Ok(receipt) => receipts.push(receipt),
                Err(e) => {
                    warn!(
                        pool_id = %pool.id,
                        recipient = %request.recipient,
                        amount = %request.amount,
                        error = %e,
                        "payout failed, unwinding settlement"
                    );
                    let stranded = self.unwind(&receipts).await;
                    let mut reason = format!("payout to {}: {}", request.recipient, e);
                    if !stranded.is_empty() {
                        reason.push_str(&format!(
                            "; {} transfer(s) could not be reversed",
                            stranded.len()
                        ));
                    }
                    return Err(EngineError::SettlementFailed(reason));
                }
            }
        }

        info!(
            pool_id = %pool.id,
            reward = %distribution.reward,
            fee = %distribution.fee,
            payout_per_winner = %distribution.payout_per_winner,
            winners = winners.len(),
            "settlement executed"
        );

        Ok(Settlement {
            distribution,
            winners,
            seed,
            receipts,
        })
    }

    async fn swap(&self, book: &PoolBook, config: &GlobalConfig) -> Result<Amount, EngineError> {
        let request = SwapRequest {
            pool_id: book.pool.id,
            exchange: config.exchange.clone(),
            token: book.pool.token.clone(),
            amount: book.pool.total_deposited,
        };

        match tokio::time::timeout(self.swap_timeout, self.exchange.swap(&request)).await {
            Ok(Ok(reward)) => Ok(reward),
            Ok(Err(e)) => {
                warn!(pool_id = %book.pool.id, error = %e, "swap failed");
                Err(EngineError::SettlementFailed(format!("exchange: {}", e)))
            }
            Err(_) => {
                warn!(
                    pool_id = %book.pool.id,
                    timeout_ms = self.swap_timeout.as_millis() as u64,
                    "swap timed out"
                );
                Err(EngineError::SettlementFailed(format!(
                    "exchange timed out after {}ms",
                    self.swap_timeout.as_millis()
                )))
            }
        }
    }

    /// Reverse executed transfers, newest first.
    ///
    /// Returns the receipts that could not be reversed. Those transfers stay
    /// in effect, and their idempotency keys keep a retried settlement from
    /// paying the same recipients twice.
    pub async fn unwind(&self, receipts: &[TransferReceipt]) -> Vec<TransferReceipt> {
        let mut stranded = Vec::new();
        for receipt in receipts.iter().rev() {
            if let Err(e) = self.payouts.reverse(receipt).await {
                error!(
                    transfer_id = %receipt.id,
                    idempotency_key = %receipt.idempotency_key,
                    recipient = %receipt.recipient,
                    amount = %receipt.amount,
                    error = %e,
                    "failed to reverse transfer"
                );
                stranded.push(receipt.clone());
            }
        }
        stranded
    }
}
