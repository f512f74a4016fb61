//! In-memory collaborators for testing without network calls.

use super::{
    ExchangeService, ExternalError, PayoutService, RandomnessSource, Seed, SwapRequest,
    TokenCustody, TransferReceipt, TransferRequest,
};
use crate::domain::{Address, Amount, PoolId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Mock exchange that converts at a fixed rate, or fails on demand.
#[derive(Debug)]
pub struct MockExchange {
    /// Reward units per token unit, as (numerator, denominator).
    rate: (u128, u128),
    fixed_reward: Mutex<Option<Amount>>,
    fail_with: Mutex<Option<ExternalError>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<SwapRequest>>,
}

impl MockExchange {
    /// Exchange that returns exactly the swapped amount.
    pub fn new() -> Self {
        Self {
            rate: (1, 1),
            fixed_reward: Mutex::new(None),
            fail_with: Mutex::new(None),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rate(mut self, numerator: u128, denominator: u128) -> Self {
        self.rate = (numerator, denominator.max(1));
        self
    }

    /// Always return `reward`, regardless of the input amount.
    pub fn with_fixed_reward(self, reward: Amount) -> Self {
        *self.fixed_reward.lock().unwrap() = Some(reward);
        self
    }

    /// Sleep before answering, to exercise the settlement timeout.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_with(&self, err: Option<ExternalError>) {
        *self.fail_with.lock().unwrap() = err;
    }

    pub fn requests(&self) -> Vec<SwapRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeService for MockExchange {
    async fn swap(&self, request: &SwapRequest) -> Result<Amount, ExternalError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().unwrap().push(request.clone());
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(reward) = *self.fixed_reward.lock().unwrap() {
            return Ok(reward);
        }
        let (num, den) = self.rate;
        Ok(Amount::new(request.amount.as_u128() * num / den))
    }
}

/// Mock payout rail that records transfers and can refuse chosen recipients.
///
/// Honors idempotency keys: a transfer whose key matches one still in effect
/// returns the original receipt without paying again.
#[derive(Debug, Default)]
pub struct MockPayouts {
    next_id: AtomicU64,
    completed: Mutex<Vec<TransferReceipt>>,
    reversed: Mutex<Vec<TransferReceipt>>,
    failing_recipients: Mutex<HashSet<Address>>,
    refuse_reversals: AtomicBool,
}

impl MockPayouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every transfer to `recipient` fail.
    pub fn fail_for(&self, recipient: &Address) {
        self.failing_recipients
            .lock()
            .unwrap()
            .insert(recipient.clone());
    }

    /// Make every reversal fail until cleared.
    pub fn refuse_reversals(&self, refuse: bool) {
        self.refuse_reversals.store(refuse, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        self.failing_recipients.lock().unwrap().clear();
        self.refuse_reversals.store(false, Ordering::SeqCst);
    }

    /// Transfers that were made and not reversed.
    pub fn settled(&self) -> Vec<TransferReceipt> {
        let reversed = self.reversed.lock().unwrap();
        self.completed
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !reversed.iter().any(|x| x.id == r.id))
            .cloned()
            .collect()
    }

    pub fn reversed(&self) -> Vec<TransferReceipt> {
        self.reversed.lock().unwrap().clone()
    }

    /// Number of transfers actually executed, deduplicated requests excluded.
    pub fn executed(&self) -> usize {
        self.completed.lock().unwrap().len()
    }

    /// Net amount received by `recipient`.
    pub fn received_by(&self, recipient: &Address) -> Amount {
        self.settled()
            .into_iter()
            .filter(|r| &r.recipient == recipient)
            .map(|r| r.amount)
            .sum()
    }
}

#[async_trait]
impl PayoutService for MockPayouts {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, ExternalError> {
        if self
            .failing_recipients
            .lock()
            .unwrap()
            .contains(&request.recipient)
        {
            return Err(ExternalError::Rejected(format!(
                "recipient {} cannot receive",
                request.recipient
            )));
        }
        if let Some(live) = self
            .settled()
            .into_iter()
            .find(|r| r.idempotency_key == request.idempotency_key)
        {
            if live.recipient != request.recipient || live.amount != request.amount {
                return Err(ExternalError::Rejected(format!(
                    "idempotency key {} reused with different parameters",
                    request.idempotency_key
                )));
            }
            return Ok(live);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let receipt = TransferReceipt {
            id: format!("mock-{}", id),
            idempotency_key: request.idempotency_key.clone(),
            recipient: request.recipient.clone(),
            amount: request.amount,
        };
        self.completed.lock().unwrap().push(receipt.clone());
        Ok(receipt)
    }

    async fn reverse(&self, receipt: &TransferReceipt) -> Result<(), ExternalError> {
        if self.refuse_reversals.load(Ordering::SeqCst) {
            return Err(ExternalError::HttpError {
                status: 503,
                message: "payout rail unavailable".to_string(),
            });
        }
        self.reversed.lock().unwrap().push(receipt.clone());
        Ok(())
    }
}

/// Custody movements recorded by [`MockCustody`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustodyMove {
    Pull {
        token: Address,
        from: Address,
        amount: Amount,
    },
    Release {
        token: Address,
        to: Address,
        amount: Amount,
    },
}

/// Mock custody that records pulls and releases.
#[derive(Debug, Default)]
pub struct MockCustody {
    moves: Mutex<Vec<CustodyMove>>,
    refuse_pulls: Mutex<bool>,
    failing_releases: Mutex<HashSet<Address>>,
}

impl MockCustody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_pulls(&self, refuse: bool) {
        *self.refuse_pulls.lock().unwrap() = refuse;
    }

    pub fn fail_release_to(&self, to: &Address) {
        self.failing_releases.lock().unwrap().insert(to.clone());
    }

    pub fn clear_failures(&self) {
        self.failing_releases.lock().unwrap().clear();
        *self.refuse_pulls.lock().unwrap() = false;
    }

    pub fn moves(&self) -> Vec<CustodyMove> {
        self.moves.lock().unwrap().clone()
    }

    /// Total amount released to `to`.
    pub fn released_to(&self, to: &Address) -> Amount {
        self.moves()
            .into_iter()
            .filter_map(|m| match m {
                CustodyMove::Release { to: t, amount, .. } if &t == to => Some(amount),
                _ => None,
            })
            .sum()
    }
}

#[async_trait]
impl TokenCustody for MockCustody {
    async fn pull(
        &self,
        token: &Address,
        from: &Address,
        amount: Amount,
    ) -> Result<(), ExternalError> {
        if *self.refuse_pulls.lock().unwrap() {
            return Err(ExternalError::Rejected("allowance too low".to_string()));
        }
        self.moves.lock().unwrap().push(CustodyMove::Pull {
            token: token.clone(),
            from: from.clone(),
            amount,
        });
        Ok(())
    }

    async fn release(
        &self,
        token: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), ExternalError> {
        if self.failing_releases.lock().unwrap().contains(to) {
            return Err(ExternalError::Rejected(format!("release to {} refused", to)));
        }
        self.moves.lock().unwrap().push(CustodyMove::Release {
            token: token.clone(),
            to: to.clone(),
            amount,
        });
        Ok(())
    }
}

/// Deterministic randomness: a fixed seed per instance.
#[derive(Debug, Clone)]
pub struct MockRandomness {
    bytes: [u8; 32],
    fail: bool,
}

impl MockRandomness {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            bytes: [0; 32],
            fail: true,
        }
    }
}

impl Default for MockRandomness {
    fn default() -> Self {
        Self::new([42; 32])
    }
}

#[async_trait]
impl RandomnessSource for MockRandomness {
    async fn seed(&self, _pool_id: PoolId) -> Result<Seed, ExternalError> {
        if self.fail {
            return Err(ExternalError::NetworkError("beacon offline".to_string()));
        }
        Ok(Seed {
            bytes: self.bytes,
            provenance: "mock".to_string(),
        })
    }
}
