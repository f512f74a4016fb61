//! Deposit accounting for a single pool.

use crate::domain::{Address, Amount, Pool, PoolId, Timestamp};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A depositor's position in a pool, as exposed to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDeposit {
    pub pool_id: PoolId,
    pub amount: Amount,
}

/// Result of admitting one deposit into a [`PoolBook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositOutcome {
    pub new_balance: Amount,
    pub new_total: Amount,
    pub first_deposit: bool,
    /// Zero-based position of the depositor in first-deposit order.
    pub seq: u32,
}

/// A pool together with its depositor sequence and balances.
///
/// The book is the unit the ledger loads, mutates, and commits. It upholds
/// `total_deposited == sum(balances)` and `depositors.len() == balances.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolBook {
    pub pool: Pool,
    depositors: Vec<Address>,
    balances: HashMap<Address, Amount>,
}

impl PoolBook {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            depositors: Vec::new(),
            balances: HashMap::new(),
        }
    }

    /// Rebuild a book from stored rows, ordered by first deposit.
    pub fn from_entries(pool: Pool, entries: Vec<(Address, Amount)>) -> Self {
        let mut depositors = Vec::with_capacity(entries.len());
        let mut balances = HashMap::with_capacity(entries.len());
        for (depositor, amount) in entries {
            if amount.is_zero() || balances.contains_key(&depositor) {
                continue;
            }
            depositors.push(depositor.clone());
            balances.insert(depositor, amount);
        }
        Self {
            pool,
            depositors,
            balances,
        }
    }

    pub fn depositors(&self) -> &[Address] {
        &self.depositors
    }

    pub fn balance_of(&self, depositor: &Address) -> Amount {
        self.balances.get(depositor).copied().unwrap_or_default()
    }

    /// Depositors paired with their balances, in first-deposit order.
    pub fn entries(&self) -> Vec<(Address, Amount)> {
        self.depositors
            .iter()
            .map(|d| (d.clone(), self.balance_of(d)))
            .collect()
    }

    /// Admit a deposit. Leaves the book untouched on error.
    pub fn record_deposit(
        &mut self,
        depositor: &Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<DepositOutcome, EngineError> {
        self.pool.ensure_accepting_deposits(now)?;
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }

        let current = self.balance_of(depositor);
        let new_balance = current
            .checked_add(amount)
            .ok_or(EngineError::AmountOverflow)?;
        let new_total = self
            .pool
            .total_deposited
            .checked_add(amount)
            .ok_or(EngineError::AmountOverflow)?;

        let first_deposit = !self.balances.contains_key(depositor);
        let seq = if first_deposit {
            self.depositors.push(depositor.clone());
            (self.depositors.len() - 1) as u32
        } else {
            self.depositors
                .iter()
                .position(|d| d == depositor)
                .unwrap_or_default() as u32
        };
        self.balances.insert(depositor.clone(), new_balance);
        self.pool.total_deposited = new_total;

        Ok(DepositOutcome {
            new_balance,
            new_total,
            first_deposit,
            seq,
        })
    }

    /// Check the accounting invariants of this book.
    pub fn is_consistent(&self) -> bool {
        let sum: Amount = self.balances.values().copied().sum();
        let non_zero = self.balances.values().filter(|a| !a.is_zero()).count();
        sum == self.pool.total_deposited
            && non_zero == self.depositors.len()
            && self.depositors.is_empty() == self.pool.total_deposited.is_zero()
            && (self.pool.winners.is_empty() || self.pool.finalized)
            && !(self.pool.finalized && self.pool.cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn addr(n: u8) -> Address {
        Address::from_str(&format!("0x{}", hex::encode([n; 20]))).unwrap()
    }

    fn book() -> PoolBook {
        PoolBook::new(Pool::new(
            PoolId::new(1),
            addr(1),
            addr(9),
            Timestamp::new(0),
            Timestamp::new(3600),
        ))
    }

    #[test]
    fn test_first_deposit_appends_depositor() {
        let mut b = book();
        let outcome = b
            .record_deposit(&addr(2), Amount::new(500), Timestamp::new(10))
            .unwrap();
        assert!(outcome.first_deposit);
        assert_eq!(outcome.seq, 0);
        assert_eq!(b.depositors(), &[addr(2)]);
        assert_eq!(b.pool.total_deposited, Amount::new(500));
        assert!(b.is_consistent());
    }

    #[test]
    fn test_repeat_deposit_accumulates_without_duplicate() {
        let mut b = book();
        b.record_deposit(&addr(2), Amount::new(500), Timestamp::new(10))
            .unwrap();
        b.record_deposit(&addr(3), Amount::new(300), Timestamp::new(11))
            .unwrap();
        let outcome = b
            .record_deposit(&addr(2), Amount::new(100), Timestamp::new(12))
            .unwrap();

        assert!(!outcome.first_deposit);
        assert_eq!(outcome.seq, 0);
        assert_eq!(outcome.new_balance, Amount::new(600));
        assert_eq!(b.depositors(), &[addr(2), addr(3)]);
        assert_eq!(b.pool.total_deposited, Amount::new(900));
        assert!(b.is_consistent());
    }

    #[test]
    fn test_zero_amount_rejected_without_mutation() {
        let mut b = book();
        let before = b.clone();
        let err = b
            .record_deposit(&addr(2), Amount::ZERO, Timestamp::new(10))
            .unwrap_err();
        assert!(matches!(err, EngineError::ZeroAmount));
        assert_eq!(b, before);
    }

    #[test]
    fn test_overflow_rejected_without_mutation() {
        let mut b = book();
        b.record_deposit(&addr(2), Amount::new(u128::MAX), Timestamp::new(10))
            .unwrap();
        let before = b.clone();
        let err = b
            .record_deposit(&addr(3), Amount::new(1), Timestamp::new(11))
            .unwrap_err();
        assert!(matches!(err, EngineError::AmountOverflow));
        assert_eq!(b, before);
    }

    #[test]
    fn test_from_entries_skips_zero_and_duplicates() {
        let pool = book().pool;
        let b = PoolBook::from_entries(
            pool,
            vec![
                (addr(2), Amount::new(5)),
                (addr(3), Amount::ZERO),
                (addr(2), Amount::new(7)),
            ],
        );
        assert_eq!(b.depositors(), &[addr(2)]);
        assert_eq!(b.balance_of(&addr(2)), Amount::new(5));
        assert_eq!(b.balance_of(&addr(4)), Amount::ZERO);
    }
}
