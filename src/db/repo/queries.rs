//! Read-only accessors backing the query surface.
//!
//! None of these fail for identities or pools without history; they return
//! empty collections or zero instead.

use super::{address_col, amount_col, decode_err, Repository};
use crate::domain::{Address, Amount, EngineEvent, PoolId, UserDeposit};
use sqlx::Row;

impl Repository {
    /// Winners of a pool in draw order.
    pub async fn get_pool_winners(&self, pool_id: PoolId) -> Result<Vec<Address>, sqlx::Error> {
        let rows = sqlx::query("SELECT winner FROM winners WHERE pool_id = ? ORDER BY rank ASC")
            .bind(pool_id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| address_col(r, "winner")).collect()
    }

    /// Payout pushed to each winner, in draw order.
    pub async fn get_winner_payouts(
        &self,
        pool_id: PoolId,
    ) -> Result<Vec<(Address, Amount)>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT winner, payout FROM winners WHERE pool_id = ? ORDER BY rank ASC",
        )
        .bind(pool_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| Ok((address_col(r, "winner")?, amount_col(r, "payout")?)))
            .collect()
    }

    /// Depositors of a pool in first-deposit order.
    pub async fn get_pool_depositors(
        &self,
        pool_id: PoolId,
    ) -> Result<Vec<Address>, sqlx::Error> {
        let rows =
            sqlx::query("SELECT depositor FROM deposits WHERE pool_id = ? ORDER BY seq ASC")
                .bind(pool_id.as_i64())
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(|r| address_col(r, "depositor")).collect()
    }

    /// Cumulative amount `user` deposited into a pool; zero if none.
    pub async fn get_user_deposit(
        &self,
        pool_id: PoolId,
        user: &Address,
    ) -> Result<Amount, sqlx::Error> {
        let row = sqlx::query("SELECT amount FROM deposits WHERE pool_id = ? AND depositor = ?")
            .bind(pool_id.as_i64())
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => amount_col(&r, "amount"),
            None => Ok(Amount::ZERO),
        }
    }

    /// Pools `user` created or deposited into, ascending and distinct.
    pub async fn get_user_pools(&self, user: &Address) -> Result<Vec<PoolId>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id AS pool_id FROM pools WHERE creator = ?
            UNION
            SELECT pool_id FROM deposits WHERE depositor = ?
            ORDER BY pool_id ASC
            "#,
        )
        .bind(user.as_str())
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| PoolId::new(r.get::<i64, _>("pool_id") as u64))
            .collect())
    }

    /// Every pool `user` deposited into, with the cumulative amount.
    pub async fn get_user_deposits(
        &self,
        user: &Address,
    ) -> Result<Vec<UserDeposit>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT pool_id, amount FROM deposits WHERE depositor = ? ORDER BY pool_id ASC",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(UserDeposit {
                    pool_id: PoolId::new(r.get::<i64, _>("pool_id") as u64),
                    amount: amount_col(r, "amount")?,
                })
            })
            .collect()
    }

    /// Events in commit order, optionally restricted to one pool.
    pub async fn query_events(
        &self,
        pool_id: Option<PoolId>,
    ) -> Result<Vec<EngineEvent>, sqlx::Error> {
        let rows = match pool_id {
            Some(id) => {
                sqlx::query("SELECT payload FROM events WHERE pool_id = ? ORDER BY id ASC")
                    .bind(id.as_i64())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT payload FROM events ORDER BY id ASC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter()
            .map(|r| {
                let payload: String = r.get("payload");
                serde_json::from_str(&payload).map_err(decode_err)
            })
            .collect()
    }
}
