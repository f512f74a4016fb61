//! Repository layer for the pool ledger.
//!
//! Reads return domain types; every `commit_*` method applies one engine
//! operation in a single transaction together with its event row. Commits are
//! serialized through a write gate so SQLite never sees competing writers.

mod queries;

use crate::domain::{
    Address, Amount, DepositOutcome, EngineEvent, GlobalConfig, Pool, PoolBook, PoolId, Timestamp,
};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::debug;

/// Refund state for tokens owed back to a depositor.
///
/// A row is claimed as `InFlight` before custody is asked to release it and
/// only settles to `Released` or back to `Pending` afterwards, so a row whose
/// outcome was never recorded is not released a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundStatus {
    Pending,
    InFlight,
    Released,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::InFlight => "in_flight",
            RefundStatus::Released => "released",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "released" => RefundStatus::Released,
            "in_flight" => RefundStatus::InFlight,
            _ => RefundStatus::Pending,
        }
    }
}

/// Why tokens are owed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundReason {
    /// Balance of a force-cancelled pool.
    Emergency,
    /// Tokens pulled for a deposit that was never recorded and could not be
    /// returned at the time.
    FailedDeposit,
}

impl RefundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundReason::Emergency => "emergency",
            RefundReason::FailedDeposit => "failed_deposit",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "failed_deposit" => RefundReason::FailedDeposit,
            _ => RefundReason::Emergency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRow {
    pub id: i64,
    pub pool_id: PoolId,
    pub depositor: Address,
    pub amount: Amount,
    pub reason: RefundReason,
    pub status: RefundStatus,
}

/// Repository for ledger persistence.
pub struct Repository {
    pool: SqlitePool,
    write_gate: Mutex<()>,
}

pub(crate) fn decode_err<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

pub(crate) fn amount_col(row: &SqliteRow, col: &str) -> Result<Amount, sqlx::Error> {
    let raw: String = row.get(col);
    Amount::from_str(&raw).map_err(decode_err)
}

pub(crate) fn address_col(row: &SqliteRow, col: &str) -> Result<Address, sqlx::Error> {
    let raw: String = row.get(col);
    Address::from_str(&raw).map_err(decode_err)
}

fn pool_from_row(row: &SqliteRow, winners: Vec<Address>) -> Result<Pool, sqlx::Error> {
    let id: i64 = row.get("id");
    let fee_bps: Option<i64> = row.get("platform_fee_bps_snapshot");
    Ok(Pool {
        id: PoolId::new(id as u64),
        creator: address_col(row, "creator")?,
        token: address_col(row, "token")?,
        created_at: Timestamp::new(row.get("created_at")),
        deadline: Timestamp::new(row.get("deadline")),
        total_deposited: amount_col(row, "total_deposited")?,
        total_reward_received: amount_col(row, "total_reward_received")?,
        winners,
        finalized: row.get::<i64, _>("finalized") != 0,
        cancelled: row.get::<i64, _>("cancelled") != 0,
        platform_fee_bps_snapshot: fee_bps.map(|v| v as u16),
        fee_amount: amount_col(row, "fee_amount")?,
        payout_per_winner: amount_col(row, "payout_per_winner")?,
        retained_remainder: amount_col(row, "retained_remainder")?,
        winner_seed: row.get("winner_seed"),
        seed_provenance: row.get("seed_provenance"),
    })
}

async fn insert_event(
    conn: &mut SqliteConnection,
    event: &EngineEvent,
    now: Timestamp,
) -> Result<(), sqlx::Error> {
    let payload =
        serde_json::to_string(event).map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    sqlx::query("INSERT INTO events (pool_id, kind, payload, time) VALUES (?, ?, ?, ?)")
        .bind(event.pool_id().map(|id| id.as_i64()))
        .bind(event.kind())
        .bind(payload)
        .bind(now.as_secs())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").finish_non_exhaustive()
    }
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository {
            pool,
            write_gate: Mutex::new(()),
        }
    }

    // =========================================================================
    // Global configuration
    // =========================================================================

    pub async fn get_config(&self) -> Result<Option<GlobalConfig>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT admin, treasury, exchange, platform_fee_bps, next_pool_id FROM global_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let fee: i64 = r.get("platform_fee_bps");
            let next: i64 = r.get("next_pool_id");
            Ok(GlobalConfig {
                admin: address_col(&r, "admin")?,
                treasury: address_col(&r, "treasury")?,
                exchange: address_col(&r, "exchange")?,
                platform_fee_bps: fee as u16,
                next_pool_id: PoolId::new(next as u64),
            })
        })
        .transpose()
    }

    /// Store `config` unless a configuration already exists; returns the
    /// configuration in effect.
    pub async fn init_config(&self, config: &GlobalConfig) -> Result<GlobalConfig, sqlx::Error> {
        {
            let _gate = self.write_gate.lock().await;
            sqlx::query(
                r#"
                INSERT INTO global_config (id, admin, treasury, exchange, platform_fee_bps, next_pool_id)
                VALUES (1, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(config.admin.as_str())
            .bind(config.treasury.as_str())
            .bind(config.exchange.as_str())
            .bind(config.platform_fee_bps as i64)
            .bind(config.next_pool_id.as_i64())
            .execute(&self.pool)
            .await?;
        }

        self.get_config().await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Persist administrator-controlled fields and the change event.
    pub async fn commit_config_change(
        &self,
        config: &GlobalConfig,
        event: &EngineEvent,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE global_config SET treasury = ?, exchange = ?, platform_fee_bps = ? WHERE id = 1",
        )
        .bind(config.treasury.as_str())
        .bind(config.exchange.as_str())
        .bind(config.platform_fee_bps as i64)
        .execute(&mut *tx)
        .await?;
        insert_event(&mut tx, event, now).await?;

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Pools
    // =========================================================================

    /// Assign the next identifier and store an empty pool under it.
    ///
    /// Returns `None` when no global configuration exists. The counter
    /// increment and the insert share one transaction, so identifiers stay
    /// gapless.
    pub async fn commit_pool_creation(
        &self,
        creator: &Address,
        token: &Address,
        created_at: Timestamp,
        duration_secs: u64,
    ) -> Result<Option<Pool>, sqlx::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "UPDATE global_config SET next_pool_id = next_pool_id + 1 WHERE id = 1 RETURNING next_pool_id - 1 AS assigned",
        )
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let assigned: i64 = row.get("assigned");

        let pool = Pool::new(
            PoolId::new(assigned as u64),
            creator.clone(),
            token.clone(),
            created_at,
            created_at.saturating_add_secs(duration_secs),
        );

        sqlx::query(
            "INSERT INTO pools (id, creator, token, created_at, deadline) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(pool.id.as_i64())
        .bind(pool.creator.as_str())
        .bind(pool.token.as_str())
        .bind(pool.created_at.as_secs())
        .bind(pool.deadline.as_secs())
        .execute(&mut *tx)
        .await?;

        let event = EngineEvent::PoolCreated {
            pool_id: pool.id,
            creator: pool.creator.clone(),
            token: pool.token.clone(),
            deadline: pool.deadline,
        };
        insert_event(&mut tx, &event, created_at).await?;

        tx.commit().await?;
        debug!(pool_id = %pool.id, "pool row inserted");
        Ok(Some(pool))
    }

    pub async fn get_pool(&self, id: PoolId) -> Result<Option<Pool>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM pools WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let winners = self.get_pool_winners(id).await?;
        pool_from_row(&row, winners).map(Some)
    }

    /// Load a pool with its depositors in first-deposit order.
    pub async fn load_book(&self, id: PoolId) -> Result<Option<PoolBook>, sqlx::Error> {
        let Some(pool) = self.get_pool(id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT depositor, amount FROM deposits WHERE pool_id = ? ORDER BY seq ASC",
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .iter()
            .map(|r| Ok((address_col(r, "depositor")?, amount_col(r, "amount")?)))
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(Some(PoolBook::from_entries(pool, entries)))
    }

    /// Persist one admitted deposit: the depositor row and the pool total.
    pub async fn commit_deposit(
        &self,
        pool_id: PoolId,
        depositor: &Address,
        outcome: &DepositOutcome,
        event: &EngineEvent,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO deposits (pool_id, depositor, seq, amount)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(pool_id, depositor) DO UPDATE SET amount = excluded.amount
            "#,
        )
        .bind(pool_id.as_i64())
        .bind(depositor.as_str())
        .bind(outcome.seq as i64)
        .bind(outcome.new_balance.to_canonical_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE pools SET total_deposited = ? WHERE id = ?")
            .bind(outcome.new_total.to_canonical_string())
            .bind(pool_id.as_i64())
            .execute(&mut *tx)
            .await?;

        insert_event(&mut tx, event, now).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Mark an open pool cancelled. Returns false if it was already terminal.
    pub async fn commit_cancellation(
        &self,
        pool_id: PoolId,
        event: &EngineEvent,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE pools SET cancelled = 1 WHERE id = ? AND finalized = 0 AND cancelled = 0",
        )
        .bind(pool_id.as_i64())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != 1 {
            return Ok(false);
        }

        insert_event(&mut tx, event, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Store settlement results for a pool and flip it to finalized.
    ///
    /// `pool` must carry the settlement fields; `payouts` lists each winner
    /// with the amount pushed to them, in draw order.
    pub async fn commit_finalization(
        &self,
        pool: &Pool,
        payouts: &[(Address, Amount)],
        event: &EngineEvent,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE pools SET
                finalized = 1,
                total_reward_received = ?,
                platform_fee_bps_snapshot = ?,
                fee_amount = ?,
                payout_per_winner = ?,
                retained_remainder = ?,
                winner_seed = ?,
                seed_provenance = ?
            WHERE id = ? AND finalized = 0 AND cancelled = 0
            "#,
        )
        .bind(pool.total_reward_received.to_canonical_string())
        .bind(pool.platform_fee_bps_snapshot.map(|v| v as i64))
        .bind(pool.fee_amount.to_canonical_string())
        .bind(pool.payout_per_winner.to_canonical_string())
        .bind(pool.retained_remainder.to_canonical_string())
        .bind(pool.winner_seed.as_deref())
        .bind(pool.seed_provenance.as_deref())
        .bind(pool.id.as_i64())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != 1 {
            return Ok(false);
        }

        for (rank, (winner, payout)) in payouts.iter().enumerate() {
            sqlx::query("INSERT INTO winners (pool_id, rank, winner, payout) VALUES (?, ?, ?, ?)")
                .bind(pool.id.as_i64())
                .bind(rank as i64)
                .bind(winner.as_str())
                .bind(payout.to_canonical_string())
                .execute(&mut *tx)
                .await?;
        }

        insert_event(&mut tx, event, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Force-cancel a pool and schedule one pending refund per depositor.
    pub async fn commit_emergency(
        &self,
        pool_id: PoolId,
        refunds: &[(Address, Amount)],
        event: &EngineEvent,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE pools SET cancelled = 1 WHERE id = ? AND finalized = 0 AND cancelled = 0",
        )
        .bind(pool_id.as_i64())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != 1 {
            return Ok(false);
        }

        for (depositor, amount) in refunds {
            insert_refund(&mut tx, pool_id, depositor, *amount, RefundReason::Emergency).await?;
        }

        insert_event(&mut tx, event, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Record tokens owed to `depositor` outside any pool transition.
    pub async fn record_refund(
        &self,
        pool_id: PoolId,
        depositor: &Address,
        amount: Amount,
        reason: RefundReason,
    ) -> Result<(), sqlx::Error> {
        let _gate = self.write_gate.lock().await;
        let mut conn = self.pool.acquire().await?;
        insert_refund(&mut conn, pool_id, depositor, amount, reason).await
    }

    /// Move the pending refunds of a pool to `InFlight` and return them.
    ///
    /// Only rows this call moved are returned, so two concurrent claimers
    /// never release the same refund.
    pub async fn claim_pending_refunds(
        &self,
        pool_id: PoolId,
    ) -> Result<Vec<RefundRow>, sqlx::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "UPDATE refunds SET status = ? WHERE pool_id = ? AND status = ? \
             RETURNING id, pool_id, depositor, amount, reason, status",
        )
        .bind(RefundStatus::InFlight.as_str())
        .bind(pool_id.as_i64())
        .bind(RefundStatus::Pending.as_str())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut claimed = rows
            .iter()
            .map(refund_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        claimed.sort_by_key(|r| r.id);
        debug!(pool_id = %pool_id, claimed = claimed.len(), "refunds claimed");
        Ok(claimed)
    }

    /// Record the outcome of claimed refunds in one transaction: `released`
    /// rows become `Released`, `failed` rows return to `Pending`.
    pub async fn settle_refunds(&self, released: &[i64], failed: &[i64]) -> Result<(), sqlx::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;
        for (ids, status) in [
            (released, RefundStatus::Released),
            (failed, RefundStatus::Pending),
        ] {
            for id in ids {
                sqlx::query("UPDATE refunds SET status = ? WHERE id = ? AND status = ?")
                    .bind(status.as_str())
                    .bind(*id)
                    .bind(RefundStatus::InFlight.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_refunds(&self, pool_id: PoolId) -> Result<Vec<RefundRow>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, pool_id, depositor, amount, reason, status FROM refunds \
             WHERE pool_id = ? ORDER BY id ASC",
        )
        .bind(pool_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(refund_from_row).collect()
    }
}

async fn insert_refund(
    conn: &mut SqliteConnection,
    pool_id: PoolId,
    depositor: &Address,
    amount: Amount,
    reason: RefundReason,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO refunds (pool_id, depositor, amount, reason, status) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(pool_id.as_i64())
    .bind(depositor.as_str())
    .bind(amount.to_canonical_string())
    .bind(reason.as_str())
    .bind(RefundStatus::Pending.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn refund_from_row(row: &SqliteRow) -> Result<RefundRow, sqlx::Error> {
    let reason: String = row.get("reason");
    let status: String = row.get("status");
    Ok(RefundRow {
        id: row.get("id"),
        pool_id: PoolId::new(row.get::<i64, _>("pool_id") as u64),
        depositor: address_col(row, "depositor")?,
        amount: amount_col(row, "amount")?,
        reason: RefundReason::parse(&reason),
        status: RefundStatus::parse(&status),
    })
}
