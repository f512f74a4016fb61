//! Schema setup for the pool ledger database.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Tables the engine expects to exist after [`init_db`].
pub const LEDGER_TABLES: [&str; 6] = [
    "global_config",
    "pools",
    "deposits",
    "winners",
    "refunds",
    "events",
];

/// Open (or create) the SQLite ledger at `db_path` and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { configure_pragmas_conn(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    apply_schema(&pool).await?;

    info!(path = %db_path, "pool ledger ready");
    Ok(pool)
}

/// Apply every statement of the schema. All statements are idempotent.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut applied = 0usize;
    for statement in SCHEMA_SQL.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
            applied += 1;
        }
    }

    info!(statements = applied, "schema applied");
    Ok(())
}

async fn configure_pragmas_conn(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // journal_mode returns the mode actually set
    sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = FULL")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fresh_db() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("ledger.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn test_schema_creates_ledger_tables() {
        let (pool, _temp) = fresh_db().await;

        for table in LEDGER_TABLES {
            let found: Option<(String,)> = sqlx::query_as(
                "SELECT name FROM sqlite_master WHERE type='table' AND name = ?",
            )
            .bind(table)
            .fetch_optional(&pool)
            .await
            .expect("query failed");
            assert!(found.is_some(), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let (pool, _temp) = fresh_db().await;
        apply_schema(&pool).await.expect("second apply failed");
    }

    #[tokio::test]
    async fn test_pool_cannot_be_both_finalized_and_cancelled() {
        let (pool, _temp) = fresh_db().await;

        let result = sqlx::query(
            "INSERT INTO pools (id, creator, token, created_at, deadline, finalized, cancelled)
             VALUES (1, '0x1', '0x2', 0, 3600, 1, 1)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let (pool, _temp) = fresh_db().await;

        let (enabled,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(enabled, 1);

        let orphan = sqlx::query(
            "INSERT INTO deposits (pool_id, depositor, seq, amount) VALUES (99, '0x1', 0, '5')",
        )
        .execute(&pool)
        .await;
        assert!(orphan.is_err());
    }
}
