use deadpool_engine::db::{init_db, RefundStatus};
use deadpool_engine::domain::{Address, Amount, EngineEvent, PoolStatus, Timestamp};
use deadpool_engine::engine::ManualClock;
use deadpool_engine::external::{MockCustody, MockExchange, MockPayouts, MockRandomness};
use deadpool_engine::{Collaborators, EngineError, LifecycleController, PoolPolicy, Registry};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;

fn addr(n: u8) -> Address {
    Address::from_str(&format!("0x{}", hex::encode([n; 20]))).unwrap()
}

const ADMIN: u8 = 1;
const TOKEN: u8 = 8;

struct TestEngine {
    ctl: LifecycleController,
    repo: Arc<deadpool_engine::Repository>,
    clock: Arc<ManualClock>,
    custody: Arc<MockCustody>,
    ledger: sqlx::SqlitePool,
    _temp: TempDir,
}

async fn setup() -> TestEngine {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let ledger = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(deadpool_engine::Repository::new(ledger.clone()));
    let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
    let registry = Arc::new(
        Registry::configure(repo.clone(), clock.clone(), addr(ADMIN), None, addr(3), 1000)
            .await
            .unwrap(),
    );
    let custody = Arc::new(MockCustody::new());
    let collaborators = Collaborators {
        exchange: Arc::new(MockExchange::new()),
        payouts: Arc::new(MockPayouts::new()),
        custody: custody.clone(),
        randomness: Arc::new(MockRandomness::default()),
    };
    let ctl = LifecycleController::new(
        repo.clone(),
        registry,
        collaborators,
        clock.clone(),
        PoolPolicy::default(),
    );
    TestEngine {
        ctl,
        repo,
        clock,
        custody,
        ledger,
        _temp: temp_dir,
    }
}

#[tokio::test]
async fn admin_recovers_funded_pool() {
    let t = setup().await;
    let a = addr(10);
    let b = addr(11);
    let pool = t.ctl.create_pool(&addr(7), &addr(TOKEN), 3600).await.unwrap();
    t.ctl.deposit(pool.id, &a, Amount::new(40)).await.unwrap();
    t.ctl.deposit(pool.id, &b, Amount::new(60)).await.unwrap();
    t.ctl.deposit(pool.id, &a, Amount::new(10)).await.unwrap();

    let report = t.ctl.emergency_withdraw(pool.id, &addr(ADMIN)).await.unwrap();
    assert_eq!(report.amount_returned, Amount::new(110));
    assert_eq!(report.released.len(), 2);
    assert!(report.pending.is_empty());

    assert_eq!(t.custody.released_to(&a), Amount::new(50));
    assert_eq!(t.custody.released_to(&b), Amount::new(60));

    let stored = t.ctl.get_pool(pool.id).await.unwrap();
    assert_eq!(stored.status(), PoolStatus::Cancelled);
    assert!(t
        .repo
        .get_refunds(pool.id)
        .await
        .unwrap()
        .iter()
        .all(|r| r.status == RefundStatus::Released));

    let events = t.repo.query_events(Some(pool.id)).await.unwrap();
    assert_eq!(
        events.last(),
        Some(&EngineEvent::EmergencyWithdraw {
            pool_id: pool.id,
            admin: addr(ADMIN),
            amount_returned: Amount::new(110),
        })
    );
}

#[tokio::test]
async fn emergency_ignores_deadline() {
    let t = setup().await;
    let pool = t.ctl.create_pool(&addr(7), &addr(TOKEN), 3600).await.unwrap();
    t.ctl.deposit(pool.id, &addr(10), Amount::new(5)).await.unwrap();
    t.clock.set(Timestamp::new(100_000));

    let report = t.ctl.emergency_withdraw(pool.id, &addr(ADMIN)).await.unwrap();
    assert_eq!(report.amount_returned, Amount::new(5));
    assert!(matches!(
        t.ctl.finalize_pool(pool.id, &addr(10)).await,
        Err(EngineError::AlreadyClosed(_))
    ));
}

#[tokio::test]
async fn non_admin_cannot_force_cancel() {
    let t = setup().await;
    let pool = t.ctl.create_pool(&addr(7), &addr(TOKEN), 3600).await.unwrap();
    t.ctl.deposit(pool.id, &addr(10), Amount::new(5)).await.unwrap();

    assert!(matches!(
        t.ctl.emergency_withdraw(pool.id, &addr(7)).await,
        Err(EngineError::Unauthorized)
    ));
    let stored = t.ctl.get_pool(pool.id).await.unwrap();
    assert_eq!(stored.status(), PoolStatus::Open);
    assert!(t.repo.get_refunds(pool.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_release_stays_pending_until_retried() {
    let t = setup().await;
    let a = addr(10);
    let b = addr(11);
    let pool = t.ctl.create_pool(&addr(7), &addr(TOKEN), 3600).await.unwrap();
    t.ctl.deposit(pool.id, &a, Amount::new(1)).await.unwrap();
    t.ctl.deposit(pool.id, &b, Amount::new(2)).await.unwrap();
    t.custody.fail_release_to(&b);

    let report = t.ctl.emergency_withdraw(pool.id, &addr(ADMIN)).await.unwrap();
    assert_eq!(report.released, vec![a.clone()]);
    assert_eq!(report.pending, vec![b.clone()]);
    // The pool is cancelled even though one refund is outstanding.
    assert!(t.ctl.get_pool(pool.id).await.unwrap().cancelled);

    assert!(matches!(
        t.ctl.retry_pending_refunds(pool.id, &a).await,
        Err(EngineError::Unauthorized)
    ));

    t.custody.clear_failures();
    let retry = t.ctl.retry_pending_refunds(pool.id, &addr(ADMIN)).await.unwrap();
    assert_eq!(retry.released, vec![b.clone()]);
    assert_eq!(retry.amount_returned, Amount::new(2));
    assert!(retry.pending.is_empty());

    assert_eq!(t.custody.released_to(&a), Amount::new(1));
    assert_eq!(t.custody.released_to(&b), Amount::new(2));

    let again = t.ctl.retry_pending_refunds(pool.id, &addr(ADMIN)).await.unwrap();
    assert!(again.released.is_empty());
    assert_eq!(again.amount_returned, Amount::ZERO);
}

#[tokio::test]
async fn empty_pool_emergency_returns_nothing() {
    let t = setup().await;
    let pool = t.ctl.create_pool(&addr(7), &addr(TOKEN), 3600).await.unwrap();

    let report = t.ctl.emergency_withdraw(pool.id, &addr(ADMIN)).await.unwrap();
    assert_eq!(report.amount_returned, Amount::ZERO);
    assert!(report.released.is_empty());
    assert!(t.ctl.get_pool(pool.id).await.unwrap().cancelled);
}

#[tokio::test]
async fn unrecorded_releases_are_not_repeated() {
    let t = setup().await;
    let a = addr(10);
    let b = addr(11);
    let pool = t.ctl.create_pool(&addr(7), &addr(TOKEN), 3600).await.unwrap();
    t.ctl.deposit(pool.id, &a, Amount::new(3)).await.unwrap();
    t.ctl.deposit(pool.id, &b, Amount::new(4)).await.unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_released BEFORE UPDATE OF status ON refunds \
         WHEN NEW.status = 'released' BEGIN SELECT RAISE(ABORT, 'ledger unavailable'); END",
    )
    .execute(&t.ledger)
    .await
    .unwrap();

    let report = t.ctl.emergency_withdraw(pool.id, &addr(ADMIN)).await.unwrap();
    assert!(report.released.is_empty());
    assert_eq!(report.unrecorded, vec![a.clone(), b.clone()]);
    assert_eq!(t.custody.released_to(&a), Amount::new(3));
    assert_eq!(t.custody.released_to(&b), Amount::new(4));
    assert!(t
        .repo
        .get_refunds(pool.id)
        .await
        .unwrap()
        .iter()
        .all(|r| r.status == RefundStatus::InFlight));

    sqlx::query("DROP TRIGGER reject_released")
        .execute(&t.ledger)
        .await
        .unwrap();
    let retry = t.ctl.retry_pending_refunds(pool.id, &addr(ADMIN)).await.unwrap();
    assert!(retry.released.is_empty());
    assert_eq!(retry.amount_returned, Amount::ZERO);
    assert_eq!(t.custody.released_to(&a), Amount::new(3));
    assert_eq!(t.custody.released_to(&b), Amount::new(4));
}
