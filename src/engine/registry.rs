//! Registry: global configuration and the pool identifier counter.

use super::Clock;
use crate::db::Repository;
use crate::domain::{Address, EngineEvent, GlobalConfig, PoolId, MAX_PLATFORM_FEE_BPS};
use crate::error::EngineError;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Owner of [`GlobalConfig`]. Configuration changes are administrator-only and
/// serialized; every change is persisted with an old/new event.
#[derive(Debug)]
pub struct Registry {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    writer: Mutex<()>,
}

impl Registry {
    /// Initialize the global configuration once. If a configuration is already
    /// stored, it is kept and the arguments are ignored.
    pub async fn configure(
        repo: Arc<Repository>,
        clock: Arc<dyn Clock>,
        admin: Address,
        treasury: Option<Address>,
        exchange: Address,
        fee_bps: u16,
    ) -> Result<Self, EngineError> {
        if admin.is_zero() || exchange.is_zero() || treasury.as_ref().is_some_and(Address::is_zero)
        {
            return Err(EngineError::InvalidAddress);
        }
        if fee_bps > MAX_PLATFORM_FEE_BPS {
            return Err(EngineError::FeeTooHigh(fee_bps));
        }

        let mut initial = GlobalConfig::new(admin, treasury, exchange);
        initial.platform_fee_bps = fee_bps;
        let effective = repo.init_config(&initial).await?;

        info!(
            admin = %effective.admin,
            treasury = %effective.treasury,
            exchange = %effective.exchange,
            fee_bps = effective.platform_fee_bps,
            next_pool_id = %effective.next_pool_id,
            "registry configured"
        );

        Ok(Self {
            repo,
            clock,
            writer: Mutex::new(()),
        })
    }

    pub async fn config(&self) -> Result<GlobalConfig, EngineError> {
        self.repo
            .get_config()
            .await?
            .ok_or(EngineError::NotConfigured)
    }

    /// Identifier the next created pool will receive. Assignment itself
    /// happens inside the creation commit so no identifier is ever skipped.
    pub async fn peek_next_identifier(&self) -> Result<PoolId, EngineError> {
        Ok(self.config().await?.next_pool_id)
    }

    pub async fn set_treasury(
        &self,
        caller: &Address,
        new_treasury: Address,
    ) -> Result<GlobalConfig, EngineError> {
        self.update(caller, |cfg| {
            if new_treasury.is_zero() {
                return Err(EngineError::InvalidAddress);
            }
            let old = std::mem::replace(&mut cfg.treasury, new_treasury.clone());
            Ok(EngineEvent::TreasuryUpdated {
                old,
                new: new_treasury.clone(),
            })
        })
        .await
    }

    pub async fn set_exchange_service(
        &self,
        caller: &Address,
        new_exchange: Address,
    ) -> Result<GlobalConfig, EngineError> {
        self.update(caller, |cfg| {
            if new_exchange.is_zero() {
                return Err(EngineError::InvalidAddress);
            }
            let old = std::mem::replace(&mut cfg.exchange, new_exchange.clone());
            Ok(EngineEvent::ExchangeUpdated {
                old,
                new: new_exchange.clone(),
            })
        })
        .await
    }

    pub async fn set_platform_fee_bps(
        &self,
        caller: &Address,
        new_rate: u16,
    ) -> Result<GlobalConfig, EngineError> {
        self.update(caller, |cfg| {
            if new_rate > MAX_PLATFORM_FEE_BPS {
                return Err(EngineError::FeeTooHigh(new_rate));
            }
            let old = std::mem::replace(&mut cfg.platform_fee_bps, new_rate);
            Ok(EngineEvent::PlatformFeeUpdated { old, new: new_rate })
        })
        .await
    }

    /// Apply an admin-only change. Authorization is checked before `apply`
    /// validates its input.
    async fn update<F>(&self, caller: &Address, apply: F) -> Result<GlobalConfig, EngineError>
    where
        F: FnOnce(&mut GlobalConfig) -> Result<EngineEvent, EngineError>,
    {
        let _writer = self.writer.lock().await;
        let mut cfg = self.config().await?;
        if !cfg.is_admin(caller) {
            return Err(EngineError::Unauthorized);
        }

        let event = apply(&mut cfg)?;
        self.repo
            .commit_config_change(&cfg, &event, self.clock.now())
            .await?;

        info!(event = event.kind(), caller = %caller, "registry updated");
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::engine::ManualClock;
    use crate::domain::Timestamp;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn addr(n: u8) -> Address {
        Address::from_str(&format!("0x{}", hex::encode([n; 20]))).unwrap()
    }

    async fn setup() -> (Registry, Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let repo = Arc::new(Repository::new(init_db(&db_path).await.unwrap()));
        let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
        let registry = Registry::configure(repo.clone(), clock, addr(1), Some(addr(2)), addr(3), 1000)
            .await
            .unwrap();
        (registry, repo, temp_dir)
    }

    #[tokio::test]
    async fn test_configure_defaults() {
        let (registry, _repo, _temp) = setup().await;
        let cfg = registry.config().await.unwrap();
        assert_eq!(cfg.admin, addr(1));
        assert_eq!(cfg.treasury, addr(2));
        assert_eq!(cfg.exchange, addr(3));
        assert_eq!(cfg.platform_fee_bps, 1000);
        assert_eq!(registry.peek_next_identifier().await.unwrap(), PoolId::new(1));
    }

    #[tokio::test]
    async fn test_configure_rejects_zero_exchange() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("t.db").to_string_lossy().to_string();
        let repo = Arc::new(Repository::new(init_db(&db_path).await.unwrap()));
        let clock = Arc::new(ManualClock::default());
        let err = Registry::configure(repo, clock, addr(1), None, Address::zero(), 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAddress));
    }

    #[tokio::test]
    async fn test_set_treasury_emits_old_and_new() {
        let (registry, repo, _temp) = setup().await;
        registry.set_treasury(&addr(1), addr(5)).await.unwrap();

        assert_eq!(registry.config().await.unwrap().treasury, addr(5));
        let events = repo.query_events(None).await.unwrap();
        assert_eq!(
            events.last(),
            Some(&EngineEvent::TreasuryUpdated {
                old: addr(2),
                new: addr(5)
            })
        );
    }

    #[tokio::test]
    async fn test_non_admin_rejected_before_validation() {
        let (registry, _repo, _temp) = setup().await;
        let err = registry
            .set_treasury(&addr(9), Address::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized));
        let err = registry.set_platform_fee_bps(&addr(9), 500).await.unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized));
    }

    #[tokio::test]
    async fn test_zero_addresses_rejected() {
        let (registry, _repo, _temp) = setup().await;
        assert!(matches!(
            registry.set_treasury(&addr(1), Address::zero()).await,
            Err(EngineError::InvalidAddress)
        ));
        assert!(matches!(
            registry.set_exchange_service(&addr(1), Address::zero()).await,
            Err(EngineError::InvalidAddress)
        ));
        assert_eq!(registry.config().await.unwrap().exchange, addr(3));
    }

    #[tokio::test]
    async fn test_fee_bounds() {
        let (registry, _repo, _temp) = setup().await;
        assert!(matches!(
            registry.set_platform_fee_bps(&addr(1), 1001).await,
            Err(EngineError::FeeTooHigh(1001))
        ));
        let cfg = registry.set_platform_fee_bps(&addr(1), 1000).await.unwrap();
        assert_eq!(cfg.platform_fee_bps, 1000);
        let cfg = registry.set_platform_fee_bps(&addr(1), 0).await.unwrap();
        assert_eq!(cfg.platform_fee_bps, 0);
    }
}
