use crate::domain::{Address, DEFAULT_PLATFORM_FEE_BPS, MAX_PLATFORM_FEE_BPS};
use crate::engine::PoolPolicy;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub admin: Address,
    /// Defaults to the administrator when unset.
    pub treasury: Option<Address>,
    pub exchange: Address,
    pub gateway_url: String,
    /// Local OS entropy is used when unset.
    pub randomness_beacon_url: Option<String>,
    pub initial_fee_bps: u16,
    pub min_pool_duration_secs: u64,
    pub max_pool_duration_secs: u64,
    pub swap_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn optional(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_address(key: &str, raw: &str) -> Result<Address, ConfigError> {
    let address = Address::from_str(raw)
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))?;
    if address.is_zero() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be the zero address".to_string(),
        ));
    }
    Ok(address)
}

fn parse_number<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), format!("must be a valid {}", expected)))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_number::<u16>(&env_map, "PORT", "8080", "u16")?;
        let database_path = required(&env_map, "DATABASE_PATH")?;

        let admin = parse_address("ADMIN_ADDRESS", &required(&env_map, "ADMIN_ADDRESS")?)?;
        let treasury = optional(&env_map, "TREASURY_ADDRESS")
            .map(|raw| parse_address("TREASURY_ADDRESS", &raw))
            .transpose()?;
        let exchange = parse_address("EXCHANGE_ADDRESS", &required(&env_map, "EXCHANGE_ADDRESS")?)?;

        let gateway_url = required(&env_map, "GATEWAY_URL")?;
        let randomness_beacon_url = optional(&env_map, "RANDOMNESS_BEACON_URL");

        let initial_fee_bps = parse_number::<u16>(
            &env_map,
            "INITIAL_FEE_BPS",
            &DEFAULT_PLATFORM_FEE_BPS.to_string(),
            "u16",
        )?;
        if initial_fee_bps > MAX_PLATFORM_FEE_BPS {
            return Err(ConfigError::InvalidValue(
                "INITIAL_FEE_BPS".to_string(),
                format!("must be at most {}", MAX_PLATFORM_FEE_BPS),
            ));
        }

        let min_pool_duration_secs =
            parse_number::<u64>(&env_map, "MIN_POOL_DURATION_SECS", "3600", "u64")?;
        let max_pool_duration_secs =
            parse_number::<u64>(&env_map, "MAX_POOL_DURATION_SECS", "2592000", "u64")?;
        if min_pool_duration_secs > max_pool_duration_secs {
            return Err(ConfigError::InvalidValue(
                "MIN_POOL_DURATION_SECS".to_string(),
                "must not exceed MAX_POOL_DURATION_SECS".to_string(),
            ));
        }

        let swap_timeout_ms = parse_number::<u64>(&env_map, "SWAP_TIMEOUT_MS", "30000", "u64")?;
        if swap_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "SWAP_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            admin,
            treasury,
            exchange,
            gateway_url,
            randomness_beacon_url,
            initial_fee_bps,
            min_pool_duration_secs,
            max_pool_duration_secs,
            swap_timeout_ms,
        })
    }

    pub fn pool_policy(&self) -> PoolPolicy {
        PoolPolicy {
            min_duration_secs: self.min_pool_duration_secs,
            max_duration_secs: self.max_pool_duration_secs,
            swap_timeout: Duration::from_millis(self.swap_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: &str = "0x1111111111111111111111111111111111111111";
    const EXCHANGE: &str = "0x3333333333333333333333333333333333333333";

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert("ADMIN_ADDRESS".to_string(), ADMIN.to_string());
        map.insert("EXCHANGE_ADDRESS".to_string(), EXCHANGE.to_string());
        map.insert(
            "GATEWAY_URL".to_string(),
            "http://localhost:9000".to_string(),
        );
        map
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.treasury, None);
        assert_eq!(cfg.randomness_beacon_url, None);
        assert_eq!(cfg.initial_fee_bps, 1000);
        assert_eq!(cfg.min_pool_duration_secs, 3600);
        assert_eq!(cfg.max_pool_duration_secs, 2_592_000);
        assert_eq!(cfg.pool_policy(), PoolPolicy::default());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_admin() {
        let mut env_map = setup_required_env();
        env_map.remove("ADMIN_ADDRESS");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "ADMIN_ADDRESS"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_gateway_url() {
        let mut env_map = setup_required_env();
        env_map.remove("GATEWAY_URL");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "GATEWAY_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_exchange_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert(
            "EXCHANGE_ADDRESS".to_string(),
            "0x0000000000000000000000000000000000000000".to_string(),
        );
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "EXCHANGE_ADDRESS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_malformed_treasury() {
        let mut env_map = setup_required_env();
        env_map.insert("TREASURY_ADDRESS".to_string(), "treasury".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TREASURY_ADDRESS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_fee_above_cap() {
        let mut env_map = setup_required_env();
        env_map.insert("INITIAL_FEE_BPS".to_string(), "1001".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "INITIAL_FEE_BPS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_inverted_duration_bounds() {
        let mut env_map = setup_required_env();
        env_map.insert("MIN_POOL_DURATION_SECS".to_string(), "7200".to_string());
        env_map.insert("MAX_POOL_DURATION_SECS".to_string(), "3600".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }
}
