//! Randomness sources for winner selection.

use super::{ExternalError, RandomnessSource, Seed};
use crate::domain::PoolId;
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

/// Public randomness beacon (drand-style `GET /public/latest`).
///
/// The seed is `sha256(beacon_randomness || pool_id)`, so anyone holding the
/// beacon round can recompute the draw.
#[derive(Debug, Clone)]
pub struct BeaconRandomness {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct BeaconRound {
    round: u64,
    randomness: String,
}

impl BeaconRandomness {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Bind beacon output to a pool so concurrent finalizations draw independently.
pub fn derive_seed(randomness: &[u8], pool_id: PoolId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(randomness);
    hasher.update(pool_id.as_u64().to_be_bytes());
    hasher.finalize().into()
}

#[async_trait]
impl RandomnessSource for BeaconRandomness {
    async fn seed(&self, pool_id: PoolId) -> Result<Seed, ExternalError> {
        let url = format!("{}/public/latest", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ExternalError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExternalError::HttpError {
                status: status.as_u16(),
                message: "beacon unavailable".to_string(),
            });
        }

        let round: BeaconRound = response
            .json()
            .await
            .map_err(|e| ExternalError::ParseError(e.to_string()))?;
        let randomness = hex::decode(round.randomness.trim())
            .map_err(|e| ExternalError::ParseError(format!("randomness: {}", e)))?;

        debug!(pool_id = %pool_id, round = round.round, "beacon round fetched");

        Ok(Seed {
            bytes: derive_seed(&randomness, pool_id),
            provenance: format!("beacon:{}", round.round),
        })
    }
}

/// Operating-system entropy. Not verifiable; intended for development setups
/// without a beacon.
#[derive(Debug, Clone, Default)]
pub struct LocalRandomness;

#[async_trait]
impl RandomnessSource for LocalRandomness {
    async fn seed(&self, _pool_id: PoolId) -> Result<Seed, ExternalError> {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Ok(Seed {
            bytes,
            provenance: "local".to_string(),
        })
    }
}
