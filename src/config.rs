//! Configuration loading from environment variables.

use anyhow::anyhow;
use std::env;

/// Which [`crate::store::Store`] backend to construct.
pub enum StoreBackend {
    Postgres { database_url: String },
    Memory,
}

/// Service configuration loaded from environment.
pub struct Config {
    pub host: String,
    pub port: u16,
    pub labeler_did: String,
    pub labeler_signing_key: String,
    pub store_backend: StoreBackend,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("LABELER_DATABASE_URL").ok();

        Ok(Self {
            host: env::var("LABELER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("LABELER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8083),
            labeler_did: env::var("LABELER_DID")
                .map_err(|_| anyhow!("LABELER_DID is required"))?,
            labeler_signing_key: env::var("LABELER_SIGNING_KEY")
                .map_err(|_| anyhow!("LABELER_SIGNING_KEY is required"))?,
            store_backend: match database_url {
                Some(database_url) => StoreBackend::Postgres { database_url },
                None => StoreBackend::Memory,
            },
        })
    }
}
