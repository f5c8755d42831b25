//! Firmware Site Bootstrap
//! Wires config, database, key store and packager together for one site directory

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::engine::api::ApiState;
use crate::engine::config::{Config, ConfigError, KeySource};
use crate::engine::crypto::{CryptoError, KeyManager};
use crate::engine::database::{Database, DatabaseError};
use crate::engine::keystore::{KeyStore, MemoryKeyStore, SqliteKeyStore};
use crate::engine::updater::UpdatePackager;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub struct Site {
    pub dir: PathBuf,
    pub config: Config,
    pub db: Database,
}

impl Site {
    /// Open a site directory, using default settings when it has no config file
    pub fn open(dir: &Path) -> Result<Self, SiteError> {
        let config = Config::load_or_default(dir)?;
        Self::with_config(dir, config)
    }

    pub fn with_config(dir: &Path, config: Config) -> Result<Self, SiteError> {
        config.validate()?;
        let db = Database::new(&config.database_path(dir))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            db,
        })
    }

    /// Key manager over the configured key store; not yet initialized
    pub fn key_manager(&self) -> KeyManager {
        let store: Arc<dyn KeyStore> = match self.config.crypto.key_source {
            KeySource::Persisted => Arc::new(SqliteKeyStore::new(self.db.clone())),
            KeySource::Ephemeral => Arc::new(MemoryKeyStore::new()),
        };
        KeyManager::new(store, self.config.key_config())
    }

    /// Key manager with the vendor keypair loaded or generated
    pub fn initialized_keys(&self) -> Result<KeyManager, SiteError> {
        let mut keys = self.key_manager();
        keys.initialize()?;
        Ok(keys)
    }

    pub fn packager(&self) -> UpdatePackager {
        UpdatePackager::from_config(&self.config, &self.dir)
    }

    /// Everything the router needs, with keys initialized up front
    pub fn api_state(&self) -> Result<ApiState, SiteError> {
        let keys = self.initialized_keys()?;
        info!(
            vendor = %self.config.vendor.name,
            firmware = %self.config.vendor.firmware_id,
            algorithm = %self.config.crypto.algorithm,
            "Firmware site ready"
        );
        Ok(ApiState {
            db: Arc::new(self.db.clone()),
            keys: Arc::new(keys),
            packager: Arc::new(self.packager()),
        })
    }
}
