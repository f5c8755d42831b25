//! Firmware Site Configuration Module
//! Handles loading and validating firmware.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::crypto::{Algorithm, AsymmetricCipher, BlockSizes, CryptoError, KeyConfig, TransportEncoding};
use crate::engine::crypto::keys::DEFAULT_KEY_BITS;

pub const CONFIG_FILE: &str = "firmware.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(#[from] CryptoError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub vendor: VendorConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub updates: UpdatesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    pub name: String,
    /// Identifier reported as `firmware` in every response
    pub firmware_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

/// Where the vendor keypair lives between restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// Stored in the site database, reused across restarts
    #[default]
    Persisted,
    /// Generated at startup and forgotten at exit
    Ephemeral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
    #[serde(default)]
    pub transport_encoding: TransportEncoding,
    #[serde(default)]
    pub key_source: KeySource,
    /// Plaintext bytes per RSA block; derived from the key when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plaintext_block_size: Option<usize>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            key_bits: default_key_bits(),
            transport_encoding: TransportEncoding::default(),
            key_source: KeySource::default(),
            plaintext_block_size: None,
        }
    }
}

/// How an update package is protected for transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactMode {
    /// Plain manifest plus detached signature
    #[default]
    Sign,
    /// Manifest encrypted block by block
    Encrypt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesConfig {
    #[serde(default = "default_updates_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub artifact_mode: ArtifactMode,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            dir: default_updates_dir(),
            artifact_mode: ArtifactMode::default(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}

fn default_updates_dir() -> PathBuf {
    PathBuf::from("./updateFiles")
}

impl Config {
    pub fn load(site_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = site_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the site config, falling back to defaults when there is none
    pub fn load_or_default(site_dir: &Path) -> Result<Self, ConfigError> {
        match Self::load(site_dir) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default_for_site("firmware-site", "8080")),
            other => other,
        }
    }

    pub fn save(&self, site_dir: &Path) -> Result<(), ConfigError> {
        let config_path = site_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_site(name: &str, firmware_id: &str) -> Self {
        Self {
            version: "0.1.0".to_string(),
            vendor: VendorConfig {
                name: name.to_string(),
                firmware_id: firmware_id.to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("./data/FirmwareSite.db"),
            },
            api: ApiConfig {
                port: default_port(),
                host: default_host(),
            },
            crypto: CryptoConfig::default(),
            updates: UpdatesConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.key_config().validate()?;
        if self.crypto.algorithm == Algorithm::Rsa {
            BlockSizes::for_modulus(self.crypto.key_bits / 8, self.crypto.plaintext_block_size)?;
        }
        if self.updates.artifact_mode == ArtifactMode::Encrypt && !self.crypto.algorithm.supports_encryption() {
            return Err(CryptoError::InvalidConfig(format!(
                "artifact_mode \"encrypt\" needs an RSA key, configured algorithm is {}",
                self.crypto.algorithm
            ))
            .into());
        }
        Ok(())
    }

    pub fn key_config(&self) -> KeyConfig {
        KeyConfig::new(self.crypto.algorithm, self.crypto.key_bits)
    }

    pub fn cipher(&self) -> AsymmetricCipher {
        let cipher = AsymmetricCipher::new(self.crypto.transport_encoding);
        match self.crypto.plaintext_block_size {
            Some(size) => cipher.with_plaintext_block(size),
            None => cipher,
        }
    }

    /// Database path resolved against the site directory
    pub fn database_path(&self, site_dir: &Path) -> PathBuf {
        site_dir.join(&self.database.path)
    }

    /// Update directory resolved against the site directory
    pub fn updates_dir(&self, site_dir: &Path) -> PathBuf {
        site_dir.join(&self.updates.dir)
    }
}
