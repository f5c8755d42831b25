//! Update Packaging
//!
//! Builds the update manifest for a device model, writes it to the update
//! directory and protects it for transport (detached signature or block
//! encryption, per [`ArtifactMode`]).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::engine::config::{ArtifactMode, Config};
use crate::engine::crypto::{AsymmetricCipher, CryptoError, FileSigner, KeyManager, TransportEncoding};
use crate::engine::database::FirmwareRecord;

const MAX_MODEL_LEN: usize = 64;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Invalid model identifier: {0:?}")]
    InvalidModel(String),
    #[error("Failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Response envelope for version checks and update packages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UpdateResult {
    /// `version` or `update`
    pub action: String,
    /// Device model
    pub model: String,
    /// Firmware version
    pub version: String,
    /// Vendor firmware id
    pub firmware: String,
    /// Transport-encoded artifact: signature or ciphertext
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Transport-encoded manifest covered by `file` when it is a signature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// Model ids end up in file names, so only a conservative alphabet is allowed
pub fn validate_model(model: &str) -> Result<(), PackageError> {
    let valid = !model.is_empty()
        && model.len() <= MAX_MODEL_LEN
        && !model.starts_with('.')
        && model
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(PackageError::InvalidModel(model.to_string()))
    }
}

pub fn manifest_text(firmware_id: &str, model: &str, version: i64) -> String {
    format!(
        "Firmware Update\nFirmware ID: {}\nModel ID: {}\nVersion: {}\n",
        firmware_id, model, version
    )
}

/// Write through a uniquely named temp file so readers never see a partial manifest
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), PackageError> {
    let write_err = |source| PackageError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let temp_path = path.with_extension(format!(
        "{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&temp_path, content).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(|e| {
        fs::remove_file(&temp_path).ok();
        write_err(e)
    })
}

pub struct UpdatePackager {
    updates_dir: PathBuf,
    firmware_id: String,
    mode: ArtifactMode,
    cipher: AsymmetricCipher,
}

impl UpdatePackager {
    pub fn new(updates_dir: PathBuf, firmware_id: &str, mode: ArtifactMode, cipher: AsymmetricCipher) -> Self {
        Self {
            updates_dir,
            firmware_id: firmware_id.to_string(),
            mode,
            cipher,
        }
    }

    pub fn from_config(config: &Config, site_dir: &Path) -> Self {
        Self::new(
            config.updates_dir(site_dir),
            &config.vendor.firmware_id,
            config.updates.artifact_mode,
            config.cipher(),
        )
    }

    pub fn firmware_id(&self) -> &str {
        &self.firmware_id
    }

    pub fn mode(&self) -> ArtifactMode {
        self.mode
    }

    pub fn encoding(&self) -> TransportEncoding {
        self.cipher.encoding()
    }

    pub fn manifest_path(&self, model: &str, version: i64) -> PathBuf {
        self.updates_dir.join(format!("Update_{}_{}.txt", model, version))
    }

    /// Envelope answering a version check
    pub fn version_result(&self, record: &FirmwareRecord) -> UpdateResult {
        UpdateResult {
            action: "version".to_string(),
            model: record.model_id.clone(),
            version: record.version.to_string(),
            firmware: self.firmware_id.clone(),
            file: None,
            payload: None,
        }
    }

    /// Build, write and protect the update manifest for one model
    pub fn package(&self, model: &str, version: i64, keys: &KeyManager) -> Result<UpdateResult, PackageError> {
        validate_model(model)?;
        let manifest = manifest_text(&self.firmware_id, model, version);
        let path = self.manifest_path(model, version);
        write_atomic(&path, manifest.as_bytes())?;
        debug!(path = %path.display(), "Wrote update manifest");

        let encoding = self.encoding();
        let (file, payload) = match self.mode {
            ArtifactMode::Sign => {
                let signature = FileSigner::sign_file(&path, keys.private_key()?)?;
                (encoding.encode(&signature), Some(encoding.encode(manifest.as_bytes())))
            }
            ArtifactMode::Encrypt => {
                let ciphertext = self.cipher.encrypt_encoded(manifest.as_bytes(), keys.public_key()?)?;
                (ciphertext, None)
            }
        };

        info!(model, version, mode = ?self.mode, "Packaged firmware update");
        Ok(UpdateResult {
            action: "update".to_string(),
            model: model.to_string(),
            version: version.to_string(),
            firmware: self.firmware_id.clone(),
            file: Some(file),
            payload,
        })
    }
}
