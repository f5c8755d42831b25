//! Firmware Site Keystore Module
//! Durable storage for the vendor keypair's encoded bytes

use std::sync::Mutex;
use thiserror::Error;

use crate::engine::database::{Database, DatabaseError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Keystore lock poisoned")]
    Poisoned,
}

/// Persistence boundary for the vendor keypair.
///
/// Keys cross this boundary only as encoded bytes (SPKI DER for the public
/// half, PKCS#8 DER for the private half); the store never interprets them.
pub trait KeyStore: Send + Sync {
    /// Stored public key bytes, `None` when nothing has been stored yet
    fn load_public(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stored private key bytes, `None` when nothing has been stored yet
    fn load_private(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Both halves read together, so they always come from the same stored pair
    fn load_pair(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Persist a keypair, superseding any previously stored one
    fn store(&self, public_key: &[u8], private_key: &[u8]) -> Result<(), StoreError>;
}

/// Keys kept in the site database's `vendor_keys` table
pub struct SqliteKeyStore {
    db: Database,
}

impl SqliteKeyStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl KeyStore for SqliteKeyStore {
    fn load_public(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.latest_vendor_keys()?.map(|(public_key, _)| public_key))
    }

    fn load_private(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.latest_vendor_keys()?.map(|(_, private_key)| private_key))
    }

    fn load_pair(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self.db.latest_vendor_keys()?)
    }

    fn store(&self, public_key: &[u8], private_key: &[u8]) -> Result<(), StoreError> {
        self.db.insert_vendor_keys(public_key, private_key)?;
        Ok(())
    }
}

/// Process-local keys; nothing survives a restart
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<Option<(Vec<u8>, Vec<u8>)>>,
    writes: Mutex<usize>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-existing bytes without counting it as a write
    pub fn with_keys(public_key: &[u8], private_key: &[u8]) -> Self {
        Self {
            keys: Mutex::new(Some((public_key.to_vec(), private_key.to_vec()))),
            writes: Mutex::new(0),
        }
    }

    /// Number of `store` calls made so far
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }
}

impl KeyStore for MemoryKeyStore {
    fn load_public(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(keys.as_ref().map(|(public_key, _)| public_key.clone()))
    }

    fn load_private(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(keys.as_ref().map(|(_, private_key)| private_key.clone()))
    }

    fn load_pair(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        let keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(keys.clone())
    }

    fn store(&self, public_key: &[u8], private_key: &[u8]) -> Result<(), StoreError> {
        let mut keys = self.keys.lock().map_err(|_| StoreError::Poisoned)?;
        *keys = Some((public_key.to_vec(), private_key.to_vec()));
        *self.writes.lock().map_err(|_| StoreError::Poisoned)? += 1;
        Ok(())
    }
}
