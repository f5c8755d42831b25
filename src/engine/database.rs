//! Firmware Site Database Module
//! SQLite adapter with connection pooling

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Version assigned to a model the first time it is requested
pub const INITIAL_VERSION: i64 = 1;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create database pool: {0}")]
    PoolError(#[from] r2d2::Error),
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
}

/// Firmware version counter for one vendor/model pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareRecord {
    pub vendor_id: String,
    pub model_id: String,
    pub version: i64,
}

#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;
        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.pool.get()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS vendor_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                public_key BLOB NOT NULL,
                private_key BLOB NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS firmware_versions (
                vendor_id TEXT NOT NULL,
                model_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (vendor_id, model_id)
            )",
            [],
        )?;

        // In-memory databases report "memory" here, file databases "wal"
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Ok(())
    }

    pub fn get_connection(&self) -> Result<DbConnection, DatabaseError> {
        Ok(self.pool.get()?)
    }

    /// Current firmware version of a model, registering it at
    /// [`INITIAL_VERSION`] if it has never been seen.
    pub fn current_version(&self, vendor_id: &str, model_id: &str) -> Result<FirmwareRecord, DatabaseError> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO firmware_versions (vendor_id, model_id, version, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![vendor_id, model_id, INITIAL_VERSION, chrono::Utc::now().to_rfc3339()],
        )?;
        let version: i64 = conn.query_row(
            "SELECT version FROM firmware_versions WHERE vendor_id = ?1 AND model_id = ?2",
            params![vendor_id, model_id],
            |row| row.get(0),
        )?;
        Ok(FirmwareRecord {
            vendor_id: vendor_id.to_string(),
            model_id: model_id.to_string(),
            version,
        })
    }

    /// Publish the next firmware version of a model
    pub fn increment_version(&self, vendor_id: &str, model_id: &str) -> Result<FirmwareRecord, DatabaseError> {
        let current = self.current_version(vendor_id, model_id)?;
        let conn = self.get_connection()?;
        let version: i64 = conn.query_row(
            "UPDATE firmware_versions SET version = version + 1, updated_at = ?3
             WHERE vendor_id = ?1 AND model_id = ?2
             RETURNING version",
            params![vendor_id, model_id, chrono::Utc::now().to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(FirmwareRecord { version, ..current })
    }

    pub fn list_versions(&self, vendor_id: &str) -> Result<Vec<FirmwareRecord>, DatabaseError> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT vendor_id, model_id, version FROM firmware_versions
             WHERE vendor_id = ?1 ORDER BY model_id",
        )?;
        let records = stmt
            .query_map([vendor_id], |row| {
                Ok(FirmwareRecord {
                    vendor_id: row.get(0)?,
                    model_id: row.get(1)?,
                    version: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<FirmwareRecord>, _>>()?;
        Ok(records)
    }

    /// Append a vendor keypair row
    pub fn insert_vendor_keys(&self, public_key: &[u8], private_key: &[u8]) -> Result<(), DatabaseError> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO vendor_keys (public_key, private_key, created_at) VALUES (?1, ?2, ?3)",
            params![public_key, private_key, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recently stored vendor keypair, if any
    pub fn latest_vendor_keys(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, DatabaseError> {
        let conn = self.get_connection()?;
        let keys = conn
            .query_row(
                "SELECT public_key, private_key FROM vendor_keys ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(keys)
    }

    pub fn vendor_key_count(&self) -> Result<i64, DatabaseError> {
        let conn = self.get_connection()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM vendor_keys", [], |row| row.get(0))?)
    }
}
