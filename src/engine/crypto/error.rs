//! Crypto Error Types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Keypair requested before the key manager was initialized")]
    KeyNotInitialized,

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Stored key could not be decoded: {0}")]
    KeyDecode(String),

    #[error("Cipher block {index} failed: {reason}")]
    BlockTransform { index: usize, reason: String },

    #[error("Could not read {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Read error while streaming input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid transport encoding: {0}")]
    Encoding(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid crypto configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
