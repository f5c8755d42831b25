//! Firmware Site Crypto Core
//!
//! Components:
//! - `keys` - Vendor keypair lifecycle (load, decode, generate, persist)
//! - `cipher` - Block-chunked RSA encryption of arbitrary-length messages
//! - `signer` - Streaming detached signatures
//! - `encoding` - Hex/Base64 transport encoding

pub mod cipher;
pub mod encoding;
pub mod error;
pub mod keys;
pub mod signer;

pub use cipher::{AsymmetricCipher, BlockSizes};
pub use encoding::TransportEncoding;
pub use error::CryptoError;
pub use keys::{Algorithm, KeyConfig, KeyManager, Keypair, PrivateKey, PublicKey};
pub use signer::{FileSigner, SignedArtifact};
