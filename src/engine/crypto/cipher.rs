//! Block-Chunked RSA Encryption
//!
//! RSA can only transform inputs smaller than its modulus, so messages of
//! any length are cut into plaintext blocks, each block is encrypted on its
//! own with PKCS#1 v1.5 padding, and the ciphertext blocks are concatenated.
//! Every ciphertext block is exactly one modulus long, which is what lets
//! [`AsymmetricCipher::decrypt`] find the block boundaries again.

use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::Pkcs1v15Encrypt;

use super::encoding::TransportEncoding;
use super::error::{CryptoError, Result};
use super::keys::{PrivateKey, PublicKey};

/// Bytes of every block that PKCS#1 v1.5 padding reserves for itself
pub const PKCS1_PADDING_OVERHEAD: usize = 11;

/// Default gap between the plaintext block and the modulus length
/// (100-byte blocks for a 1024-bit key)
pub const DEFAULT_BLOCK_HEADROOM: usize = 28;

/// Plaintext and ciphertext block lengths for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSizes {
    /// Plaintext bytes consumed per block
    pub encrypt: usize,
    /// Ciphertext bytes produced per block (the modulus length)
    pub decrypt: usize,
}

impl BlockSizes {
    pub fn for_modulus(modulus_len: usize, plaintext_block: Option<usize>) -> Result<Self> {
        let max = modulus_len.saturating_sub(PKCS1_PADDING_OVERHEAD);
        let encrypt = plaintext_block.unwrap_or_else(|| modulus_len.saturating_sub(DEFAULT_BLOCK_HEADROOM));
        if encrypt == 0 || encrypt > max {
            return Err(CryptoError::InvalidConfig(format!(
                "plaintext block of {} bytes does not fit a {}-byte modulus (max {})",
                encrypt, modulus_len, max
            )));
        }
        Ok(Self {
            encrypt,
            decrypt: modulus_len,
        })
    }

    /// Ciphertext length produced for a message of `len` bytes
    pub fn ciphertext_len(&self, len: usize) -> usize {
        len.div_ceil(self.encrypt).max(1) * self.decrypt
    }
}

/// Plaintext blocks of a message; an empty message is one empty block
fn plaintext_blocks(message: &[u8], size: usize) -> impl Iterator<Item = &[u8]> {
    let empty: &[u8] = &[];
    message
        .chunks(size)
        .chain(message.is_empty().then_some(empty))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AsymmetricCipher {
    plaintext_block: Option<usize>,
    encoding: TransportEncoding,
}

impl AsymmetricCipher {
    pub fn new(encoding: TransportEncoding) -> Self {
        Self {
            plaintext_block: None,
            encoding,
        }
    }

    /// Override the plaintext block length derived from the key
    pub fn with_plaintext_block(mut self, size: usize) -> Self {
        self.plaintext_block = Some(size);
        self
    }

    pub fn encoding(&self) -> TransportEncoding {
        self.encoding
    }

    pub fn block_sizes(&self, key: &impl PublicKeyParts) -> Result<BlockSizes> {
        BlockSizes::for_modulus(key.size(), self.plaintext_block)
    }

    pub fn encrypt(&self, message: &[u8], key: &PublicKey) -> Result<Vec<u8>> {
        let key = key.as_rsa()?;
        let sizes = self.block_sizes(key)?;
        let mut rng = OsRng;

        let blocks = plaintext_blocks(message, sizes.encrypt)
            .enumerate()
            .map(|(index, block)| {
                key.encrypt(&mut rng, Pkcs1v15Encrypt, block)
                    .map_err(|e| CryptoError::BlockTransform {
                        index,
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(blocks.concat())
    }

    pub fn decrypt(&self, message: &[u8], key: &PrivateKey) -> Result<Vec<u8>> {
        let key = key.as_rsa()?;
        let block_len = key.size();

        if message.is_empty() || message.len() % block_len != 0 {
            return Err(CryptoError::BlockTransform {
                index: message.len() / block_len,
                reason: format!(
                    "ciphertext of {} bytes is not a whole number of {}-byte blocks",
                    message.len(),
                    block_len
                ),
            });
        }

        let blocks = message
            .chunks(block_len)
            .enumerate()
            .map(|(index, block)| {
                key.decrypt(Pkcs1v15Encrypt, block)
                    .map_err(|e| CryptoError::BlockTransform {
                        index,
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(blocks.concat())
    }

    /// Encrypt and render the ciphertext in the transport encoding
    pub fn encrypt_encoded(&self, message: &[u8], key: &PublicKey) -> Result<String> {
        Ok(self.encoding.encode(&self.encrypt(message, key)?))
    }

    /// Decode transport text and decrypt it
    pub fn decrypt_encoded(&self, text: &str, key: &PrivateKey) -> Result<Vec<u8>> {
        self.decrypt(&self.encoding.decode(text)?, key)
    }
}
