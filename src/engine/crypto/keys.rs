//! Vendor Key Management
//!
//! The site signs and encrypts with exactly one vendor keypair per process.
//! [`KeyManager`] loads that pair from a [`KeyStore`] on startup and falls
//! back to generating (and persisting) a fresh one when nothing usable is
//! stored. After [`KeyManager::initialize`] the pair never changes except
//! through an explicit [`KeyManager::generate`] (key rotation).

use std::fmt;
use std::sync::Arc;

use pkcs8::{DecodePrivateKey, DecodePublicKey, Document, EncodePrivateKey, EncodePublicKey, SecretDocument};
use rand::rngs::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::error::{CryptoError, Result};
use crate::engine::keystore::KeyStore;

pub const DEFAULT_KEY_BITS: usize = 2048;

/// Supported vendor key algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Rsa,
    Dsa,
    Ed25519,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::Dsa => "DSA",
            Self::Ed25519 => "Ed25519",
        }
    }

    /// Only RSA can transform cipher blocks; the others sign only
    pub fn supports_encryption(&self) -> bool {
        matches!(self, Self::Rsa)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rsa" => Ok(Self::Rsa),
            "dsa" => Ok(Self::Dsa),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(CryptoError::InvalidConfig(format!("unknown algorithm '{}'", other))),
        }
    }
}

/// Parameters for loading and generating the vendor keypair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyConfig {
    pub algorithm: Algorithm,
    /// Modulus size for RSA, prime size of `p` for DSA; ignored for Ed25519
    pub key_bits: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Rsa,
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

impl KeyConfig {
    pub fn new(algorithm: Algorithm, key_bits: usize) -> Self {
        Self { algorithm, key_bits }
    }

    pub fn validate(&self) -> Result<()> {
        match self.algorithm {
            Algorithm::Rsa if !(1024..=4096).contains(&self.key_bits) => Err(CryptoError::InvalidConfig(
                format!("RSA key size must be 1024..=4096 bits, got {}", self.key_bits),
            )),
            Algorithm::Dsa => self.dsa_key_size().map(|_| ()),
            _ => Ok(()),
        }
    }

    fn dsa_key_size(&self) -> Result<dsa::KeySize> {
        match self.key_bits {
            2048 => Ok(dsa::KeySize::DSA_2048_256),
            3072 => Ok(dsa::KeySize::DSA_3072_256),
            other => Err(CryptoError::InvalidConfig(format!(
                "DSA key size must be 2048 or 3072 bits, got {}",
                other
            ))),
        }
    }
}

/// Public half of the vendor keypair
#[derive(Clone, PartialEq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Dsa(dsa::VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    /// Decode X.509 SubjectPublicKeyInfo DER
    pub fn from_der(algorithm: Algorithm, der: &[u8]) -> Result<Self> {
        let decoded = match algorithm {
            Algorithm::Rsa => RsaPublicKey::from_public_key_der(der).map(Self::Rsa),
            Algorithm::Dsa => dsa::VerifyingKey::from_public_key_der(der).map(Self::Dsa),
            Algorithm::Ed25519 => ed25519_dalek::VerifyingKey::from_public_key_der(der).map(Self::Ed25519),
        };
        decoded.map_err(|e| CryptoError::KeyDecode(format!("{} public key: {}", algorithm, e)))
    }

    pub fn to_der(&self) -> Result<Document> {
        let encoded = match self {
            Self::Rsa(key) => key.to_public_key_der(),
            Self::Dsa(key) => key.to_public_key_der(),
            Self::Ed25519(key) => key.to_public_key_der(),
        };
        encoded.map_err(|e| CryptoError::KeyGeneration(format!("encoding public key: {}", e)))
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Rsa(_) => Algorithm::Rsa,
            Self::Dsa(_) => Algorithm::Dsa,
            Self::Ed25519(_) => Algorithm::Ed25519,
        }
    }

    pub fn as_rsa(&self) -> Result<&RsaPublicKey> {
        match self {
            Self::Rsa(key) => Ok(key),
            other => Err(CryptoError::UnsupportedOperation(format!(
                "{} keys cannot encrypt",
                other.algorithm()
            ))),
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.algorithm()).finish()
    }
}

/// Private half of the vendor keypair
#[derive(Clone)]
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Dsa(dsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl PrivateKey {
    /// Decode PKCS#8 DER
    pub fn from_der(algorithm: Algorithm, der: &[u8]) -> Result<Self> {
        let decoded = match algorithm {
            Algorithm::Rsa => RsaPrivateKey::from_pkcs8_der(der).map(Self::Rsa),
            Algorithm::Dsa => dsa::SigningKey::from_pkcs8_der(der).map(Self::Dsa),
            Algorithm::Ed25519 => ed25519_dalek::SigningKey::from_pkcs8_der(der).map(Self::Ed25519),
        };
        decoded.map_err(|e| CryptoError::KeyDecode(format!("{} private key: {}", algorithm, e)))
    }

    pub fn to_der(&self) -> Result<SecretDocument> {
        let encoded = match self {
            Self::Rsa(key) => key.to_pkcs8_der(),
            Self::Dsa(key) => key.to_pkcs8_der(),
            Self::Ed25519(key) => key.to_pkcs8_der(),
        };
        encoded.map_err(|e| CryptoError::KeyGeneration(format!("encoding private key: {}", e)))
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Rsa(_) => Algorithm::Rsa,
            Self::Dsa(_) => Algorithm::Dsa,
            Self::Ed25519(_) => Algorithm::Ed25519,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
            Self::Dsa(key) => PublicKey::Dsa(key.verifying_key().clone()),
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }

    pub fn as_rsa(&self) -> Result<&RsaPrivateKey> {
        match self {
            Self::Rsa(key) => Ok(key),
            other => Err(CryptoError::UnsupportedOperation(format!(
                "{} keys cannot decrypt",
                other.algorithm()
            ))),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey").field(&self.algorithm()).finish()
    }
}

/// A matched public/private pair together with its encoded forms
pub struct Keypair {
    public: PublicKey,
    private: PrivateKey,
    public_der: Document,
    private_der: SecretDocument,
}

impl Keypair {
    /// Generate a fresh pair from the OS random source
    pub fn generate(config: &KeyConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = OsRng;

        let private = match config.algorithm {
            Algorithm::Rsa => RsaPrivateKey::new(&mut rng, config.key_bits)
                .map(PrivateKey::Rsa)
                .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?,
            Algorithm::Dsa => {
                let components = dsa::Components::generate(&mut rng, config.dsa_key_size()?);
                PrivateKey::Dsa(dsa::SigningKey::generate(&mut rng, components))
            }
            Algorithm::Ed25519 => PrivateKey::Ed25519(ed25519_dalek::SigningKey::generate(&mut rng)),
        };

        Self::from_private(private)
    }

    /// Rebuild a pair from its stored encodings.
    ///
    /// Both halves must decode under `algorithm` and belong together.
    pub fn from_der(algorithm: Algorithm, public_der: &[u8], private_der: &[u8]) -> Result<Self> {
        let public = PublicKey::from_der(algorithm, public_der)?;
        let private = PrivateKey::from_der(algorithm, private_der)?;
        if private.public_key() != public {
            return Err(CryptoError::KeyDecode(
                "stored public key does not belong to the stored private key".to_string(),
            ));
        }
        Self::from_private(private)
    }

    fn from_private(private: PrivateKey) -> Result<Self> {
        let public = private.public_key();
        let public_der = public.to_der()?;
        let private_der = private.to_der()?;
        Ok(Self {
            public,
            private,
            public_der,
            private_der,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.private.algorithm()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// SubjectPublicKeyInfo DER
    pub fn public_der(&self) -> &[u8] {
        self.public_der.as_bytes()
    }

    /// PKCS#8 DER
    pub fn private_der(&self) -> &[u8] {
        self.private_der.as_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("algorithm", &self.algorithm())
            .field("public_der_len", &self.public_der.as_bytes().len())
            .finish_non_exhaustive()
    }
}

/// Owner of the process-wide vendor keypair
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    config: KeyConfig,
    active: Option<Keypair>,
}

impl KeyManager {
    pub fn new(store: Arc<dyn KeyStore>, config: KeyConfig) -> Self {
        Self {
            store,
            config,
            active: None,
        }
    }

    /// Make a keypair available: the stored one if it decodes, otherwise a
    /// newly generated and persisted one. A no-op once a pair is active.
    pub fn initialize(&mut self) -> Result<()> {
        if self.active.is_some() {
            debug!("Vendor keypair already active");
            return Ok(());
        }

        match self.load() {
            Ok(pair) => {
                info!(algorithm = %pair.algorithm(), "Loaded stored vendor keypair");
                self.active = Some(pair);
                Ok(())
            }
            Err(reason) => {
                warn!(%reason, "No usable stored keypair, generating a new one");
                self.generate()
            }
        }
    }

    fn load(&self) -> Result<Keypair> {
        let stored = self
            .store
            .load_pair()
            .map_err(|e| CryptoError::KeyDecode(format!("loading keypair: {}", e)))?;

        match stored {
            Some((public_der, private_der)) if !public_der.is_empty() && !private_der.is_empty() => {
                Keypair::from_der(self.config.algorithm, &public_der, &private_der)
            }
            _ => Err(CryptoError::KeyDecode("no stored keypair".to_string())),
        }
    }

    /// Generate, persist and adopt a new keypair.
    ///
    /// Failing to persist is logged, not fatal: the pair is still adopted
    /// but will not survive a restart.
    pub fn generate(&mut self) -> Result<()> {
        info!(
            algorithm = %self.config.algorithm,
            bits = self.config.key_bits,
            "Generating vendor keypair"
        );
        let pair = Keypair::generate(&self.config)?;

        if let Err(e) = self.store.store(pair.public_der(), pair.private_der()) {
            error!(error = %e, "Failed to persist vendor keypair");
        }

        self.active = Some(pair);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    pub fn config(&self) -> &KeyConfig {
        &self.config
    }

    pub fn keypair(&self) -> Result<&Keypair> {
        self.active.as_ref().ok_or(CryptoError::KeyNotInitialized)
    }

    pub fn public_key(&self) -> Result<&PublicKey> {
        Ok(self.keypair()?.public_key())
    }

    pub fn private_key(&self) -> Result<&PrivateKey> {
        Ok(self.keypair()?.private_key())
    }

    pub fn public_key_der(&self) -> Result<&[u8]> {
        Ok(self.keypair()?.public_der())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::keystore::{KeyStore, MemoryKeyStore, StoreError};

    fn rsa_1024() -> KeyConfig {
        KeyConfig::new(Algorithm::Rsa, 1024)
    }

    #[test]
    fn test_accessors_fail_before_initialize() {
        let manager = KeyManager::new(Arc::new(MemoryKeyStore::new()), rsa_1024());
        assert!(!manager.is_initialized());
        assert!(matches!(manager.public_key(), Err(CryptoError::KeyNotInitialized)));
        assert!(matches!(manager.private_key(), Err(CryptoError::KeyNotInitialized)));
        assert!(matches!(manager.public_key_der(), Err(CryptoError::KeyNotInitialized)));
    }

    #[test]
    fn test_empty_store_generates_and_persists_once() {
        let store = Arc::new(MemoryKeyStore::new());
        let mut manager = KeyManager::new(store.clone(), rsa_1024());
        manager.initialize().unwrap();

        assert_eq!(store.write_count(), 1);
        assert_eq!(store.load_public().unwrap().unwrap(), manager.public_key_der().unwrap());
        assert_eq!(
            store.load_private().unwrap().unwrap(),
            manager.keypair().unwrap().private_der()
        );
    }

    #[test]
    fn test_initialize_twice_keeps_pair() {
        let store = Arc::new(MemoryKeyStore::new());
        let mut manager = KeyManager::new(store.clone(), rsa_1024());
        manager.initialize().unwrap();
        let first = manager.public_key_der().unwrap().to_vec();

        manager.initialize().unwrap();
        assert_eq!(manager.public_key_der().unwrap(), first.as_slice());
        assert_eq!(store.write_count(), 1);

        // A second manager over the same store adopts the same pair
        let mut other = KeyManager::new(store.clone(), rsa_1024());
        other.initialize().unwrap();
        assert_eq!(other.public_key_der().unwrap(), first.as_slice());
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_undecodable_store_regenerates() {
        let store = Arc::new(MemoryKeyStore::with_keys(b"not a key", b"also not a key"));
        let mut manager = KeyManager::new(store.clone(), rsa_1024());
        manager.initialize().unwrap();

        assert_eq!(store.write_count(), 1);
        assert_ne!(store.load_public().unwrap().unwrap(), b"not a key");
        assert!(manager.public_key().is_ok());
    }

    #[test]
    fn test_empty_bytes_regenerate() {
        let store = Arc::new(MemoryKeyStore::with_keys(b"", b""));
        let mut manager = KeyManager::new(store.clone(), rsa_1024());
        manager.initialize().unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_mismatched_halves_regenerate() {
        let a = Keypair::generate(&rsa_1024()).unwrap();
        let b = Keypair::generate(&rsa_1024()).unwrap();
        assert!(matches!(
            Keypair::from_der(Algorithm::Rsa, a.public_der(), b.private_der()),
            Err(CryptoError::KeyDecode(_))
        ));

        let store = Arc::new(MemoryKeyStore::with_keys(a.public_der(), b.private_der()));
        let mut manager = KeyManager::new(store.clone(), rsa_1024());
        manager.initialize().unwrap();
        assert_eq!(store.write_count(), 1);
        assert_ne!(manager.public_key_der().unwrap(), a.public_der());
    }

    /// Store whose single-half reads see a newer public key than the pair snapshot
    struct RotatingStore {
        pair: MemoryKeyStore,
        newer_public: Vec<u8>,
    }

    impl KeyStore for RotatingStore {
        fn load_public(&self) -> std::result::Result<Option<Vec<u8>>, StoreError> {
            Ok(Some(self.newer_public.clone()))
        }

        fn load_private(&self) -> std::result::Result<Option<Vec<u8>>, StoreError> {
            self.pair.load_private()
        }

        fn load_pair(&self) -> std::result::Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
            self.pair.load_pair()
        }

        fn store(&self, public_key: &[u8], private_key: &[u8]) -> std::result::Result<(), StoreError> {
            self.pair.store(public_key, private_key)
        }
    }

    #[test]
    fn test_initialize_reads_one_consistent_pair() {
        let ed25519 = KeyConfig::new(Algorithm::Ed25519, 0);
        let stored = Keypair::generate(&ed25519).unwrap();
        let rotated = Keypair::generate(&ed25519).unwrap();
        let store = Arc::new(RotatingStore {
            pair: MemoryKeyStore::with_keys(stored.public_der(), stored.private_der()),
            newer_public: rotated.public_der().to_vec(),
        });

        let mut manager = KeyManager::new(store.clone(), ed25519);
        manager.initialize().unwrap();
        assert_eq!(manager.public_key_der().unwrap(), stored.public_der());
        assert_eq!(store.pair.write_count(), 0);
    }

    #[test]
    fn test_algorithm_change_regenerates() {
        let rsa = Keypair::generate(&rsa_1024()).unwrap();
        let store = Arc::new(MemoryKeyStore::with_keys(rsa.public_der(), rsa.private_der()));
        let mut manager = KeyManager::new(store.clone(), KeyConfig::new(Algorithm::Ed25519, 0));
        manager.initialize().unwrap();
        assert_eq!(manager.keypair().unwrap().algorithm(), Algorithm::Ed25519);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_generate_rotates_key() {
        let store = Arc::new(MemoryKeyStore::new());
        let mut manager = KeyManager::new(store.clone(), KeyConfig::new(Algorithm::Ed25519, 0));
        manager.initialize().unwrap();
        let before = manager.public_key_der().unwrap().to_vec();

        manager.generate().unwrap();
        assert_ne!(manager.public_key_der().unwrap(), before.as_slice());
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_der_roundtrip_ed25519() {
        let pair = Keypair::generate(&KeyConfig::new(Algorithm::Ed25519, 0)).unwrap();
        let restored = Keypair::from_der(Algorithm::Ed25519, pair.public_der(), pair.private_der()).unwrap();
        assert_eq!(restored.public_key(), pair.public_key());
    }

    #[test]
    fn test_invalid_key_sizes() {
        assert!(KeyConfig::new(Algorithm::Rsa, 512).validate().is_err());
        assert!(KeyConfig::new(Algorithm::Dsa, 1024).validate().is_err());
        assert!(KeyConfig::new(Algorithm::Dsa, 2048).validate().is_ok());
        assert!(matches!(
            Keypair::generate(&KeyConfig::new(Algorithm::Rsa, 8192)),
            Err(CryptoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_encryption_support() {
        assert!(Algorithm::Rsa.supports_encryption());
        assert!(!Algorithm::Dsa.supports_encryption());
        assert_eq!("ED25519".parse::<Algorithm>().unwrap(), Algorithm::Ed25519);
    }
}
