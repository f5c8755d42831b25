//! Detached File Signatures
//!
//! Input is always streamed through the digest in fixed-size reads, so
//! firmware images of any size are signed in constant memory.
//!
//! | Key      | Scheme                    |
//! |----------|---------------------------|
//! | RSA      | RSASSA-PSS, SHA-256       |
//! | DSA      | DSA, SHA-256, RFC 6979    |
//!
//! DSA signatures travel as fixed-width `r || s`, each half padded to the
//! byte length of the subgroup order `q`.
//! | Ed25519  | Ed25519ph (SHA-512)       |

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256, Sha512};
use signature::{DigestSigner, DigestVerifier, RandomizedDigestSigner, SignatureEncoding};

use super::error::{CryptoError, Result};
use super::keys::{PrivateKey, PublicKey};

/// Bytes pulled from the input per read
pub const READ_CHUNK_SIZE: usize = 1024;

/// A payload together with its detached signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedArtifact {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SignedArtifact {
    pub fn verify(&self, key: &PublicKey) -> Result<bool> {
        FileSigner::verify(&self.payload, &self.signature, key)
    }
}

fn stream_digest<D: Digest, R: Read>(mut reader: R) -> io::Result<D> {
    let mut hasher = D::new();
    let mut buffer = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher)
}

/// Byte width of each DSA signature half for this key
fn dsa_scalar_len(key: &dsa::VerifyingKey) -> usize {
    key.components().q().bits().div_ceil(8)
}

fn encode_dsa(signature: &dsa::Signature, width: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; 2 * width];
    for (half, value) in out.chunks_mut(width).zip([signature.r(), signature.s()]) {
        let bytes = value.to_bytes_be();
        if bytes.len() > width {
            return Err(CryptoError::Signing(format!(
                "DSA component of {} bytes exceeds {}-byte width",
                bytes.len(),
                width
            )));
        }
        half[width - bytes.len()..].copy_from_slice(&bytes);
    }
    Ok(out)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| CryptoError::FileAccess {
        path: path.to_path_buf(),
        source,
    })
}

/// Read failures while streaming a file are reported against that file
fn attribute_to(path: &Path, err: CryptoError) -> CryptoError {
    match err {
        CryptoError::Io(source) => CryptoError::FileAccess {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    }
}

pub struct FileSigner;

impl FileSigner {
    pub fn sign_reader<R: Read>(reader: R, key: &PrivateKey) -> Result<Vec<u8>> {
        match key {
            PrivateKey::Rsa(key) => {
                let digest = stream_digest::<Sha256, _>(reader)?;
                let signing_key = rsa::pss::SigningKey::<Sha256>::new(key.clone());
                let signature: rsa::pss::Signature = signing_key
                    .try_sign_digest_with_rng(&mut OsRng, digest)
                    .map_err(|e| CryptoError::Signing(e.to_string()))?;
                Ok(signature.to_vec())
            }
            PrivateKey::Dsa(key) => {
                let digest = stream_digest::<Sha256, _>(reader)?;
                let signature: dsa::Signature = key
                    .try_sign_digest(digest)
                    .map_err(|e| CryptoError::Signing(e.to_string()))?;
                encode_dsa(&signature, dsa_scalar_len(key.verifying_key()))
            }
            PrivateKey::Ed25519(key) => {
                let digest = stream_digest::<Sha512, _>(reader)?;
                let signature = key
                    .sign_prehashed(digest, None)
                    .map_err(|e| CryptoError::Signing(e.to_string()))?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    pub fn sign(bytes: &[u8], key: &PrivateKey) -> Result<Vec<u8>> {
        Self::sign_reader(bytes, key)
    }

    pub fn sign_file(path: &Path, key: &PrivateKey) -> Result<Vec<u8>> {
        let file = open(path)?;
        Self::sign_reader(file, key).map_err(|e| attribute_to(path, e))
    }

    pub fn sign_artifact(payload: Vec<u8>, key: &PrivateKey) -> Result<SignedArtifact> {
        let signature = Self::sign(&payload, key)?;
        Ok(SignedArtifact { payload, signature })
    }

    /// Check a detached signature.
    ///
    /// A well-formed signature that does not match yields `Ok(false)`; a
    /// signature that cannot even be parsed for this key is an error.
    pub fn verify_reader<R: Read>(reader: R, signature: &[u8], key: &PublicKey) -> Result<bool> {
        match key {
            PublicKey::Rsa(key) => {
                if signature.len() != key.size() {
                    return Err(CryptoError::MalformedSignature(format!(
                        "expected {} bytes for this RSA key, got {}",
                        key.size(),
                        signature.len()
                    )));
                }
                let signature = rsa::pss::Signature::try_from(signature)
                    .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
                let digest = stream_digest::<Sha256, _>(reader)?;
                let verifying_key = rsa::pss::VerifyingKey::<Sha256>::new(key.clone());
                Ok(verifying_key.verify_digest(digest, &signature).is_ok())
            }
            PublicKey::Dsa(key) => {
                let width = dsa_scalar_len(key);
                if signature.len() != 2 * width {
                    return Err(CryptoError::MalformedSignature(format!(
                        "expected {} bytes for this DSA key, got {}",
                        2 * width,
                        signature.len()
                    )));
                }
                let (r, s) = signature.split_at(width);
                // Zero halves are well-formed input that simply cannot verify
                let signature = match dsa::Signature::from_components(
                    dsa::BigUint::from_bytes_be(r),
                    dsa::BigUint::from_bytes_be(s),
                ) {
                    Ok(signature) => signature,
                    Err(_) => return Ok(false),
                };
                let digest = stream_digest::<Sha256, _>(reader)?;
                Ok(key.verify_digest(digest, &signature).is_ok())
            }
            PublicKey::Ed25519(key) => {
                let signature = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
                let digest = stream_digest::<Sha512, _>(reader)?;
                Ok(key.verify_prehashed(digest, None, &signature).is_ok())
            }
        }
    }

    pub fn verify(bytes: &[u8], signature: &[u8], key: &PublicKey) -> Result<bool> {
        Self::verify_reader(bytes, signature, key)
    }

    pub fn verify_file(path: &Path, signature: &[u8], key: &PublicKey) -> Result<bool> {
        let file = open(path)?;
        Self::verify_reader(file, signature, key).map_err(|e| attribute_to(path, e))
    }
}
