//! Transport Encoding
//! Text renderings of binary artifacts for JSON responses

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::error::{CryptoError, Result};

/// How binary artifacts are rendered for transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportEncoding {
    /// Lowercase hexadecimal
    Hex,
    /// Standard alphabet, padded
    #[default]
    Base64,
}

impl TransportEncoding {
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Hex => hex::encode(bytes),
            Self::Base64 => base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self, text: &str) -> Result<Vec<u8>> {
        let text = text.trim();
        match self {
            Self::Hex => hex::decode(text).map_err(|e| CryptoError::Encoding(e.to_string())),
            Self::Base64 => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map_err(|e| CryptoError::Encoding(e.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Base64 => "base64",
        }
    }
}

impl std::str::FromStr for TransportEncoding {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(Self::Hex),
            "base64" => Ok(Self::Base64),
            other => Err(CryptoError::InvalidConfig(format!(
                "unknown transport encoding '{}'",
                other
            ))),
        }
    }
}
