//! Master key and MKI decoding.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::ConfigError;

// Keys are accepted with or without trailing padding, so a short key is
// reported by its length rather than as a padding error.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Longest MKI the engine accepts, in bytes.
pub const MAX_MKI_LEN: usize = 128;

/// How the key material is written on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    Hex,
    Base64,
}

/// Key material as given by the user, not yet decoded.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub text: String,
    pub encoding: KeyEncoding,
}

impl KeyMaterial {
    pub fn hex(text: impl Into<String>) -> Self {
        KeyMaterial {
            text: text.into(),
            encoding: KeyEncoding::Hex,
        }
    }

    pub fn base64(text: impl Into<String>) -> Self {
        KeyMaterial {
            text: text.into(),
            encoding: KeyEncoding::Base64,
        }
    }

    /// Decode into exactly `expected_len` bytes of master key and salt.
    ///
    /// Hex lengths are checked before decoding and reported in digits,
    /// base64 lengths are checked after decoding and reported in octets.
    pub fn decode(&self, expected_len: usize) -> Result<Vec<u8>, ConfigError> {
        let text = self.text.trim();

        match self.encoding {
            KeyEncoding::Hex => {
                let expected = expected_len * 2;
                check_len(expected, text.len(), "digits")?;
                hex::decode(text).map_err(|e| ConfigError::InvalidKey(e.to_string()))
            }
            KeyEncoding::Base64 => {
                let key = BASE64
                    .decode(text)
                    .map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
                check_len(expected_len, key.len(), "octets")?;
                Ok(key)
            }
        }
    }
}

fn check_len(expected: usize, found: usize, unit: &'static str) -> Result<(), ConfigError> {
    if found < expected {
        return Err(ConfigError::KeyTooShort {
            expected,
            found,
            unit,
        });
    }
    if found > expected {
        return Err(ConfigError::KeyTooLong {
            expected,
            found,
            unit,
        });
    }
    Ok(())
}

/// Decode a hex MKI.
pub fn decode_mki(text: &str) -> Result<Vec<u8>, ConfigError> {
    let mki = hex::decode(text.trim()).map_err(|e| ConfigError::InvalidMki(e.to_string()))?;

    if mki.is_empty() {
        return Err(ConfigError::InvalidMki("empty".into()));
    }
    if mki.len() > MAX_MKI_LEN {
        return Err(ConfigError::InvalidMki(format!(
            "longer than {} octets ({})",
            MAX_MKI_LEN,
            mki.len()
        )));
    }

    Ok(mki)
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("encoding", &self.encoding)
            .finish()
    }
}
