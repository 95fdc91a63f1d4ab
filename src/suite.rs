//! RFC 4568 style crypto suite names.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

/// A crypto suite as named in SDES `a=crypto` lines.
///
/// The suite fixes the master key size and the RTP authentication tag size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoSuite {
    /// Canonical upper case name, e.g. `AES_CM_128_HMAC_SHA1_80`.
    pub name: &'static str,
    /// Whether the suite is an AEAD (AES-GCM) suite.
    pub uses_aead: bool,
    /// Master key size in bits. One of 128, 192 or 256.
    pub key_size_bits: usize,
    /// Authentication tag size in bytes.
    pub tag_size_bytes: usize,
}

#[rustfmt::skip]
const SUITES: &[CryptoSuite] = &[
    CryptoSuite { name: "AES_CM_128_HMAC_SHA1_32", uses_aead: false, key_size_bits: 128, tag_size_bytes: 4 },
    CryptoSuite { name: "AES_CM_128_HMAC_SHA1_80", uses_aead: false, key_size_bits: 128, tag_size_bytes: 10 },
    CryptoSuite { name: "AES_192_CM_HMAC_SHA1_32", uses_aead: false, key_size_bits: 192, tag_size_bytes: 4 },
    CryptoSuite { name: "AES_192_CM_HMAC_SHA1_80", uses_aead: false, key_size_bits: 192, tag_size_bytes: 10 },
    CryptoSuite { name: "AES_256_CM_HMAC_SHA1_32", uses_aead: false, key_size_bits: 256, tag_size_bytes: 4 },
    CryptoSuite { name: "AES_256_CM_HMAC_SHA1_80", uses_aead: false, key_size_bits: 256, tag_size_bytes: 10 },
    CryptoSuite { name: "AEAD_AES_128_GCM",        uses_aead: true,  key_size_bits: 128, tag_size_bytes: 16 },
    CryptoSuite { name: "AEAD_AES_256_GCM",        uses_aead: true,  key_size_bits: 256, tag_size_bytes: 16 },
];

static BY_NAME: Lazy<HashMap<&'static str, &'static CryptoSuite>> =
    Lazy::new(|| SUITES.iter().map(|s| (s.name, s)).collect());

impl CryptoSuite {
    /// All the suites we know, in catalogue order.
    pub const ALL: &'static [CryptoSuite] = SUITES;

    /// Look up a suite by name. The match is exact but case-insensitive.
    pub fn lookup(name: &str) -> Option<&'static CryptoSuite> {
        BY_NAME.get(name.to_ascii_uppercase().as_str()).copied()
    }
}

impl fmt::Display for CryptoSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
