//! Turning command line knobs into a fully specified protection policy.

use std::fmt;
use std::ops::BitOr;

use crate::error::ConfigError;
use crate::key::KeyMaterial;
use crate::srtp::Capabilities;
use crate::suite::CryptoSuite;
use crate::util::Pii;

/// Replay window used for every stream.
pub const REPLAY_WINDOW_SIZE: usize = 128;

/// Security services requested for a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SecurityServices {
    conf: bool,
    auth: bool,
}

impl SecurityServices {
    pub const NONE: SecurityServices = SecurityServices {
        conf: false,
        auth: false,
    };
    pub const CONF: SecurityServices = SecurityServices {
        conf: true,
        auth: false,
    };
    pub const AUTH: SecurityServices = SecurityServices {
        conf: false,
        auth: true,
    };
    pub const CONF_AND_AUTH: SecurityServices = SecurityServices {
        conf: true,
        auth: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.conf && !self.auth
    }

    pub fn confidentiality(&self) -> bool {
        self.conf
    }

    pub fn authentication(&self) -> bool {
        self.auth
    }
}

impl BitOr for SecurityServices {
    type Output = SecurityServices;

    fn bitor(self, rhs: Self) -> Self::Output {
        SecurityServices {
            conf: self.conf || rhs.conf,
            auth: self.auth || rhs.auth,
        }
    }
}

impl fmt::Display for SecurityServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.conf, self.auth) {
            (true, true) => write!(f, "confidentiality message authentication"),
            (true, false) => write!(f, "confidentiality"),
            (false, true) => write!(f, "message authentication"),
            (false, false) => write!(f, "none"),
        }
    }
}

/// Cipher used for one direction (RTP or RTCP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherType {
    Null,
    AesIcm128,
    AesIcm192,
    AesIcm256,
    AesGcm128,
    AesGcm256,
}

impl CipherType {
    /// Length of the master key part (without salt).
    pub fn master_key_len(&self) -> usize {
        match self {
            CipherType::Null | CipherType::AesIcm128 | CipherType::AesGcm128 => 16,
            CipherType::AesIcm192 => 24,
            CipherType::AesIcm256 | CipherType::AesGcm256 => 32,
        }
    }

    /// Length of the master salt.
    pub fn master_salt_len(&self) -> usize {
        if self.is_aead() {
            12
        } else {
            14
        }
    }

    /// Session encryption key length. 0 for the null cipher.
    pub fn session_key_len(&self) -> usize {
        match self {
            CipherType::Null => 0,
            _ => self.master_key_len(),
        }
    }

    pub fn is_aead(&self) -> bool {
        matches!(self, CipherType::AesGcm128 | CipherType::AesGcm256)
    }
}

impl fmt::Display for CipherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CipherType::Null => "NULL",
            CipherType::AesIcm128 => "AES-ICM-128",
            CipherType::AesIcm192 => "AES-ICM-192",
            CipherType::AesIcm256 => "AES-ICM-256",
            CipherType::AesGcm128 => "AES-GCM-128",
            CipherType::AesGcm256 => "AES-GCM-256",
        };
        write!(f, "{s}")
    }
}

/// Authentication function for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthType {
    Null,
    HmacSha1,
}

/// Cipher and authentication parameters for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CryptoPolicy {
    pub cipher: CipherType,
    /// Master key plus salt length in bytes.
    pub cipher_key_len: usize,
    pub auth: AuthType,
    pub auth_key_len: usize,
    pub auth_tag_len: usize,
    pub sec_serv: SecurityServices,
}

impl CryptoPolicy {
    const fn new(
        cipher: CipherType,
        cipher_key_len: usize,
        auth: AuthType,
        auth_tag_len: usize,
        sec_serv: SecurityServices,
    ) -> Self {
        let auth_key_len = match auth {
            AuthType::Null => 0,
            AuthType::HmacSha1 => 20,
        };
        CryptoPolicy {
            cipher,
            cipher_key_len,
            auth,
            auth_key_len,
            auth_tag_len,
            sec_serv,
        }
    }

    pub const fn aes_cm_128_hmac_sha1_80() -> Self {
        use CipherType::*;
        Self::new(AesIcm128, 30, AuthType::HmacSha1, 10, SecurityServices::CONF_AND_AUTH)
    }

    pub const fn aes_cm_128_hmac_sha1_32() -> Self {
        use CipherType::*;
        Self::new(AesIcm128, 30, AuthType::HmacSha1, 4, SecurityServices::CONF_AND_AUTH)
    }

    pub const fn aes_cm_192_hmac_sha1_80() -> Self {
        use CipherType::*;
        Self::new(AesIcm192, 38, AuthType::HmacSha1, 10, SecurityServices::CONF_AND_AUTH)
    }

    pub const fn aes_cm_192_hmac_sha1_32() -> Self {
        use CipherType::*;
        Self::new(AesIcm192, 38, AuthType::HmacSha1, 4, SecurityServices::CONF_AND_AUTH)
    }

    pub const fn aes_cm_256_hmac_sha1_80() -> Self {
        use CipherType::*;
        Self::new(AesIcm256, 46, AuthType::HmacSha1, 10, SecurityServices::CONF_AND_AUTH)
    }

    pub const fn aes_cm_256_hmac_sha1_32() -> Self {
        use CipherType::*;
        Self::new(AesIcm256, 46, AuthType::HmacSha1, 4, SecurityServices::CONF_AND_AUTH)
    }

    pub const fn aes_cm_128_null_auth() -> Self {
        use CipherType::*;
        Self::new(AesIcm128, 30, AuthType::Null, 0, SecurityServices::CONF)
    }

    pub const fn aes_cm_192_null_auth() -> Self {
        use CipherType::*;
        Self::new(AesIcm192, 38, AuthType::Null, 0, SecurityServices::CONF)
    }

    pub const fn aes_cm_256_null_auth() -> Self {
        use CipherType::*;
        Self::new(AesIcm256, 46, AuthType::Null, 0, SecurityServices::CONF)
    }

    pub const fn null_cipher_hmac_sha1_80() -> Self {
        use CipherType::*;
        Self::new(Null, 30, AuthType::HmacSha1, 10, SecurityServices::AUTH)
    }

    pub const fn aes_gcm_128_16_auth() -> Self {
        use CipherType::*;
        Self::new(AesGcm128, 28, AuthType::Null, 16, SecurityServices::CONF_AND_AUTH)
    }

    pub const fn aes_gcm_256_16_auth() -> Self {
        use CipherType::*;
        Self::new(AesGcm256, 44, AuthType::Null, 16, SecurityServices::CONF_AND_AUTH)
    }

    pub const fn rtcp_default() -> Self {
        Self::aes_cm_128_hmac_sha1_80()
    }
}

/// Which SSRCs the policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SsrcRestriction {
    /// Any SSRC seen on incoming packets.
    AnyInbound,
    /// Exactly this SSRC.
    Specific(u32),
}

/// A fully populated policy, ready to hand to the protection engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionPolicy {
    pub rtp: CryptoPolicy,
    pub rtcp: CryptoPolicy,
    /// Master key followed by master salt.
    pub master_key: Vec<u8>,
    /// Master key identifier, if packets carry one.
    pub mki: Option<Vec<u8>>,
    pub ssrc: SsrcRestriction,
    /// Initial rollover counter. Only set for [`SsrcRestriction::Specific`].
    pub roc: Option<u32>,
    pub window_size: usize,
    pub allow_repeat_tx: bool,
}

impl ProtectionPolicy {
    pub fn use_mki(&self) -> bool {
        self.mki.is_some()
    }

    /// Split of master key into (key, salt) as used for RTP.
    pub fn key_and_salt(&self) -> (&[u8], &[u8]) {
        let key_len = self.rtp.cipher.master_key_len().min(self.master_key.len());
        self.master_key.split_at(key_len)
    }
}

/// Everything the user asked for, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRequest {
    pub services: SecurityServices,
    /// AES-GCM requested.
    pub aead: bool,
    pub key_size_bits: usize,
    /// Tag size in bytes. `None` picks the default for the cipher family.
    pub tag_size: Option<usize>,
    pub key: Option<KeyMaterial>,
    pub mki: Option<Vec<u8>>,
    pub ssrc: SsrcRestriction,
    pub roc: Option<u32>,
}

impl Default for PolicyRequest {
    fn default() -> Self {
        PolicyRequest {
            services: SecurityServices::NONE,
            aead: false,
            key_size_bits: 128,
            tag_size: None,
            key: None,
            mki: None,
            ssrc: SsrcRestriction::AnyInbound,
            roc: None,
        }
    }
}

impl PolicyRequest {
    /// Apply a crypto suite. Overrides key size, tag size and AEAD, and
    /// requests both confidentiality and authentication.
    pub fn apply_suite(&mut self, suite: &CryptoSuite) {
        self.key_size_bits = suite.key_size_bits;
        self.tag_size = Some(suite.tag_size_bytes);
        self.aead = suite.uses_aead;
        self.services = self.services | SecurityServices::CONF_AND_AUTH;
    }

    /// The tag size to use, validated against the cipher family.
    pub fn resolved_tag_size(&self) -> Result<usize, ConfigError> {
        let tag_size = match self.tag_size {
            None | Some(0) if self.aead => 16,
            None | Some(0) => 10,
            Some(v) => v,
        };

        let ok = if self.aead {
            tag_size == 16
        } else {
            tag_size == 4 || tag_size == 10
        };

        if !ok {
            return Err(ConfigError::InvalidTagSize {
                aead: self.aead,
                tag_size,
            });
        }

        Ok(tag_size)
    }

    /// Check that a key is given if and only if services are requested.
    pub fn check_key_presence(&self) -> Result<(), ConfigError> {
        match (self.services.is_empty(), self.key.is_some()) {
            (false, false) => Err(ConfigError::MissingKey),
            (true, true) => Err(ConfigError::KeyWithoutServices),
            (true, false) => Err(ConfigError::NoServicesSelected),
            (false, true) => Ok(()),
        }
    }
}

/// Resolve a request into a policy.
///
/// The rules are applied in a fixed order: tag size, key presence, cipher
/// selection, key decoding and finally the rollover counter. Resolution is a
/// pure function of its inputs.
pub fn resolve(
    req: &PolicyRequest,
    caps: Capabilities,
) -> Result<ProtectionPolicy, ConfigError> {
    let tag_size = req.resolved_tag_size()?;

    req.check_key_presence()?;

    let (mut rtp, mut rtcp) = select_crypto(req, tag_size, caps)?;

    rtp.sec_serv = req.services;
    rtcp.sec_serv = req.services;
    // RTP tag length follows the request even for null auth. RTCP keeps its own.
    rtp.auth_tag_len = tag_size;

    debug!("setting tag len {}", tag_size);

    let Some(key) = &req.key else {
        return Err(ConfigError::MissingKey);
    };

    let master_key = key.decode(rtp.cipher_key_len)?;

    let key_octets = rtp.cipher.master_key_len();
    info!(
        "set master key/salt to {}/{}",
        Pii(hex::encode(&master_key[..key_octets])),
        Pii(hex::encode(&master_key[key_octets..]))
    );

    if let Some(mki) = &req.mki {
        info!("set mki to {}", Pii(hex::encode(mki)));
    }

    if req.roc.is_some() && !matches!(req.ssrc, SsrcRestriction::Specific(_)) {
        return Err(ConfigError::RolloverRequiresSsrc);
    }

    Ok(ProtectionPolicy {
        rtp,
        rtcp,
        master_key,
        mki: req.mki.clone(),
        ssrc: req.ssrc,
        roc: req.roc,
        window_size: REPLAY_WINDOW_SIZE,
        allow_repeat_tx: false,
    })
}

fn select_crypto(
    req: &PolicyRequest,
    tag_size: usize,
    caps: Capabilities,
) -> Result<(CryptoPolicy, CryptoPolicy), ConfigError> {
    let conf = req.services.confidentiality();
    let auth = req.services.authentication();

    if req.key_size_bits == 192 && (conf || req.aead) && !caps.aes_192 {
        return Err(ConfigError::UnsupportedCapability("AES 192 mode"));
    }

    let pair = match (conf, auth) {
        (true, true) if req.aead => {
            if !caps.aead {
                return Err(ConfigError::UnsupportedCapability("GCM mode"));
            }
            let p = gcm(req.key_size_bits)?;
            (p, p)
        }
        (true, true) => {
            let rtcp = hmac_sha1_80(req.key_size_bits)?;
            let rtp = if tag_size == 4 {
                hmac_sha1_32(req.key_size_bits)?
            } else {
                rtcp
            };
            (rtp, rtcp)
        }
        (true, false) => {
            if req.aead {
                return Err(ConfigError::InvalidSuiteCombination(
                    "GCM mode must always be used with auth enabled",
                ));
            }
            let rtp = match req.key_size_bits {
                128 => CryptoPolicy::aes_cm_128_null_auth(),
                192 => CryptoPolicy::aes_cm_192_null_auth(),
                256 => CryptoPolicy::aes_cm_256_null_auth(),
                v => return Err(ConfigError::InvalidKeySize(v)),
            };
            (rtp, hmac_sha1_80(req.key_size_bits)?)
        }
        (false, true) if req.aead => {
            if !caps.aead {
                return Err(ConfigError::UnsupportedCapability("GCM mode"));
            }
            let mut p = gcm(req.key_size_bits)?;
            p.sec_serv = SecurityServices::AUTH;
            (p, p)
        }
        (false, true) => (
            CryptoPolicy::null_cipher_hmac_sha1_80(),
            CryptoPolicy::rtcp_default(),
        ),
        (false, false) => return Err(ConfigError::NoServicesSelected),
    };

    Ok(pair)
}

fn gcm(key_size_bits: usize) -> Result<CryptoPolicy, ConfigError> {
    match key_size_bits {
        128 => Ok(CryptoPolicy::aes_gcm_128_16_auth()),
        256 => Ok(CryptoPolicy::aes_gcm_256_16_auth()),
        _ => Err(ConfigError::InvalidSuiteCombination(
            "GCM mode requires a 128 or 256 bit key",
        )),
    }
}

fn hmac_sha1_80(key_size_bits: usize) -> Result<CryptoPolicy, ConfigError> {
    match key_size_bits {
        128 => Ok(CryptoPolicy::aes_cm_128_hmac_sha1_80()),
        192 => Ok(CryptoPolicy::aes_cm_192_hmac_sha1_80()),
        256 => Ok(CryptoPolicy::aes_cm_256_hmac_sha1_80()),
        v => Err(ConfigError::InvalidKeySize(v)),
    }
}

fn hmac_sha1_32(key_size_bits: usize) -> Result<CryptoPolicy, ConfigError> {
    match key_size_bits {
        128 => Ok(CryptoPolicy::aes_cm_128_hmac_sha1_32()),
        192 => Ok(CryptoPolicy::aes_cm_192_hmac_sha1_32()),
        256 => Ok(CryptoPolicy::aes_cm_256_hmac_sha1_32()),
        v => Err(ConfigError::InvalidKeySize(v)),
    }
}
