//! Command line configuration.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use pcap_file::DataLink;

use crate::capture::default_payload_offset;
use crate::classify::OperatingMode;
use crate::error::ConfigError;
use crate::key::{decode_mki, KeyMaterial};
use crate::policy::{PolicyRequest, SecurityServices, SsrcRestriction};
use crate::suite::CryptoSuite;

/// Longest accepted capture filter.
pub const MAX_FILTER_LEN: usize = 256;

/// Longest accepted capture file path.
pub const MAX_PATH_LEN: usize = 255;

/// Decode SRTP/SRTCP packets from a pcap capture.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "rtp_decoder",
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Args {
    /// Set the SRTP master key given in hexadecimal
    #[arg(short = 'k', value_name = "KEY", conflicts_with = "key_base64")]
    pub key_hex: Option<String>,

    /// Set the SRTP master key given in base64
    #[arg(short = 'b', value_name = "KEY")]
    pub key_base64: Option<String>,

    /// Use encryption with this key size (128, 192 or 256)
    #[arg(short = 'e', value_name = "KEY SIZE")]
    pub key_size: Option<usize>,

    /// Tag size to use (4 or 10, in GCM mode 16)
    #[arg(short = 't', value_name = "TAG SIZE")]
    pub tag_size: Option<usize>,

    /// Use message authentication
    #[arg(short = 'a')]
    pub auth: bool,

    /// Use AES-GCM mode (must be used with -e)
    #[arg(short = 'g')]
    pub gcm: bool,

    /// Set key and tag size from an RFC 4568 crypto suite name
    #[arg(short = 'c', value_name = "SUITE")]
    pub suite: Option<String>,

    /// One of rtp, rtcp or rtcp-mux
    #[arg(short = 'm', value_name = "MODE", default_value = "rtp")]
    pub mode: String,

    /// Master key index in hexadecimal
    #[arg(short = 'i', value_name = "MKI")]
    pub mki: Option<String>,

    /// Capture filter, to select only the SRTP packets
    #[arg(short = 'f', value_name = "FILTER")]
    pub filter: Option<String>,

    /// Path to the pcap file, - for stdin
    #[arg(short = 'p', value_name = "PCAP FILE", default_value = "-")]
    pub pcap_file: String,

    /// Byte offset of the RTP packet in each frame (default depends on the link type)
    #[arg(short = 'o', value_name = "OFFSET")]
    pub offset: Option<usize>,

    /// Only decrypt this SSRC (decimal, 0x hex or 0 octal)
    #[arg(short = 's', value_name = "SSRC")]
    pub ssrc: Option<String>,

    /// Initial rollover counter, requires -s
    #[arg(short = 'r', value_name = "ROC")]
    pub roc: Option<u32>,

    /// List debug modules and exit
    #[arg(short = 'l')]
    pub list_debug_modules: bool,

    /// Turn on debugging for a module (repeatable)
    #[arg(short = 'd', value_name = "DEBUG", action = ArgAction::Append)]
    pub debug_modules: Vec<String>,
}

impl Args {
    /// Checks that don't depend on the policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(f) = &self.filter {
            if f.len() > MAX_FILTER_LEN {
                return Err(ConfigError::FilterTooLong {
                    len: f.len(),
                    max: MAX_FILTER_LEN,
                });
            }
        }

        if self.pcap_file.len() > MAX_PATH_LEN {
            return Err(ConfigError::PathTooLong {
                len: self.pcap_file.len(),
                max: MAX_PATH_LEN,
            });
        }

        self.operating_mode()?;

        Ok(())
    }

    pub fn operating_mode(&self) -> Result<OperatingMode, ConfigError> {
        self.mode.parse()
    }

    pub fn pcap_path(&self) -> PathBuf {
        PathBuf::from(&self.pcap_file)
    }

    pub fn filter_expr(&self) -> &str {
        self.filter.as_deref().unwrap_or("")
    }

    /// Offset of the RTP packet, explicit or derived from the link type.
    pub fn payload_offset(&self, datalink: DataLink) -> usize {
        self.offset
            .unwrap_or_else(|| default_payload_offset(datalink))
    }

    /// Turn the flags into a policy request. A crypto suite overrides the
    /// individual key size, tag size and GCM flags.
    pub fn policy_request(&self) -> Result<PolicyRequest, ConfigError> {
        let mut req = PolicyRequest::default();

        if let Some(bits) = self.key_size {
            if !matches!(bits, 128 | 192 | 256) {
                return Err(ConfigError::InvalidKeySize(bits));
            }
            req.key_size_bits = bits;
            req.services = req.services | SecurityServices::CONF;
        }

        req.tag_size = self.tag_size;

        if self.auth {
            req.services = req.services | SecurityServices::AUTH;
        }

        if self.gcm {
            req.aead = true;
            req.services = req.services | SecurityServices::AUTH;
        }

        if let Some(name) = &self.suite {
            let suite =
                CryptoSuite::lookup(name).ok_or_else(|| ConfigError::UnknownSuite(name.clone()))?;
            req.apply_suite(suite);
        }

        req.key = match (&self.key_hex, &self.key_base64) {
            (Some(k), _) => Some(KeyMaterial::hex(k.as_str())),
            (None, Some(k)) => Some(KeyMaterial::base64(k.as_str())),
            (None, None) => None,
        };

        req.mki = self.mki.as_deref().map(decode_mki).transpose()?;

        if let Some(s) = &self.ssrc {
            req.ssrc = SsrcRestriction::Specific(parse_ssrc(s)?);
        }

        req.roc = self.roc;

        Ok(req)
    }
}

/// Parse an SSRC like `strtol(s, NULL, 0)`: decimal, `0x` hex or `0` octal,
/// with an optional sign. Negative values wrap to their 32 bit pattern.
pub fn parse_ssrc(s: &str) -> Result<u32, ConfigError> {
    let err = || ConfigError::InvalidSsrc(s.to_string());

    let t = s.trim_start();
    let (negative, t) = match t.as_bytes().first() {
        Some(b'-') => (true, &t[1..]),
        Some(b'+') => (false, &t[1..]),
        _ => (false, t),
    };

    let (digits, radix) = if let Some(h) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        (h, 16)
    } else if t.len() > 1 && t.starts_with('0') {
        (&t[1..], 8)
    } else {
        (t, 10)
    };

    let v = u64::from_str_radix(digits, radix).map_err(|_| err())?;
    if v > u32::MAX as u64 {
        return Err(err());
    }

    let v = v as u32;
    Ok(if negative { v.wrapping_neg() } else { v })
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        let mut v = vec!["rtp_decoder"];
        v.extend_from_slice(argv);
        Args::try_parse_from(v).unwrap()
    }

    const KEY: &str = "e1f97a0d3e018be0d64fa32c06de41390ec675ad498afeebb6960b3aabe6";

    #[test]
    fn defaults() {
        let a = args(&[]);
        assert_eq!(a.pcap_file, "-");
        assert_eq!(a.operating_mode(), Ok(OperatingMode::Rtp));
        assert_eq!(a.payload_offset(DataLink::ETHERNET), 42);
        assert!(a.debug_modules.is_empty());
    }

    #[test]
    fn offset_overrides_link_type() {
        let a = args(&["-o", "12"]);
        assert_eq!(a.payload_offset(DataLink::ETHERNET), 12);
        assert_eq!(a.payload_offset(DataLink::LINUX_SLL), 12);
    }

    #[test]
    fn key_size_and_auth() {
        let a = args(&["-e", "128", "-a", "-k", KEY]);
        let req = a.policy_request().unwrap();
        assert_eq!(req.services, SecurityServices::CONF_AND_AUTH);
        assert_eq!(req.key_size_bits, 128);
        assert!(!req.aead);
        assert_eq!(req.key, Some(KeyMaterial::hex(KEY)));
    }

    #[test]
    fn gcm_implies_auth() {
        let a = args(&["-g", "-e", "256", "-t", "16"]);
        let req = a.policy_request().unwrap();
        assert!(req.aead);
        assert_eq!(req.services, SecurityServices::CONF_AND_AUTH);
        assert_eq!(req.tag_size, Some(16));
    }

    #[test]
    fn bad_key_size() {
        let a = args(&["-e", "64"]);
        assert_eq!(a.policy_request(), Err(ConfigError::InvalidKeySize(64)));
    }

    #[test]
    fn suite_overrides_manual_settings() {
        let a = args(&["-e", "256", "-t", "4", "-c", "aead_aes_128_gcm"]);
        let req = a.policy_request().unwrap();
        assert!(req.aead);
        assert_eq!(req.key_size_bits, 128);
        assert_eq!(req.tag_size, Some(16));
        assert_eq!(req.services, SecurityServices::CONF_AND_AUTH);
    }

    #[test]
    fn unknown_suite() {
        let a = args(&["-c", "AES_CM_128_HMAC_SHA1_64"]);
        assert_eq!(
            a.policy_request(),
            Err(ConfigError::UnknownSuite("AES_CM_128_HMAC_SHA1_64".into()))
        );
    }

    #[test]
    fn base64_key() {
        let a = args(&["-a", "-b", "4fl6DT4Bi+DWT6MsBt5BOQ7Gda1Jiv7rtpYLOqvm"]);
        let req = a.policy_request().unwrap();
        assert_eq!(
            req.key,
            Some(KeyMaterial::base64("4fl6DT4Bi+DWT6MsBt5BOQ7Gda1Jiv7rtpYLOqvm"))
        );
    }

    #[test]
    fn hex_and_base64_conflict() {
        let r = Args::try_parse_from(["rtp_decoder", "-k", "00", "-b", "AA=="]);
        assert!(r.is_err());
    }

    #[test]
    fn mki_ssrc_roc() {
        let a = args(&["-a", "-k", KEY, "-i", "cafe", "-s", "0xdeadbeef", "-r", "7"]);
        let req = a.policy_request().unwrap();
        assert_eq!(req.mki, Some(vec![0xca, 0xfe]));
        assert_eq!(req.ssrc, SsrcRestriction::Specific(0xdeadbeef));
        assert_eq!(req.roc, Some(7));
    }

    #[test]
    fn bad_mki() {
        let a = args(&["-i", "xyz"]);
        assert!(matches!(a.policy_request(), Err(ConfigError::InvalidMki(_))));
    }

    #[test]
    fn repeated_debug_modules() {
        let a = args(&["-d", "srtp", "-d", "aes icm"]);
        assert_eq!(a.debug_modules, vec!["srtp", "aes icm"]);
    }

    #[test]
    fn length_limits() {
        let a = args(&["-f", &"x".repeat(MAX_FILTER_LEN)]);
        assert_eq!(a.validate(), Ok(()));

        let a = args(&["-f", &"x".repeat(MAX_FILTER_LEN + 1)]);
        assert_eq!(
            a.validate(),
            Err(ConfigError::FilterTooLong { len: 257, max: 256 })
        );

        let a = args(&["-p", &"p".repeat(MAX_PATH_LEN + 1)]);
        assert_eq!(
            a.validate(),
            Err(ConfigError::PathTooLong { len: 256, max: 255 })
        );
    }

    #[test]
    fn bad_mode() {
        let a = args(&["-m", "mux"]);
        assert_eq!(a.validate(), Err(ConfigError::UnknownMode("mux".into())));
    }

    #[test]
    fn ssrc_formats() {
        assert_eq!(parse_ssrc("1234"), Ok(1234));
        assert_eq!(parse_ssrc("0x1A2b"), Ok(0x1a2b));
        assert_eq!(parse_ssrc("0X10"), Ok(16));
        assert_eq!(parse_ssrc("017"), Ok(15));
        assert_eq!(parse_ssrc("0"), Ok(0));
        assert_eq!(parse_ssrc("  42"), Ok(42));
        assert_eq!(parse_ssrc("+5"), Ok(5));
        assert_eq!(parse_ssrc("-1"), Ok(0xffff_ffff));
        assert_eq!(parse_ssrc("4294967295"), Ok(u32::MAX));
        assert!(parse_ssrc("4294967296").is_err());
        assert!(parse_ssrc("08").is_err());
        assert!(parse_ssrc("ssrc").is_err());
        assert!(parse_ssrc("").is_err());
    }
}
