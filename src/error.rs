use std::io;

use thiserror::Error;

use crate::capture::{CaptureError, FilterError};
use crate::srtp::SrtpError;

/// Configuration errors. All of these are fatal before any capture is read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The suite name passed to `-c` is not in the catalogue.
    #[error("Unknown/unsupported crypto suite name {0}")]
    UnknownSuite(String),

    /// Key size requested with `-e` is not 128, 192 or 256.
    #[error("encryption key size must be 128, 192 or 256 ({0})")]
    InvalidKeySize(usize),

    /// Tag size does not match the cipher family.
    #[error("{} tag size must be {} ({tag_size})", tag_family(.aead), tag_expected(.aead))]
    InvalidTagSize { aead: bool, tag_size: usize },

    /// Security services were requested, but no key given.
    #[error("key not provided")]
    MissingKey,

    /// A key was given, but no security services requested.
    #[error("key provided but no security services selected")]
    KeyWithoutServices,

    /// Neither confidentiality nor authentication requested.
    #[error("neither encryption or authentication were selected")]
    NoServicesSelected,

    /// The combination of services and suite makes no sense.
    #[error("{0}")]
    InvalidSuiteCombination(&'static str),

    /// The protection engine lacks a needed capability.
    #[error("{0} not supported by the protection engine")]
    UnsupportedCapability(&'static str),

    /// Too few digits in the key/salt.
    #[error("too few {unit} in key/salt (should be {expected} {unit}, found {found})")]
    KeyTooShort {
        expected: usize,
        found: usize,
        unit: &'static str,
    },

    /// Too many digits in the key/salt.
    #[error("too many {unit} in key/salt (should be {expected} {unit}, found {found})")]
    KeyTooLong {
        expected: usize,
        found: usize,
        unit: &'static str,
    },

    /// Key is not valid hex/base64.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// MKI is not valid hex or too long.
    #[error("invalid mki: {0}")]
    InvalidMki(String),

    /// `-r` without `-s`.
    #[error("setting ROC (-r) requires -s <ssrc>")]
    RolloverRequiresSsrc,

    /// `-m` is not one of rtp, rtcp, rtcp-mux.
    #[error("Unknown/unsupported mode {0}")]
    UnknownMode(String),

    /// `-s` could not be parsed.
    #[error("invalid ssrc {0}")]
    InvalidSsrc(String),

    /// Filter expression longer than allowed.
    #[error("filter bigger than {max} characters ({len})")]
    FilterTooLong { len: usize, max: usize },

    /// Capture path longer than allowed.
    #[error("pcap file path bigger than {max} characters ({len})")]
    PathTooLong { len: usize, max: usize },

    /// `-d` names a module the engine doesn't have.
    #[error("set debug module ({0}) failed")]
    UnknownDebugModule(String),
}

fn tag_family(aead: &bool) -> &'static str {
    if *aead {
        "GCM"
    } else {
        "non GCM"
    }
}

fn tag_expected(aead: &bool) -> &'static str {
    if *aead {
        "16"
    } else {
        "4 or 10"
    }
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad command line or policy.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The protection engine failed to set up a context.
    #[error("init failed: {0}")]
    Engine(#[from] SrtpError),

    /// The capture could not be opened or read.
    #[error("{0}")]
    Capture(#[from] CaptureError),

    /// The filter expression did not compile.
    #[error("{0}")]
    Filter(#[from] FilterError),

    /// Writing the decoded output failed.
    #[error("{0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Filter(_) => 2,
            _ => 1,
        }
    }
}
