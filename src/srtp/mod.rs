//! SRTP/SRTCP protection engine (RFC 3711, RFC 6188, RFC 7714).
//!
//! The decoder talks to the engine through [`ProtectionEngine`] and
//! [`ProtectionContext`]. [`SrtpEngine`] is the OpenSSL backed implementation.

use std::io::{self, Write};

use openssl::error::ErrorStack;
use thiserror::Error;

use crate::policy::ProtectionPolicy;

mod auth;
mod cipher;
mod header;
mod kdf;
mod log;
mod replay;
mod session;

pub use header::RtpHeader;
pub use log::{DebugModule, LogHandler, LogLevel};
pub use session::SrtpSession;

use log::EngineLog;

/// Errors from the protection engine.
#[derive(Debug, Error)]
pub enum SrtpError {
    /// A policy or key parameter is not usable.
    #[error("bad parameter: {0}")]
    BadParam(&'static str),

    /// No debug module with that name.
    #[error("no debug module named {0}")]
    NoSuchModule(String),

    /// Packet too short or malformed.
    #[error("{0}")]
    Parse(&'static str),

    /// Authentication tag did not verify.
    #[error("authentication failure")]
    AuthFail,

    /// Packet index already seen.
    #[error("replay check failed (bitmask)")]
    ReplayFail,

    /// Packet index is behind the replay window.
    #[error("replay check failed (index too old)")]
    ReplayOld,

    /// No stream for this SSRC.
    #[error("no appropriate context found for ssrc {0:#010x}")]
    NoContext(u32),

    /// The MKI in the packet is not the configured one.
    #[error("MKI does not match")]
    BadMki,

    /// The SRTCP E flag disagrees with the confidentiality service.
    #[error("unable to perform desired validation")]
    CantCheck,

    /// Some error from OpenSSL layer (used for SRTP).
    #[error("{0}")]
    OpenSsl(#[from] ErrorStack),
}

/// Optional features an engine may lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// AES-GCM suites.
    pub aead: bool,
    /// AES-192 counter mode.
    pub aes_192: bool,
}

/// Creates protection contexts from resolved policies.
pub trait ProtectionEngine {
    type Context: ProtectionContext;

    /// What this engine supports. Queried before a policy is resolved.
    fn capabilities(&self) -> Capabilities;

    /// Create a context for `policy`.
    fn create(&self, policy: &ProtectionPolicy) -> Result<Self::Context, SrtpError>;
}

/// A live protection context. Packets go in protected and come out clear.
pub trait ProtectionContext {
    /// Verify and decrypt an SRTP packet.
    fn unprotect(&mut self, buf: &[u8]) -> Result<Vec<u8>, SrtpError>;

    /// Verify and decrypt an SRTCP packet.
    fn unprotect_rtcp(&mut self, buf: &[u8]) -> Result<Vec<u8>, SrtpError>;

    /// Set the rollover counter assumed for the next packet of `ssrc`.
    fn set_rollover_counter(&mut self, ssrc: u32, roc: u32) -> Result<(), SrtpError>;
}

/// OpenSSL backed SRTP engine.
#[derive(Debug, Default)]
pub struct SrtpEngine {
    log: EngineLog,
}

impl SrtpEngine {
    pub fn new() -> Self {
        SrtpEngine::default()
    }

    /// Engine identification, as printed in the startup banner.
    pub fn version() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            openssl::version::version()
        )
    }

    /// Route engine messages to `handler`. Replaces any earlier handler.
    pub fn install_log_handler<F>(&mut self, handler: F)
    where
        F: Fn(LogLevel, &str) + Send + Sync + 'static,
    {
        self.log.set_handler(std::sync::Arc::new(handler));
    }

    /// Switch debug output of a module on or off.
    pub fn set_debug_module(&mut self, name: &str, on: bool) -> Result<(), SrtpError> {
        let module =
            DebugModule::from_name(name).ok_or_else(|| SrtpError::NoSuchModule(name.into()))?;
        self.log.set_enabled(module, on);
        Ok(())
    }

    /// All debug modules and whether they are on.
    pub fn debug_modules(&self) -> impl Iterator<Item = (DebugModule, bool)> + '_ {
        DebugModule::ALL
            .into_iter()
            .map(|m| (m, self.log.is_enabled(m)))
    }

    /// Write the debug module listing shown by `-l`.
    pub fn write_debug_modules(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "debug modules loaded:")?;
        for (module, on) in self.debug_modules() {
            writeln!(out, "  {} ({})", module, if on { "on" } else { "off" })?;
        }
        Ok(())
    }
}

impl ProtectionEngine for SrtpEngine {
    type Context = SrtpSession;

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            aead: true,
            aes_192: true,
        }
    }

    fn create(&self, policy: &ProtectionPolicy) -> Result<SrtpSession, SrtpError> {
        SrtpSession::new(policy, self.log.clone())
    }
}
