//! Diagnostic output of the protection engine.
//!
//! The engine doesn't log through `tracing` directly. It reports to a single
//! handler installed by the application, and per-module debug output is only
//! produced for modules that have been switched on.

use std::fmt;
use std::sync::Arc;

/// Severity of an engine message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// Single character tag, `e`, `w`, `i` or `d`.
    pub fn as_char(&self) -> char {
        match self {
            LogLevel::Error => 'e',
            LogLevel::Warning => 'w',
            LogLevel::Info => 'i',
            LogLevel::Debug => 'd',
        }
    }
}

/// Engine subsystems that can produce debug output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugModule {
    Srtp,
    AesIcm,
    AesGcm,
    HmacSha1,
    NullCipher,
    Kdf,
    ReplayDb,
}

impl DebugModule {
    pub const ALL: [DebugModule; 7] = [
        DebugModule::Srtp,
        DebugModule::AesIcm,
        DebugModule::AesGcm,
        DebugModule::HmacSha1,
        DebugModule::NullCipher,
        DebugModule::Kdf,
        DebugModule::ReplayDb,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DebugModule::Srtp => "srtp",
            DebugModule::AesIcm => "aes icm",
            DebugModule::AesGcm => "aes gcm",
            DebugModule::HmacSha1 => "hmac sha-1",
            DebugModule::NullCipher => "null cipher",
            DebugModule::Kdf => "kdf",
            DebugModule::ReplayDb => "replay db",
        }
    }

    pub fn from_name(name: &str) -> Option<DebugModule> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    fn bit(&self) -> u16 {
        1 << *self as u16
    }
}

impl fmt::Display for DebugModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Callback receiving engine messages.
pub type LogHandler = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Handler plus the set of enabled debug modules.
///
/// Cloned into every session created by the engine.
#[derive(Clone, Default)]
pub struct EngineLog {
    handler: Option<LogHandler>,
    enabled: u16,
}

impl EngineLog {
    pub fn set_handler(&mut self, handler: LogHandler) {
        self.handler = Some(handler);
    }

    pub fn set_enabled(&mut self, module: DebugModule, on: bool) {
        if on {
            self.enabled |= module.bit();
        } else {
            self.enabled &= !module.bit();
        }
    }

    pub fn is_enabled(&self, module: DebugModule) -> bool {
        self.enabled & module.bit() != 0
    }

    pub fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if let Some(handler) = &self.handler {
            handler(level, &args.to_string());
        }
    }

    /// Debug output for `module`, dropped unless the module is on.
    pub fn debug(&self, module: DebugModule, args: fmt::Arguments<'_>) {
        if self.is_enabled(module) {
            self.log(LogLevel::Debug, format_args!("{}: {}", module, args));
        }
    }
}

impl fmt::Debug for EngineLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLog")
            .field("handler", &self.handler.is_some())
            .field("enabled", &self.enabled)
            .finish()
    }
}
