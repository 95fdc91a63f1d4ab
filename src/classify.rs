//! Deciding whether a payload is RTP or RTCP.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// What kind of traffic the capture carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    /// Every payload is SRTP.
    #[default]
    Rtp,
    /// Every payload is SRTCP.
    Rtcp,
    /// SRTP and SRTCP on the same transport (RFC 5761).
    RtcpMux,
}

impl OperatingMode {
    /// Whether RTP packets can occur in this mode.
    pub fn includes_rtp(&self) -> bool {
        matches!(self, OperatingMode::Rtp | OperatingMode::RtcpMux)
    }

    /// Whether RTCP packets can occur in this mode.
    pub fn includes_rtcp(&self) -> bool {
        matches!(self, OperatingMode::Rtcp | OperatingMode::RtcpMux)
    }
}

impl FromStr for OperatingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rtp" => Ok(OperatingMode::Rtp),
            "rtcp" => Ok(OperatingMode::Rtcp),
            "rtcp-mux" => Ok(OperatingMode::RtcpMux),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperatingMode::Rtp => "rtp",
            OperatingMode::Rtcp => "rtcp",
            OperatingMode::RtcpMux => "rtcp-mux",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Rtp,
    Rtcp,
}

/// Classify a payload.
///
/// Only the multiplexed mode looks at the bytes. The second byte of an RTCP
/// packet is its packet type, 192-223, which as a 7 bit RTP payload type
/// falls in 64-95 (RFC 5761 section 4). Anything else, including payloads too
/// short to tell, is RTP.
pub fn classify(buf: &[u8], mode: OperatingMode) -> PacketKind {
    match mode {
        OperatingMode::Rtp => PacketKind::Rtp,
        OperatingMode::Rtcp => PacketKind::Rtcp,
        OperatingMode::RtcpMux => {
            if buf.len() < 2 {
                return PacketKind::Rtp;
            }
            let pt = buf[1] & 0x7f;
            if (64..=95).contains(&pt) {
                PacketKind::Rtcp
            } else {
                PacketKind::Rtp
            }
        }
    }
}
