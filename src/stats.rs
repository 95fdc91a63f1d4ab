//! Run statistics.

use std::fmt;
use std::time::Duration;

use crate::classify::OperatingMode;

/// Counters and timing for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Frames handed to the decoder, including skipped ones.
    pub frames: u64,
    pub rtp_decoded: u64,
    pub rtcp_decoded: u64,
    pub errors: u64,
    /// Timestamp of the first frame.
    pub start: Option<Duration>,
}

impl RunStats {
    /// Count a frame. The first frame latches the reference time.
    pub(crate) fn frame_seen(&mut self, timestamp: Duration) {
        self.frames += 1;
        if self.start.is_none() {
            self.start = Some(timestamp);
        }
    }

    /// Time since the first frame. Frames stamped before it count as zero.
    pub fn elapsed(&self, timestamp: Duration) -> Duration {
        match self.start {
            Some(start) => timestamp.saturating_sub(start),
            None => Duration::ZERO,
        }
    }

    /// End of run summary for `mode`.
    pub fn summary(&self, mode: OperatingMode) -> Summary<'_> {
        Summary { stats: self, mode }
    }
}

/// Summary lines, scoped to the packet kinds of the mode.
pub struct Summary<'a> {
    stats: &'a RunStats,
    mode: OperatingMode,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode.includes_rtp() {
            writeln!(f, "RTP packets decoded: {}", self.stats.rtp_decoded)?;
        }
        if self.mode.includes_rtcp() {
            writeln!(f, "RTCP packets decoded: {}", self.stats.rtcp_decoded)?;
        }
        write!(f, "Packet decode errors: {}", self.stats.errors)
    }
}
