//! The per-frame decode loop.

use std::io::{self, Write};

use crate::capture::{Frame, FrameSource};
use crate::classify::{classify, OperatingMode, PacketKind};
use crate::output::{write_elapsed, write_hexdump};
use crate::srtp::ProtectionContext;
use crate::stats::RunStats;

/// What happened to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Plaintext recovered and written.
    Decoded(PacketKind),
    /// Not something we can decode. No counters change.
    Skipped(SkipReason),
    /// The engine refused the packet.
    Errored(PacketKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer bytes captured than the payload offset.
    Truncated,
    /// Nothing after the payload offset.
    Empty,
    /// Classified as RTP but the version is not 2.
    NotRtp,
}

/// Mutable state of a decoding run.
pub struct DecoderContext<C> {
    payload_offset: usize,
    mode: OperatingMode,
    context: C,
    stats: RunStats,
}

impl<C: ProtectionContext> DecoderContext<C> {
    pub fn new(context: C, mode: OperatingMode, payload_offset: usize) -> Self {
        DecoderContext {
            payload_offset,
            mode,
            context,
            stats: RunStats::default(),
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// Handle one frame. Writes the elapsed time and hexdump of the plaintext
    /// to `out` when the frame decodes.
    ///
    /// Only a failure to write is an error. Packet problems are outcomes.
    pub fn handle_frame(&mut self, frame: &Frame, out: &mut impl Write) -> io::Result<FrameOutcome> {
        self.stats.frame_seen(frame.timestamp);

        if frame.captured_len() < self.payload_offset {
            trace!(
                "Frame {} truncated: {} < {}",
                self.stats.frames,
                frame.captured_len(),
                self.payload_offset
            );
            return Ok(FrameOutcome::Skipped(SkipReason::Truncated));
        }

        let buf = &frame.data[self.payload_offset..];
        if buf.is_empty() {
            return Ok(FrameOutcome::Skipped(SkipReason::Empty));
        }

        let kind = classify(buf, self.mode);

        let result = match kind {
            PacketKind::Rtp => {
                if buf[0] >> 6 != 2 {
                    trace!("Frame {} is not RTP version 2", self.stats.frames);
                    return Ok(FrameOutcome::Skipped(SkipReason::NotRtp));
                }
                self.context.unprotect(buf)
            }
            PacketKind::Rtcp => self.context.unprotect_rtcp(buf),
        };

        let plain = match result {
            Ok(v) => v,
            Err(e) => {
                debug!("Frame {} failed to decode: {}", self.stats.frames, e);
                self.stats.errors += 1;
                return Ok(FrameOutcome::Errored(kind));
            }
        };

        match kind {
            PacketKind::Rtp => self.stats.rtp_decoded += 1,
            PacketKind::Rtcp => self.stats.rtcp_decoded += 1,
        }

        write_elapsed(out, self.stats.elapsed(frame.timestamp))?;
        write_hexdump(out, &plain)?;

        Ok(FrameOutcome::Decoded(kind))
    }

    /// Decode every frame of `source` in order.
    ///
    /// A capture read error ends the run early. It is logged, not returned.
    pub fn run(&mut self, source: &mut impl FrameSource, out: &mut impl Write) -> io::Result<()> {
        while let Some(frame) = source.next_frame() {
            let frame = match frame {
                Ok(v) => v,
                Err(e) => {
                    warn!("Stopped reading capture: {}", e);
                    break;
                }
            };
            self.handle_frame(&frame, out)?;
        }
        out.flush()
    }
}
