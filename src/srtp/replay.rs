//! Packet index estimation and replay protection.

use super::SrtpError;

const SEQ_NUM_MEDIAN: u64 = 1 << 15;
const SEQ_NUM_MAX: u64 = 1 << 16;

/// Largest replay window we can track.
pub const MAX_WINDOW_SIZE: usize = 128;

/// Smallest replay window allowed (RFC 3711 section 3.3.2).
pub const MIN_WINDOW_SIZE: usize = 64;

/// Replay window for SRTP, keyed on the 48 bit packet index.
///
/// Bit `k` of the mask is set when index `index - k` has been seen.
#[derive(Debug, Clone)]
pub struct RtpReplay {
    index: u64,
    bitmask: u128,
    window_size: usize,
    // The rollover counter to assume for the first packet.
    pending_roc: Option<u32>,
}

impl RtpReplay {
    pub fn new(window_size: usize) -> Result<Self, SrtpError> {
        if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&window_size) {
            return Err(SrtpError::BadParam("replay window size"));
        }
        Ok(RtpReplay {
            index: 0,
            bitmask: 0,
            window_size,
            pending_roc: Some(0),
        })
    }

    /// Set the rollover counter for the next received packet.
    pub fn set_roc(&mut self, roc: u32) -> Result<(), SrtpError> {
        if self.pending_roc.is_none() && (roc as u64) < self.index >> 16 {
            return Err(SrtpError::ReplayOld);
        }
        self.pending_roc = Some(roc);
        Ok(())
    }

    pub fn roc(&self) -> u32 {
        (self.index >> 16) as u32
    }

    /// Estimate the packet index for `seq` and the delta to the highest
    /// index seen so far.
    pub fn estimate(&self, seq: u16) -> (u64, i64) {
        if let Some(roc) = self.pending_roc {
            let guess = ((roc as u64) << 16) | seq as u64;
            return (guess, guess as i64 - self.index as i64);
        }

        let seq = seq as u64;

        if self.index <= SEQ_NUM_MEDIAN {
            // The counter has barely started. A guess of roc - 1 would wrap.
            return (seq, seq as i64 - self.index as i64);
        }

        let local_roc = self.index >> 16;
        let local_seq = self.index & 0xffff;

        let guess_roc = if local_seq < SEQ_NUM_MEDIAN {
            if seq > local_seq + SEQ_NUM_MEDIAN {
                local_roc.wrapping_sub(1) & 0xffff_ffff
            } else {
                local_roc
            }
        } else if local_seq > seq + SEQ_NUM_MEDIAN {
            (local_roc + 1) & 0xffff_ffff
        } else {
            local_roc
        };

        let guess = (guess_roc << 16) | seq;

        let delta = if guess_roc == local_roc {
            seq as i64 - local_seq as i64
        } else if guess_roc == ((local_roc + 1) & 0xffff_ffff) {
            (seq + SEQ_NUM_MAX) as i64 - local_seq as i64
        } else {
            seq as i64 - SEQ_NUM_MAX as i64 - local_seq as i64
        };

        (guess, delta)
    }

    /// Check `delta` against the window.
    pub fn check(&self, delta: i64) -> Result<(), SrtpError> {
        if self.pending_roc.is_some() || delta > 0 {
            return Ok(());
        }
        let back = (-delta) as u64;
        if back >= self.window_size as u64 {
            return Err(SrtpError::ReplayOld);
        }
        if self.bitmask & (1 << back) != 0 {
            return Err(SrtpError::ReplayFail);
        }
        Ok(())
    }

    /// Record a packet as received. Must follow a successful [`RtpReplay::check`].
    pub fn add(&mut self, index: u64, delta: i64) {
        if self.pending_roc.take().is_some() {
            self.index = index;
            self.bitmask = 1;
            return;
        }

        if delta > 0 {
            self.bitmask = if delta as u64 >= MAX_WINDOW_SIZE as u64 {
                0
            } else {
                self.bitmask << delta
            };
            self.bitmask |= 1;
            self.index = index;
        } else {
            self.bitmask |= 1 << (-delta) as u64;
        }
    }
}

/// Replay window for SRTCP, keyed on the 31 bit SRTCP index.
///
/// Bit `k` of the mask is set when index `window_start + k` has been seen.
#[derive(Debug, Clone, Default)]
pub struct RtcpReplay {
    window_start: u32,
    bitmask: u128,
    // Sender side counter.
    next_index: u32,
}

impl RtcpReplay {
    pub fn check(&self, index: u32) -> Result<(), SrtpError> {
        if index < self.window_start {
            return Err(SrtpError::ReplayOld);
        }
        let delta = (index - self.window_start) as usize;
        if delta >= MAX_WINDOW_SIZE {
            return Ok(());
        }
        if self.bitmask & (1 << delta) != 0 {
            return Err(SrtpError::ReplayFail);
        }
        Ok(())
    }

    pub fn add(&mut self, index: u32) {
        let delta = (index - self.window_start) as usize;
        if delta < MAX_WINDOW_SIZE {
            self.bitmask |= 1 << delta;
            return;
        }

        let shift = delta - MAX_WINDOW_SIZE + 1;
        self.bitmask = if shift >= MAX_WINDOW_SIZE {
            0
        } else {
            self.bitmask >> shift
        };
        self.window_start += shift as u32;
        self.bitmask |= 1 << (index - self.window_start);
    }

    /// Next outgoing SRTCP index, counting from 1 modulo 2^31.
    pub fn increment(&mut self) -> u32 {
        self.next_index = (self.next_index + 1) & 0x7fff_ffff;
        self.next_index
    }
}
