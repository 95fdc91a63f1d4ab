//! Text output of decoded packets.

use std::io::{self, Write};
use std::time::Duration;

const BYTES_PER_ROW: usize = 16;

/// Write `MM:SS.ffffff` for an offset from the start of the capture.
pub fn write_elapsed(out: &mut impl Write, elapsed: Duration) -> io::Result<()> {
    let secs = elapsed.as_secs();
    writeln!(
        out,
        "{:02}:{:02}.{:06}",
        secs / 60,
        secs % 60,
        elapsed.subsec_micros()
    )
}

/// Write `data` as rows of 16 bytes, each row prefixed with its offset.
pub fn write_hexdump(out: &mut impl Write, data: &[u8]) -> io::Result<()> {
    for (row, chunk) in data.chunks(BYTES_PER_ROW).enumerate() {
        write!(out, "{:04x} ", row * BYTES_PER_ROW)?;
        for b in chunk {
            write!(out, "{:02x} ", b)?;
        }
        writeln!(out)?;
    }
    Ok(())
}
