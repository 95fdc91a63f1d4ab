//! Capture source. Reads classic libpcap files and yields frames in capture
//! order, dropping frames that don't pass the installed filter.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pcap_file::pcap::PcapReader;
use pcap_file::{DataLink, PcapError};
use thiserror::Error;

mod filter;
mod link;

pub use filter::{Filter, FilterError};
pub use link::{IpInfo, PacketInfo, Transport};

/// Errors opening or reading a capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The capture file could not be opened.
    #[error("Failed to open pcap file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The capture is not a readable pcap file, or is corrupt.
    #[error("pcap: {0}")]
    Pcap(#[from] PcapError),
}

/// One captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Capture time since the unix epoch.
    pub timestamp: Duration,
    /// Length of the frame on the wire.
    pub orig_len: u32,
    /// The captured bytes. May be shorter than `orig_len`.
    pub data: Vec<u8>,
}

impl Frame {
    /// Number of bytes actually captured.
    pub fn captured_len(&self) -> usize {
        self.data.len()
    }
}

/// Something that yields frames in capture order.
///
/// `None` means the input is exhausted. An error ends the capture.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<Result<Frame, CaptureError>>;
}

/// Frames from a pcap file.
pub struct PcapSource<R: Read> {
    reader: PcapReader<R>,
    filter: Filter,
}

impl PcapSource<Box<dyn Read>> {
    /// Open a capture file. `-` reads from standard input.
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let reader: Box<dyn Read> = if path == Path::new("-") {
            Box::new(io::stdin())
        } else {
            let file = File::open(path).map_err(|source| CaptureError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            Box::new(BufReader::new(file))
        };

        PcapSource::new(reader)
    }
}

impl<R: Read> PcapSource<R> {
    pub fn new(reader: R) -> Result<Self, CaptureError> {
        let reader = PcapReader::new(reader)?;
        Ok(PcapSource {
            reader,
            filter: Filter::default(),
        })
    }

    /// Link layer of the frames in this capture.
    pub fn datalink(&self) -> DataLink {
        self.reader.header().datalink
    }

    /// Install a filter. Replaces any earlier filter.
    pub fn set_filter(&mut self, filter: Filter) {
        debug!("Install filter: {}", filter);
        self.filter = filter;
    }
}

impl<R: Read> FrameSource for PcapSource<R> {
    fn next_frame(&mut self) -> Option<Result<Frame, CaptureError>> {
        let datalink = self.datalink();

        loop {
            let packet = match self.reader.next_packet()? {
                Ok(v) => v,
                Err(e) => return Some(Err(e.into())),
            };

            if !self.filter.is_match_all() {
                let info = PacketInfo::parse(datalink, &packet.data, packet.orig_len as usize);
                if !self.filter.matches(&info) {
                    trace!("Filtered out frame of {} bytes", packet.data.len());
                    continue;
                }
            }

            return Some(Ok(Frame {
                timestamp: packet.timestamp,
                orig_len: packet.orig_len,
                data: packet.data.into_owned(),
            }));
        }
    }
}

/// Offset of the RTP header in a frame carrying IPv4/UDP without options.
pub fn default_payload_offset(datalink: DataLink) -> usize {
    const IP_UDP: usize = 20 + 8;

    match datalink {
        DataLink::ETHERNET => 14 + IP_UDP,
        DataLink::LINUX_SLL => 16 + IP_UDP,
        DataLink::RAW | DataLink::IPV4 => IP_UDP,
        DataLink::NULL | DataLink::LOOP => 4 + IP_UDP,
        _ => 14 + IP_UDP,
    }
}
