use super::SrtpError;

/// The parts of an RTP header the engine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub has_padding: bool,
    pub has_extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Fixed header, CSRCs and header extension.
    pub header_len: usize,
}

impl RtpHeader {
    pub fn parse(buf: &[u8]) -> Result<RtpHeader, SrtpError> {
        let orig_len = buf.len();
        if buf.len() < 12 {
            trace!("RTP header too short < 12: {}", buf.len());
            return Err(SrtpError::Parse("RTP header too short"));
        }

        let version = (buf[0] & 0b1100_0000) >> 6;
        if version != 2 {
            trace!("RTP version is not 2");
            return Err(SrtpError::Parse("RTP version is not 2"));
        }
        let has_padding = buf[0] & 0b0010_0000 > 0;
        let has_extension = buf[0] & 0b0001_0000 > 0;
        let csrc_count = (buf[0] & 0b0000_1111) as usize;
        let marker = buf[1] & 0b1000_0000 > 0;
        let payload_type = buf[1] & 0b0111_1111;
        let sequence_number = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let buf: &[u8] = &buf[12..];

        let csrc_len = 4 * csrc_count;
        if buf.len() < csrc_len {
            trace!("RTP header invalid, not enough csrc");
            return Err(SrtpError::Parse("RTP header invalid, not enough csrc"));
        }

        let buf: &[u8] = &buf[csrc_len..];

        let rest = if !has_extension {
            buf
        } else {
            if buf.len() < 4 {
                trace!("RTP bad header extension");
                return Err(SrtpError::Parse("RTP bad header extension"));
            }

            let ext_words = u16::from_be_bytes([buf[2], buf[3]]);
            let ext_len = ext_words as usize * 4;

            let buf: &[u8] = &buf[4..];

            if buf.len() < ext_len {
                trace!("RTP ext len larger than header {} > {}", buf.len(), ext_len);
                return Err(SrtpError::Parse("RTP ext len larger than packet"));
            }

            &buf[ext_len..]
        };

        Ok(RtpHeader {
            has_padding,
            has_extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            header_len: orig_len - rest.len(),
        })
    }
}

/// Length of the RTCP header that is never encrypted.
pub const RTCP_HEADER_LEN: usize = 8;

/// Sender SSRC of the first packet in a compound RTCP packet.
pub fn rtcp_ssrc(buf: &[u8]) -> Result<u32, SrtpError> {
    if buf.len() < RTCP_HEADER_LEN {
        return Err(SrtpError::Parse("RTCP header too short"));
    }
    Ok(u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]))
}
