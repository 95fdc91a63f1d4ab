#![allow(unused)]
use std::io::Cursor;
use std::sync::Once;
use std::time::Duration;

use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
use pcap_file::DataLink;

use rtp_decoder::capture::{Filter, PcapSource};
use rtp_decoder::classify::OperatingMode;
use rtp_decoder::decoder::DecoderContext;
use rtp_decoder::key::KeyMaterial;
use rtp_decoder::policy::{resolve, PolicyRequest, SecurityServices, SsrcRestriction};
use rtp_decoder::srtp::{ProtectionContext, ProtectionEngine, SrtpEngine, SrtpSession};
use rtp_decoder::stats::RunStats;
use rtp_decoder::ProtectionPolicy;

/// 128 bit master key and 112 bit salt.
pub const KEY: &str = "e1f97a0d3e018be0d64fa32c06de41390ec675ad498afeebb6960b3aabe6";

/// Same length as [`KEY`], different bits.
pub const WRONG_KEY: &str = "e1f97a0d3e018be0d64fa32c06de41390ec675ad498afeebb6960b3aabe7";

/// 256 bit master key and 96 bit salt.
pub const KEY_GCM_256: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f202122232425262728292a2b";

pub const SRC_PORT: u16 = 5004;
pub const DST_PORT: u16 = 6004;

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(env_filter)
            .init();
    });
}

/// A request for AES-CM-128 with HMAC-SHA1-80.
pub fn request(key: &str) -> PolicyRequest {
    PolicyRequest {
        services: SecurityServices::CONF_AND_AUTH,
        key: Some(KeyMaterial::hex(key)),
        ..Default::default()
    }
}

pub fn policy(req: &PolicyRequest) -> ProtectionPolicy {
    resolve(req, SrtpEngine::new().capabilities()).expect("resolve policy")
}

/// A session used to protect test traffic.
pub fn sender(policy: &ProtectionPolicy) -> SrtpSession {
    SrtpEngine::new().create(policy).expect("create sender")
}

pub fn rtp_packet(ssrc: u32, seq: u16, payload: &[u8]) -> Vec<u8> {
    let ts = seq as u32 * 160;
    let mut v = vec![0x80, 0x00];
    v.extend_from_slice(&seq.to_be_bytes());
    v.extend_from_slice(&ts.to_be_bytes());
    v.extend_from_slice(&ssrc.to_be_bytes());
    v.extend_from_slice(payload);
    v
}

/// RTCP sender report without report blocks.
pub fn rtcp_sender_report(ssrc: u32, packet_count: u32) -> Vec<u8> {
    let mut v = vec![0x80, 200, 0x00, 0x06];
    v.extend_from_slice(&ssrc.to_be_bytes());
    // NTP timestamp
    v.extend_from_slice(&[0xe8, 0x9b, 0x0d, 0x2a, 0x40, 0x00, 0x00, 0x00]);
    // RTP timestamp
    v.extend_from_slice(&(packet_count * 160).to_be_bytes());
    v.extend_from_slice(&packet_count.to_be_bytes());
    v.extend_from_slice(&(packet_count * 160).to_be_bytes());
    v
}

/// Ethernet, IPv4 and UDP around `payload`. The payload starts at byte 42.
pub fn udp_frame(dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let udp_len = 8 + payload.len();
    let ip_len = 20 + udp_len;

    let mut v = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x02, // dst mac
        0x02, 0x00, 0x00, 0x00, 0x00, 0x01, // src mac
        0x08, 0x00, // IPv4
    ];

    v.extend_from_slice(&[0x45, 0x00]);
    v.extend_from_slice(&(ip_len as u16).to_be_bytes());
    v.extend_from_slice(&[0x00, 0x00, 0x40, 0x00, 64, 17, 0x00, 0x00]);
    v.extend_from_slice(&[192, 168, 0, 1]);
    v.extend_from_slice(&[192, 168, 0, 2]);

    v.extend_from_slice(&SRC_PORT.to_be_bytes());
    v.extend_from_slice(&dst_port.to_be_bytes());
    v.extend_from_slice(&(udp_len as u16).to_be_bytes());
    v.extend_from_slice(&[0x00, 0x00]);

    v.extend_from_slice(payload);
    v
}

/// Capture time of frame `i`, 20ms apart.
pub fn frame_time(i: usize) -> Duration {
    Duration::from_secs(1_700_000_000) + Duration::from_millis(20 * i as u64)
}

/// An Ethernet pcap holding `frames`, one every 20ms.
pub fn pcap(frames: &[Vec<u8>]) -> Vec<u8> {
    let header = PcapHeader {
        datalink: DataLink::ETHERNET,
        ..Default::default()
    };
    let mut writer = PcapWriter::with_header(Vec::new(), header).expect("pcap writer");

    for (i, data) in frames.iter().enumerate() {
        let packet = PcapPacket::new(frame_time(i), data.len() as u32, data);
        writer.write_packet(&packet).expect("write packet");
    }

    writer.into_writer()
}

/// Decode `capture` with `policy`, as the binary would.
pub fn decode(
    capture: &[u8],
    policy: &ProtectionPolicy,
    mode: OperatingMode,
    filter: &str,
) -> (RunStats, String) {
    let mut source = PcapSource::new(Cursor::new(capture)).expect("pcap source");
    source.set_filter(Filter::compile(filter).expect("filter"));

    let engine = SrtpEngine::new();
    let mut context = engine.create(policy).expect("create context");
    if let (SsrcRestriction::Specific(ssrc), Some(roc)) = (policy.ssrc, policy.roc) {
        context.set_rollover_counter(ssrc, roc).expect("set roc");
    }

    let offset = rtp_decoder::capture::default_payload_offset(source.datalink());
    let mut decoder = DecoderContext::new(context, mode, offset);

    let mut out = Vec::new();
    decoder.run(&mut source, &mut out).expect("run");

    (
        decoder.stats().clone(),
        String::from_utf8(out).expect("utf8 output"),
    )
}
