use rtp_decoder::classify::OperatingMode;
use rtp_decoder::policy::SsrcRestriction;
use rtp_decoder::srtp::ProtectionContext;

mod common;
use common::{decode, init_log, pcap, policy, request, rtp_packet, sender, udp_frame};
use common::{DST_PORT, KEY, WRONG_KEY};

const SSRC: u32 = 0x1234_5678;

fn protected_stream(key: &str, count: u16) -> Vec<Vec<u8>> {
    let mut tx = sender(&policy(&request(key)));
    (0..count)
        .map(|seq| {
            let rtp = rtp_packet(SSRC, seq, &[seq as u8; 20]);
            let srtp = tx.protect_rtp(&rtp).unwrap();
            udp_frame(DST_PORT, &srtp)
        })
        .collect()
}

/// Ten frames, every odd one cut short of its RTP header.
fn truncated_capture() -> Vec<u8> {
    let frames: Vec<_> = protected_stream(KEY, 10)
        .into_iter()
        .enumerate()
        .map(|(i, f)| if i % 2 == 1 { f[..30].to_vec() } else { f })
        .collect();
    pcap(&frames)
}

#[test]
fn decodes_and_skips_truncated() {
    init_log();

    let (stats, out) = decode(&truncated_capture(), &policy(&request(KEY)), OperatingMode::Rtp, "");

    assert_eq!(stats.frames, 10);
    assert_eq!(stats.rtp_decoded, 5);
    assert_eq!(stats.errors, 0);
    assert_eq!(out.lines().filter(|l| l.starts_with("00:")).count(), 5);
}

#[test]
fn wrong_key_counts_errors() {
    init_log();

    let (stats, out) = decode(
        &truncated_capture(),
        &policy(&request(WRONG_KEY)),
        OperatingMode::Rtp,
        "",
    );

    // Truncated frames are skipped, the rest fail authentication.
    assert_eq!(stats.frames, 10);
    assert_eq!(stats.rtp_decoded, 0);
    assert_eq!(stats.errors, 5);
    assert!(out.is_empty());
}

#[test]
fn output_is_elapsed_then_hexdump() {
    init_log();

    let frames = protected_stream(KEY, 2);
    let (_, out) = decode(&pcap(&frames), &policy(&request(KEY)), OperatingMode::Rtp, "");

    let lines: Vec<_> = out.lines().collect();
    // 12 byte header and 20 byte payload is two rows each.
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "00:00.000000");
    assert_eq!(
        lines[1],
        "0000 80 00 00 00 00 00 00 00 12 34 56 78 00 00 00 00 "
    );
    assert_eq!(lines[3], "00:00.020000");
    assert!(lines[4].starts_with("0000 80 00 00 01 00 00 00 a0 12 34 56 78 01 01"));
}

#[test]
fn replayed_packet_is_an_error() {
    init_log();

    let mut frames = protected_stream(KEY, 3);
    frames.push(frames[1].clone());

    let (stats, _) = decode(&pcap(&frames), &policy(&request(KEY)), OperatingMode::Rtp, "");

    assert_eq!(stats.rtp_decoded, 3);
    assert_eq!(stats.errors, 1);
}

#[test]
fn specific_ssrc_with_rollover_counter() {
    init_log();

    let mut req = request(KEY);
    req.ssrc = SsrcRestriction::Specific(SSRC);
    req.roc = Some(7);
    let pol = policy(&req);

    let mut tx = sender(&pol);
    tx.set_rollover_counter(SSRC, 7).unwrap();

    let mut other = sender(&policy(&request(KEY)));

    let frames = vec![
        udp_frame(DST_PORT, &tx.protect_rtp(&rtp_packet(SSRC, 100, &[1; 10])).unwrap()),
        udp_frame(DST_PORT, &tx.protect_rtp(&rtp_packet(SSRC, 101, &[2; 10])).unwrap()),
        // Not the configured SSRC.
        udp_frame(DST_PORT, &other.protect_rtp(&rtp_packet(0x42, 1, &[3; 10])).unwrap()),
    ];
    let capture = pcap(&frames);

    let (stats, _) = decode(&capture, &pol, OperatingMode::Rtp, "");
    assert_eq!(stats.rtp_decoded, 2);
    assert_eq!(stats.errors, 1);

    // Without the counter the index is wrong and authentication fails.
    req.roc = None;
    let (stats, _) = decode(&capture, &policy(&req), OperatingMode::Rtp, "");
    assert_eq!(stats.rtp_decoded, 0);
    assert_eq!(stats.errors, 3);
}

#[test]
fn resolve_is_deterministic() {
    let req = request(KEY);
    assert_eq!(policy(&req), policy(&req));
}

#[test]
fn filter_selects_port() {
    init_log();

    let mut tx = sender(&policy(&request(KEY)));
    let frames: Vec<_> = (0..6u16)
        .map(|seq| {
            let srtp = tx.protect_rtp(&rtp_packet(SSRC, seq, &[0; 8])).unwrap();
            let port = if seq % 3 == 0 { DST_PORT } else { DST_PORT + 1 };
            udp_frame(port, &srtp)
        })
        .collect();

    let filter = format!("udp dst port {}", DST_PORT);
    let (stats, _) = decode(&pcap(&frames), &policy(&request(KEY)), OperatingMode::Rtp, &filter);

    // Filtered frames never reach the decoder.
    assert_eq!(stats.frames, 2);
    assert_eq!(stats.rtp_decoded, 2);
    assert_eq!(stats.errors, 0);
}

#[test]
fn elapsed_starts_at_first_frame_seen() {
    init_log();

    let mut tx = sender(&policy(&request(KEY)));
    let frames: Vec<_> = (0..3u16)
        .map(|seq| {
            let srtp = tx.protect_rtp(&rtp_packet(SSRC, seq, &[0; 4])).unwrap();
            let port = if seq == 0 { DST_PORT + 1 } else { DST_PORT };
            udp_frame(port, &srtp)
        })
        .collect();

    let filter = format!("dst port {}", DST_PORT);
    let (_, out) = decode(&pcap(&frames), &policy(&request(KEY)), OperatingMode::Rtp, &filter);

    let stamps: Vec<_> = out.lines().filter(|l| l.starts_with("00:")).collect();
    assert_eq!(stamps, vec!["00:00.000000", "00:00.020000"]);
}

#[test]
fn filter_can_drop_everything() {
    init_log();

    let frames = protected_stream(KEY, 4);
    let (stats, out) = decode(
        &pcap(&frames),
        &policy(&request(KEY)),
        OperatingMode::Rtp,
        "greater 1000",
    );

    assert_eq!(stats.frames, 0);
    assert!(out.is_empty());
}

#[test]
fn random_payloads_do_not_panic() {
    init_log();

    fastrand::seed(42);
    let frames: Vec<_> = (0..200)
        .map(|_| {
            let len = fastrand::usize(0..120);
            let mut payload: Vec<u8> = (0..len).map(|_| fastrand::u8(..)).collect();
            if let Some(b) = payload.first_mut() {
                // Mostly version 2, so the engine gets to parse it.
                *b = (*b & 0x3f) | 0x80;
            }
            udp_frame(DST_PORT, &payload)
        })
        .collect();

    for mode in [OperatingMode::Rtp, OperatingMode::Rtcp, OperatingMode::RtcpMux] {
        let (stats, _) = decode(&pcap(&frames), &policy(&request(KEY)), mode, "");
        assert_eq!(stats.frames, 200);
        assert_eq!(stats.rtp_decoded + stats.rtcp_decoded, 0);
    }
}
