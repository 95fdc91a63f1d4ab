use clap::Parser;

use rtp_decoder::classify::OperatingMode;
use rtp_decoder::config::Args;
use rtp_decoder::policy::{CipherType, SecurityServices};
use rtp_decoder::ProtectionPolicy;

mod common;
use common::{decode, init_log, pcap, policy, request, rtcp_sender_report, rtp_packet, sender};
use common::{udp_frame, DST_PORT, KEY, KEY_GCM_256};

const SSRC: u32 = 0xcafe_f00d;

fn policy_from_args(args: &[&str]) -> ProtectionPolicy {
    let mut argv = vec!["rtp_decoder"];
    argv.extend_from_slice(args);
    let args = Args::try_parse_from(argv).unwrap();
    args.validate().unwrap();
    policy(&args.policy_request().unwrap())
}

#[test]
fn rtcp_mux_mixed_traffic() {
    init_log();

    let pol = policy(&request(KEY));
    let mut tx = sender(&pol);

    let mut frames = vec![];
    for seq in 0..4u16 {
        let srtp = tx.protect_rtp(&rtp_packet(SSRC, seq, &[0x11; 40])).unwrap();
        frames.push(udp_frame(DST_PORT, &srtp));
        if seq % 2 == 1 {
            let srtcp = tx.protect_rtcp(&rtcp_sender_report(SSRC, seq as u32)).unwrap();
            frames.push(udp_frame(DST_PORT, &srtcp));
        }
    }

    let (stats, out) = decode(&pcap(&frames), &pol, OperatingMode::RtcpMux, "");

    assert_eq!(stats.rtp_decoded, 4);
    assert_eq!(stats.rtcp_decoded, 2);
    assert_eq!(stats.errors, 0);
    assert!(out.contains("0000 80 c8 00 06 ca fe f0 0d "));

    assert_eq!(
        stats.summary(OperatingMode::RtcpMux).to_string(),
        "RTP packets decoded: 4\nRTCP packets decoded: 2\nPacket decode errors: 0"
    );
}

#[test]
fn rtcp_mode_fails_on_rtp() {
    init_log();

    let pol = policy(&request(KEY));
    let mut tx = sender(&pol);

    let frames = vec![
        udp_frame(DST_PORT, &tx.protect_rtcp(&rtcp_sender_report(SSRC, 1)).unwrap()),
        udp_frame(DST_PORT, &tx.protect_rtp(&rtp_packet(SSRC, 1, &[0; 40])).unwrap()),
        udp_frame(DST_PORT, &tx.protect_rtcp(&rtcp_sender_report(SSRC, 2)).unwrap()),
    ];

    let (stats, _) = decode(&pcap(&frames), &pol, OperatingMode::Rtcp, "");

    assert_eq!(stats.rtcp_decoded, 2);
    assert_eq!(stats.rtp_decoded, 0);
    assert_eq!(stats.errors, 1);
    assert_eq!(
        stats.summary(OperatingMode::Rtcp).to_string(),
        "RTCP packets decoded: 2\nPacket decode errors: 1"
    );
}

#[test]
fn gcm_suite_from_args() {
    init_log();

    let pol = policy_from_args(&["-c", "AEAD_AES_256_GCM", "-k", KEY_GCM_256]);
    assert_eq!(pol.rtp.cipher, CipherType::AesGcm256);
    assert_eq!(pol.rtp.auth_tag_len, 16);

    let mut tx = sender(&pol);
    let frames: Vec<_> = (0..3u16)
        .map(|seq| udp_frame(DST_PORT, &tx.protect_rtp(&rtp_packet(SSRC, seq, &[7; 16])).unwrap()))
        .collect();

    let (stats, out) = decode(&pcap(&frames), &pol, OperatingMode::Rtp, "");

    assert_eq!(stats.rtp_decoded, 3);
    assert_eq!(stats.errors, 0);
    assert!(out.contains("0010 07 07 07 07 07 07 07 07 07 07 07 07 "));
}

#[test]
fn auth_only_leaves_payload_clear() {
    init_log();

    let pol = policy_from_args(&["-a", "-k", KEY]);
    assert_eq!(pol.rtp.sec_serv, SecurityServices::AUTH);

    let mut tx = sender(&pol);
    let rtp = rtp_packet(SSRC, 9, b"clear text!!");
    let srtp = tx.protect_rtp(&rtp).unwrap();

    // Payload travels in the clear, followed by the tag.
    assert_eq!(&srtp[..rtp.len()], &rtp[..]);
    assert_eq!(srtp.len(), rtp.len() + 10);

    let (stats, _) = decode(&pcap(&[udp_frame(DST_PORT, &srtp)]), &pol, OperatingMode::Rtp, "");
    assert_eq!(stats.rtp_decoded, 1);

    // A flipped payload bit no longer authenticates.
    let mut tampered = srtp.clone();
    tampered[14] ^= 0x01;
    let (stats, _) = decode(&pcap(&[udp_frame(DST_PORT, &tampered)]), &pol, OperatingMode::Rtp, "");
    assert_eq!(stats.errors, 1);
}

#[test]
fn mki_must_match() {
    init_log();

    let pol = policy_from_args(&["-c", "AES_CM_128_HMAC_SHA1_80", "-k", KEY, "-i", "0102"]);
    let other = policy_from_args(&["-c", "AES_CM_128_HMAC_SHA1_80", "-k", KEY, "-i", "0103"]);

    let mut tx = sender(&pol);
    let frames: Vec<_> = (0..2u16)
        .map(|seq| udp_frame(DST_PORT, &tx.protect_rtp(&rtp_packet(SSRC, seq, &[1; 8])).unwrap()))
        .collect();
    let capture = pcap(&frames);

    let (stats, _) = decode(&capture, &pol, OperatingMode::Rtp, "");
    assert_eq!(stats.rtp_decoded, 2);

    let (stats, _) = decode(&capture, &other, OperatingMode::Rtp, "");
    assert_eq!(stats.errors, 2);
}

#[test]
fn short_tag_suite() {
    init_log();

    let pol = policy_from_args(&["-c", "AES_CM_128_HMAC_SHA1_32", "-b", "4fl6DT4Bi+DWT6MsBt5BOQ7Gda1Jiv7rtpYLOqvm"]);
    assert_eq!(pol.rtp.auth_tag_len, 4);
    // SRTCP keeps the long tag.
    assert_eq!(pol.rtcp.auth_tag_len, 10);

    let mut tx = sender(&pol);
    let frames = vec![
        udp_frame(DST_PORT, &tx.protect_rtp(&rtp_packet(SSRC, 1, &[2; 8])).unwrap()),
        udp_frame(DST_PORT, &tx.protect_rtcp(&rtcp_sender_report(SSRC, 1)).unwrap()),
    ];

    let (stats, _) = decode(&pcap(&frames), &pol, OperatingMode::RtcpMux, "");
    assert_eq!(stats.rtp_decoded, 1);
    assert_eq!(stats.rtcp_decoded, 1);
}
