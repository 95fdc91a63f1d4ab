use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use crate::policy::{AuthType, CipherType, CryptoPolicy, ProtectionPolicy, SsrcRestriction};

use super::auth::HmacSha1;
use super::cipher::{AesCtr, AesGcm, CtrIv, GcmIv, GCM_IV_LEN, GCM_TAG_LEN};
use super::header::{rtcp_ssrc, RtpHeader, RTCP_HEADER_LEN};
use super::kdf::{self, MasterKey};
use super::log::{DebugModule, EngineLog, LogLevel};
use super::replay::{RtcpReplay, RtpReplay};
use super::{ProtectionContext, SrtpError};

// E flag and 31 bit SRTCP index.
const SRTCP_INDEX_LEN: usize = 4;
const SRTCP_E_BIT: u32 = 0x8000_0000;
const HMAC_KEY_LEN: usize = 20;

/// A set of streams sharing one master key.
///
/// With [`SsrcRestriction::Specific`] exactly one stream exists from the
/// start. With [`SsrcRestriction::AnyInbound`] a stream is created from a
/// template the first time a packet for a new SSRC authenticates.
pub struct SrtpSession {
    rtp: SessionKeys,
    rtcp: SessionKeys,
    rtp_policy: CryptoPolicy,
    rtcp_policy: CryptoPolicy,
    mki: Option<Vec<u8>>,
    allow_repeat_tx: bool,
    template: Option<Stream>,
    streams: HashMap<u32, Stream>,
    log: EngineLog,
}

/// Per SSRC replay state.
#[derive(Debug, Clone)]
struct Stream {
    rtp: RtpReplay,
    rtcp: RtcpReplay,
}

impl Stream {
    fn new(window_size: usize) -> Result<Self, SrtpError> {
        Ok(Stream {
            rtp: RtpReplay::new(window_size)?,
            rtcp: RtcpReplay::default(),
        })
    }
}

enum SessionCipher {
    Null,
    Icm(AesCtr),
    Gcm(AesGcm),
}

/// Session keys for one of RTP or RTCP.
struct SessionKeys {
    cipher: SessionCipher,
    salt: Vec<u8>,
    hmac: Option<HmacSha1>,
}

/// Labels for encryption key, auth key and salt.
type Labels = (u8, u8, u8);

const RTP_LABELS: Labels = (
    kdf::LABEL_RTP_ENCRYPTION,
    kdf::LABEL_RTP_AUTH,
    kdf::LABEL_RTP_SALT,
);

const RTCP_LABELS: Labels = (
    kdf::LABEL_RTCP_ENCRYPTION,
    kdf::LABEL_RTCP_AUTH,
    kdf::LABEL_RTCP_SALT,
);

impl SessionKeys {
    fn derive(
        master_key: &[u8],
        policy: &CryptoPolicy,
        labels: Labels,
        log: &EngineLog,
    ) -> Result<Self, SrtpError> {
        let key_len = policy.cipher.master_key_len();
        let salt_len = policy.cipher.master_salt_len();

        if master_key.len() < key_len + salt_len {
            return Err(SrtpError::BadParam("master key shorter than policy"));
        }

        let mk = MasterKey::new(
            &master_key[..key_len],
            &master_key[key_len..key_len + salt_len],
        )?;

        log.debug(
            DebugModule::Kdf,
            format_args!("deriving {} session keys", policy.cipher),
        );

        let session_key = mk.derive_vec(labels.0, policy.cipher.session_key_len())?;
        let salt = mk.derive_vec(labels.2, salt_len)?;

        let cipher = match policy.cipher {
            CipherType::Null => {
                log.debug(DebugModule::NullCipher, format_args!("initialized"));
                SessionCipher::Null
            }
            CipherType::AesIcm128 | CipherType::AesIcm192 | CipherType::AesIcm256 => {
                log.debug(
                    DebugModule::AesIcm,
                    format_args!("key size {}", session_key.len()),
                );
                SessionCipher::Icm(AesCtr::new(&session_key)?)
            }
            CipherType::AesGcm128 | CipherType::AesGcm256 => {
                log.debug(
                    DebugModule::AesGcm,
                    format_args!("key size {}", session_key.len()),
                );
                SessionCipher::Gcm(AesGcm::new(&session_key)?)
            }
        };

        let hmac = match policy.auth {
            AuthType::Null => None,
            AuthType::HmacSha1 => {
                if policy.auth_tag_len > super::auth::HMAC_SHA1_LEN {
                    return Err(SrtpError::BadParam("HMAC-SHA1 tag length"));
                }
                let key = mk.derive_vec(labels.1, HMAC_KEY_LEN)?;
                log.debug(
                    DebugModule::HmacSha1,
                    format_args!("tag length {}", policy.auth_tag_len),
                );
                Some(HmacSha1::new(&key)?)
            }
        };

        Ok(SessionKeys { cipher, salt, hmac })
    }

    fn ctr(&mut self) -> Result<(&mut AesCtr, &[u8]), SrtpError> {
        match &mut self.cipher {
            SessionCipher::Icm(ctr) => Ok((ctr, &self.salt)),
            _ => Err(SrtpError::BadParam("cipher is not AES-ICM")),
        }
    }

    fn gcm(&mut self) -> Result<(&mut AesGcm, &[u8]), SrtpError> {
        match &mut self.cipher {
            SessionCipher::Gcm(gcm) => Ok((gcm, &self.salt)),
            _ => Err(SrtpError::BadParam("cipher is not AES-GCM")),
        }
    }

    fn hmac(&self) -> Result<&HmacSha1, SrtpError> {
        self.hmac
            .as_ref()
            .ok_or(SrtpError::BadParam("no authentication function"))
    }
}

impl SrtpSession {
    pub(crate) fn new(policy: &ProtectionPolicy, log: EngineLog) -> Result<Self, SrtpError> {
        if policy.mki.as_ref().map(|m| m.is_empty()).unwrap_or(false) {
            return Err(SrtpError::BadParam("empty MKI"));
        }

        let rtp = SessionKeys::derive(&policy.master_key, &policy.rtp, RTP_LABELS, &log)?;
        let rtcp = SessionKeys::derive(&policy.master_key, &policy.rtcp, RTCP_LABELS, &log)?;

        let stream = Stream::new(policy.window_size)?;

        let (template, streams) = match policy.ssrc {
            SsrcRestriction::AnyInbound => (Some(stream), HashMap::new()),
            SsrcRestriction::Specific(ssrc) => {
                let mut streams = HashMap::new();
                streams.insert(ssrc, stream);
                (None, streams)
            }
        };

        log.debug(
            DebugModule::Srtp,
            format_args!(
                "created session rtp {} ({}) rtcp {} ({}) ssrc {:?}",
                policy.rtp.cipher,
                policy.rtp.sec_serv,
                policy.rtcp.cipher,
                policy.rtcp.sec_serv,
                policy.ssrc
            ),
        );

        Ok(SrtpSession {
            rtp,
            rtcp,
            rtp_policy: policy.rtp,
            rtcp_policy: policy.rtcp,
            mki: policy.mki.clone(),
            allow_repeat_tx: policy.allow_repeat_tx,
            template,
            streams,
            log,
        })
    }

    fn stream(&self, ssrc: u32) -> Result<&Stream, SrtpError> {
        if let Some(stream) = self.streams.get(&ssrc) {
            return Ok(stream);
        }
        match &self.template {
            Some(template) => Ok(template),
            None => {
                self.log.debug(
                    DebugModule::Srtp,
                    format_args!("no stream for ssrc {:#010x}", ssrc),
                );
                Err(SrtpError::NoContext(ssrc))
            }
        }
    }

    fn stream_mut(&mut self, ssrc: u32) -> Result<&mut Stream, SrtpError> {
        match self.streams.entry(ssrc) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let template = self.template.as_ref().ok_or(SrtpError::NoContext(ssrc))?;
                self.log.debug(
                    DebugModule::Srtp,
                    format_args!("new stream for ssrc {:#010x}", ssrc),
                );
                Ok(e.insert(template.clone()))
            }
        }
    }

    fn mki_len(&self) -> usize {
        self.mki.as_ref().map(|m| m.len()).unwrap_or(0)
    }

    fn check_mki(&self, found: &[u8]) -> Result<(), SrtpError> {
        match &self.mki {
            Some(mki) if mki[..] != *found => {
                self.log.debug(
                    DebugModule::Srtp,
                    format_args!("mki mismatch, got {}", hex::encode(found)),
                );
                Err(SrtpError::BadMki)
            }
            _ => Ok(()),
        }
    }

    fn rtp_index(&self, header: &RtpHeader, sending: bool) -> Result<(u64, i64), SrtpError> {
        let stream = self.stream(header.ssrc)?;
        let (index, delta) = stream.rtp.estimate(header.sequence_number);

        match stream.rtp.check(delta) {
            Err(SrtpError::ReplayFail) if sending && self.allow_repeat_tx => {}
            Err(e) => {
                self.log.debug(
                    DebugModule::ReplayDb,
                    format_args!("ssrc {:#010x} index {}: {}", header.ssrc, index, e),
                );
                return Err(e);
            }
            Ok(()) => {}
        }

        Ok((index, delta))
    }

    // SRTP layout (AES-ICM / NULL)
    // [header, payload, MKI?, tag]
    //
    // SRTP layout (AES-GCM)
    // [header, payload, tag, MKI?]

    /// Verify and decrypt one SRTP packet.
    pub fn unprotect_rtp(&mut self, buf: &[u8]) -> Result<Vec<u8>, SrtpError> {
        let header = RtpHeader::parse(buf)?;
        let (index, delta) = self.rtp_index(&header, false)?;

        let output = if self.rtp_policy.cipher.is_aead() {
            self.unprotect_rtp_aead(buf, &header, index)?
        } else {
            self.unprotect_rtp_hmac(buf, &header, index)?
        };

        self.stream_mut(header.ssrc)?.rtp.add(index, delta);

        Ok(output)
    }

    fn unprotect_rtp_hmac(
        &mut self,
        buf: &[u8],
        header: &RtpHeader,
        index: u64,
    ) -> Result<Vec<u8>, SrtpError> {
        // The trailer is stripped even when no authentication is done.
        let tag_len = self.rtp_policy.auth_tag_len;
        let trailer = tag_len + self.mki_len();

        if buf.len() < header.header_len + trailer {
            return Err(SrtpError::Parse("SRTP packet shorter than trailer"));
        }

        let auth_end = buf.len() - trailer;
        let tag_start = buf.len() - tag_len;

        self.check_mki(&buf[auth_end..tag_start])?;

        if self.rtp_policy.sec_serv.authentication() && self.rtp_policy.auth == AuthType::HmacSha1 {
            let roc = (index >> 16) as u32;
            let hmac = self.rtp.hmac()?;
            if !hmac.verify(&[&buf[..auth_end], &roc.to_be_bytes()], &buf[tag_start..])? {
                self.log.debug(
                    DebugModule::Srtp,
                    format_args!("ssrc {:#010x} index {} auth failed", header.ssrc, index),
                );
                return Err(SrtpError::AuthFail);
            }
        }

        let mut output = buf[..auth_end].to_vec();

        if self.rtp_policy.sec_serv.confidentiality() && self.rtp_policy.cipher != CipherType::Null {
            let (ctr, salt) = self.rtp.ctr()?;
            let iv = rtp_iv(salt, header.ssrc, index);
            let hlen = header.header_len;
            ctr.apply(&iv, &buf[hlen..auth_end], &mut output[hlen..])?;
        }

        Ok(output)
    }

    fn unprotect_rtp_aead(
        &mut self,
        buf: &[u8],
        header: &RtpHeader,
        index: u64,
    ) -> Result<Vec<u8>, SrtpError> {
        let mki_len = self.mki_len();
        let hlen = header.header_len;

        if buf.len() < hlen + GCM_TAG_LEN + mki_len {
            return Err(SrtpError::Parse("SRTP packet shorter than AEAD tag"));
        }

        let mki_start = buf.len() - mki_len;
        self.check_mki(&buf[mki_start..])?;

        let (gcm, salt) = self.rtp.gcm()?;
        let iv = rtp_gcm_iv(salt, header.ssrc, (index >> 16) as u32, header.sequence_number);

        let mut output = vec![0; mki_start];
        output[..hlen].copy_from_slice(&buf[..hlen]);

        let result = gcm.decrypt(&iv, &[&buf[..hlen]], &buf[hlen..mki_start], &mut output[hlen..]);

        let count = match result {
            Ok(v) => v,
            Err(e) => {
                self.log.debug(
                    DebugModule::AesGcm,
                    format_args!("ssrc {:#010x} index {}: {}", header.ssrc, index, e),
                );
                return Err(e);
            }
        };

        output.truncate(hlen + count);
        Ok(output)
    }

    // SRTCP layout (AES-ICM / NULL)
    // [header, payload, E+index, MKI?, tag]
    //
    // SRTCP layout (AES-GCM)
    // [header, payload, tag, E+index, MKI?]

    /// Verify and decrypt one SRTCP packet.
    pub fn unprotect_rtcp(&mut self, buf: &[u8]) -> Result<Vec<u8>, SrtpError> {
        let ssrc = rtcp_ssrc(buf)?;
        // Fails early for SSRCs we have no stream for.
        self.stream(ssrc)?;

        let (output, index) = if self.rtcp_policy.cipher.is_aead() {
            self.unprotect_rtcp_aead(buf, ssrc)?
        } else {
            self.unprotect_rtcp_hmac(buf, ssrc)?
        };

        self.stream_mut(ssrc)?.rtcp.add(index);

        Ok(output)
    }

    fn check_rtcp_replay(&self, ssrc: u32, index: u32) -> Result<(), SrtpError> {
        if let Err(e) = self.stream(ssrc)?.rtcp.check(index) {
            self.log.debug(
                DebugModule::ReplayDb,
                format_args!("ssrc {:#010x} srtcp index {}: {}", ssrc, index, e),
            );
            return Err(e);
        }
        Ok(())
    }

    fn unprotect_rtcp_hmac(&mut self, buf: &[u8], ssrc: u32) -> Result<(Vec<u8>, u32), SrtpError> {
        let tag_len = self.rtcp_policy.auth_tag_len;
        let mki_len = self.mki_len();

        if buf.len() < RTCP_HEADER_LEN + SRTCP_INDEX_LEN + mki_len + tag_len {
            return Err(SrtpError::Parse("SRTCP packet shorter than trailer"));
        }

        let tag_start = buf.len() - tag_len;
        let mki_start = tag_start - mki_len;
        let idx_start = mki_start - SRTCP_INDEX_LEN;

        self.check_mki(&buf[mki_start..tag_start])?;

        let e_and_si = read_u32(&buf[idx_start..mki_start]);
        let is_encrypted = e_and_si & SRTCP_E_BIT > 0;
        let index = e_and_si & !SRTCP_E_BIT;

        if is_encrypted != self.rtcp_policy.sec_serv.confidentiality() {
            self.log.debug(
                DebugModule::Srtp,
                format_args!("ssrc {:#010x} SRTCP E flag mismatch", ssrc),
            );
            return Err(SrtpError::CantCheck);
        }

        self.check_rtcp_replay(ssrc, index)?;

        // SRTCP is always authenticated.
        let hmac = self.rtcp.hmac()?;
        if !hmac.verify(&[&buf[..mki_start]], &buf[tag_start..])? {
            self.log.debug(
                DebugModule::Srtp,
                format_args!("ssrc {:#010x} srtcp index {} auth failed", ssrc, index),
            );
            return Err(SrtpError::AuthFail);
        }

        let mut output = buf[..idx_start].to_vec();

        if is_encrypted && self.rtcp_policy.cipher != CipherType::Null {
            let (ctr, salt) = self.rtcp.ctr()?;
            let iv = rtp_iv(salt, ssrc, index as u64);
            ctr.apply(
                &iv,
                &buf[RTCP_HEADER_LEN..idx_start],
                &mut output[RTCP_HEADER_LEN..],
            )?;
        }

        Ok((output, index))
    }

    fn unprotect_rtcp_aead(&mut self, buf: &[u8], ssrc: u32) -> Result<(Vec<u8>, u32), SrtpError> {
        let mki_len = self.mki_len();

        if buf.len() < RTCP_HEADER_LEN + GCM_TAG_LEN + SRTCP_INDEX_LEN + mki_len {
            return Err(SrtpError::Parse("SRTCP packet shorter than AEAD trailer"));
        }

        let mki_start = buf.len() - mki_len;
        let idx_start = mki_start - SRTCP_INDEX_LEN;

        self.check_mki(&buf[mki_start..])?;

        let e_and_si_be = &buf[idx_start..mki_start];
        let e_and_si = read_u32(e_and_si_be);
        let is_encrypted = e_and_si & SRTCP_E_BIT > 0;
        let index = e_and_si & !SRTCP_E_BIT;

        self.check_rtcp_replay(ssrc, index)?;

        let (gcm, salt) = self.rtcp.gcm()?;
        let iv = rtcp_gcm_iv(salt, ssrc, index);

        // Unencrypted packets are authenticated in full as AAD.
        let enc_start = if is_encrypted {
            RTCP_HEADER_LEN
        } else {
            idx_start - GCM_TAG_LEN
        };

        let mut output = vec![0; idx_start];
        output[..enc_start].copy_from_slice(&buf[..enc_start]);

        let result = gcm.decrypt(
            &iv,
            &[&buf[..enc_start], e_and_si_be],
            &buf[enc_start..idx_start],
            &mut output[enc_start..],
        );

        let count = match result {
            Ok(v) => v,
            Err(e) => {
                self.log.debug(
                    DebugModule::AesGcm,
                    format_args!("ssrc {:#010x} srtcp index {}: {}", ssrc, index, e),
                );
                return Err(e);
            }
        };

        output.truncate(enc_start + count);
        Ok((output, index))
    }

    /// Protect one RTP packet. Used to produce test traffic.
    pub fn protect_rtp(&mut self, buf: &[u8]) -> Result<Vec<u8>, SrtpError> {
        let header = RtpHeader::parse(buf)?;
        let (index, delta) = self.rtp_index(&header, true)?;
        let hlen = header.header_len;
        let mki = self.mki.clone().unwrap_or_default();

        let mut output = buf.to_vec();

        if self.rtp_policy.cipher.is_aead() {
            let (gcm, salt) = self.rtp.gcm()?;
            let iv = rtp_gcm_iv(salt, header.ssrc, (index >> 16) as u32, header.sequence_number);
            output.resize(buf.len() + GCM_TAG_LEN, 0);
            gcm.encrypt(&iv, &[&buf[..hlen]], &buf[hlen..], &mut output[hlen..])?;
            output.extend_from_slice(&mki);
        } else {
            if self.rtp_policy.sec_serv.confidentiality() && self.rtp_policy.cipher != CipherType::Null {
                let (ctr, salt) = self.rtp.ctr()?;
                let iv = rtp_iv(salt, header.ssrc, index);
                ctr.apply(&iv, &buf[hlen..], &mut output[hlen..])?;
            }

            let auth_end = output.len();
            output.extend_from_slice(&mki);

            if self.rtp_policy.sec_serv.authentication() && self.rtp_policy.auth == AuthType::HmacSha1 {
                let roc = (index >> 16) as u32;
                let tag = self.rtp.hmac()?.tag(&[&output[..auth_end], &roc.to_be_bytes()])?;
                output.extend_from_slice(&tag[..self.rtp_policy.auth_tag_len]);
            }
        }

        self.stream_mut(header.ssrc)?.rtp.add(index, delta);

        Ok(output)
    }

    /// Protect one RTCP packet. Used to produce test traffic.
    pub fn protect_rtcp(&mut self, buf: &[u8]) -> Result<Vec<u8>, SrtpError> {
        let ssrc = rtcp_ssrc(buf)?;

        if ssrc == 0 {
            self.log.log(
                LogLevel::Warning,
                format_args!("SSRC 0 does not make a good SRTCP IV"),
            );
        }

        let index = self.stream_mut(ssrc)?.rtcp.increment();
        let encrypt = self.rtcp_policy.sec_serv.confidentiality();
        let e_and_si = if encrypt { SRTCP_E_BIT | index } else { index };
        let e_and_si_be = e_and_si.to_be_bytes();
        let mki = self.mki.clone().unwrap_or_default();

        let mut output = buf.to_vec();

        if self.rtcp_policy.cipher.is_aead() {
            let (gcm, salt) = self.rtcp.gcm()?;
            let iv = rtcp_gcm_iv(salt, ssrc, index);
            let enc_start = if encrypt { RTCP_HEADER_LEN } else { buf.len() };
            output.resize(buf.len() + GCM_TAG_LEN, 0);
            gcm.encrypt(
                &iv,
                &[&buf[..enc_start], &e_and_si_be],
                &buf[enc_start..],
                &mut output[enc_start..],
            )?;
            output.extend_from_slice(&e_and_si_be);
            output.extend_from_slice(&mki);
        } else {
            if encrypt && self.rtcp_policy.cipher != CipherType::Null {
                let (ctr, salt) = self.rtcp.ctr()?;
                let iv = rtp_iv(salt, ssrc, index as u64);
                ctr.apply(
                    &iv,
                    &buf[RTCP_HEADER_LEN..],
                    &mut output[RTCP_HEADER_LEN..],
                )?;
            }

            output.extend_from_slice(&e_and_si_be);
            let auth_end = output.len();
            output.extend_from_slice(&mki);

            let tag = self.rtcp.hmac()?.tag(&[&output[..auth_end]])?;
            output.extend_from_slice(&tag[..self.rtcp_policy.auth_tag_len]);
        }

        Ok(output)
    }
}

impl ProtectionContext for SrtpSession {
    fn unprotect(&mut self, buf: &[u8]) -> Result<Vec<u8>, SrtpError> {
        self.unprotect_rtp(buf)
    }

    fn unprotect_rtcp(&mut self, buf: &[u8]) -> Result<Vec<u8>, SrtpError> {
        SrtpSession::unprotect_rtcp(self, buf)
    }

    fn set_rollover_counter(&mut self, ssrc: u32, roc: u32) -> Result<(), SrtpError> {
        let replay = &mut self.stream_mut(ssrc)?.rtp;
        let prev = replay.roc();
        replay.set_roc(roc)?;

        self.log.debug(
            DebugModule::Srtp,
            format_args!("ssrc {:#010x} roc set to {} (was {})", ssrc, roc, prev),
        );
        Ok(())
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// RFC 3711 section 4.1.1 counter mode IV.
fn rtp_iv(salt: &[u8], ssrc: u32, srtp_index: u64) -> CtrIv {
    let mut iv = [0; 16];

    let ssrc_be = ssrc.to_be_bytes();
    let srtp_be = srtp_index.to_be_bytes();

    iv[4..8].copy_from_slice(&ssrc_be);

    for i in 0..8 {
        iv[i + 6] ^= srtp_be[i];
    }
    for (i, s) in salt.iter().take(14).enumerate() {
        iv[i] ^= s;
    }

    iv
}

/// RFC 7714 section 8.1.
fn rtp_gcm_iv(salt: &[u8], ssrc: u32, roc: u32, seq: u16) -> GcmIv {
    let mut iv = [0; GCM_IV_LEN];

    iv[2..6].copy_from_slice(&ssrc.to_be_bytes());
    iv[6..10].copy_from_slice(&roc.to_be_bytes());
    iv[10..12].copy_from_slice(&seq.to_be_bytes());

    for (i, s) in salt.iter().take(GCM_IV_LEN).enumerate() {
        iv[i] ^= s;
    }

    iv
}

/// RFC 7714 section 9.1.
fn rtcp_gcm_iv(salt: &[u8], ssrc: u32, srtcp_index: u32) -> GcmIv {
    let mut iv = [0; GCM_IV_LEN];

    iv[2..6].copy_from_slice(&ssrc.to_be_bytes());
    iv[8..12].copy_from_slice(&srtcp_index.to_be_bytes());

    for (i, s) in salt.iter().take(GCM_IV_LEN).enumerate() {
        iv[i] ^= s;
    }

    iv
}

impl fmt::Debug for SrtpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrtpSession")
            .field("rtp", &self.rtp_policy)
            .field("rtcp", &self.rtcp_policy)
            .field("streams", &self.streams.len())
            .finish()
    }
}
