//! HMAC-SHA1 for SRTP authentication tags.
//!
//! The sha1 hmac check of every packet is the most expensive part of
//! decoding. With the `sha1` feature the RustCrypto `sha1` crate does the work
//! (using its "asm" backend on unix), otherwise OpenSSL does.

use subtle::ConstantTimeEq;

use super::SrtpError;

pub const HMAC_SHA1_LEN: usize = 20;

#[cfg(feature = "sha1")]
#[derive(Clone)]
pub struct HmacSha1(hmac::Hmac<sha1::Sha1>);

#[cfg(feature = "sha1")]
impl HmacSha1 {
    pub fn new(key: &[u8]) -> Result<Self, SrtpError> {
        use hmac::Mac;
        let mac = hmac::Hmac::<sha1::Sha1>::new_from_slice(key)
            .map_err(|_| SrtpError::BadParam("HMAC key length"))?;
        Ok(HmacSha1(mac))
    }

    pub fn tag(&self, payloads: &[&[u8]]) -> Result<[u8; HMAC_SHA1_LEN], SrtpError> {
        use hmac::Mac;
        let mut mac = self.0.clone();
        for payload in payloads {
            mac.update(payload);
        }
        Ok(mac.finalize().into_bytes().into())
    }
}

#[cfg(not(feature = "sha1"))]
#[derive(Clone)]
pub struct HmacSha1(std::sync::Arc<openssl::pkey::PKey<openssl::pkey::Private>>);

#[cfg(not(feature = "sha1"))]
impl HmacSha1 {
    pub fn new(key: &[u8]) -> Result<Self, SrtpError> {
        let pkey = openssl::pkey::PKey::hmac(key)?;
        Ok(HmacSha1(std::sync::Arc::new(pkey)))
    }

    pub fn tag(&self, payloads: &[&[u8]]) -> Result<[u8; HMAC_SHA1_LEN], SrtpError> {
        use openssl::hash::MessageDigest;
        use openssl::sign::Signer;

        let mut signer = Signer::new(MessageDigest::sha1(), &self.0)?;
        for payload in payloads {
            signer.update(payload)?;
        }

        let mut out = [0; HMAC_SHA1_LEN];
        signer.sign(&mut out)?;

        Ok(out)
    }
}

impl HmacSha1 {
    /// Compare the first `expected.len()` bytes of the computed tag.
    pub fn verify(&self, payloads: &[&[u8]], expected: &[u8]) -> Result<bool, SrtpError> {
        if expected.len() > HMAC_SHA1_LEN {
            return Ok(false);
        }
        let tag = self.tag(payloads)?;
        Ok(tag[..expected.len()].ct_eq(expected).into())
    }
}

impl std::fmt::Debug for HmacSha1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSha1").finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rfc_2202_case_2() {
        let mac = HmacSha1::new(b"Jefe").unwrap();
        let tag = mac.tag(&[b"what do ya want ", b"for nothing?"]).unwrap();
        assert_eq!(hex::encode(tag), "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79");
    }

    #[test]
    fn verify_truncated() {
        let mac = HmacSha1::new(&[0x0b; 20]).unwrap();
        let tag = mac.tag(&[b"Hi There"]).unwrap();
        assert!(mac.verify(&[b"Hi There"], &tag[..10]).unwrap());
        assert!(mac.verify(&[b"Hi There"], &tag[..4]).unwrap());
        assert!(!mac.verify(&[b"Hi there"], &tag[..10]).unwrap());
    }

    #[test]
    fn verify_rejects_flipped_bit_and_long_tag() {
        let mac = HmacSha1::new(&[0x0b; 20]).unwrap();
        let tag = mac.tag(&[b"Hi There"]).unwrap();

        let mut bad = tag;
        bad[9] ^= 0x80;
        assert!(!mac.verify(&[b"Hi There"], &bad[..10]).unwrap());

        let mut long = tag.to_vec();
        long.push(0);
        assert!(!mac.verify(&[b"Hi There"], &long).unwrap());
        assert!(mac.verify(&[b"Hi There"], &tag).unwrap());
    }
}
