//! RFC 3711 section 4.3 key derivation with a key derivation rate of zero.

use std::fmt;

use super::cipher::{aes_ecb_block, AES_BLOCK_SIZE};
use super::SrtpError;

pub const LABEL_RTP_ENCRYPTION: u8 = 0;
pub const LABEL_RTP_AUTH: u8 = 1;
pub const LABEL_RTP_SALT: u8 = 2;
pub const LABEL_RTCP_ENCRYPTION: u8 = 3;
pub const LABEL_RTCP_AUTH: u8 = 4;
pub const LABEL_RTCP_SALT: u8 = 5;

const SALT_LEN: usize = 14;

/// Master key and salt that session keys are derived from.
pub struct MasterKey {
    key: Vec<u8>,
    // Shorter salts (AEAD uses 12 bytes) are zero padded.
    salt: [u8; SALT_LEN],
}

impl MasterKey {
    pub fn new(key: &[u8], salt: &[u8]) -> Result<Self, SrtpError> {
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(SrtpError::BadParam("master key length"));
        }
        if salt.len() > SALT_LEN {
            return Err(SrtpError::BadParam("master salt length"));
        }

        let mut padded = [0; SALT_LEN];
        padded[..salt.len()].copy_from_slice(salt);

        Ok(MasterKey {
            key: key.to_vec(),
            salt: padded,
        })
    }

    /// Fill `out` with keystream for `label`.
    pub fn derive(&self, label: u8, out: &mut [u8]) -> Result<(), SrtpError> {
        // input layout: [salt[14] || label, round[2]] (|| is xor 7th byte)
        let mut input = [0; AES_BLOCK_SIZE];
        input[..SALT_LEN].copy_from_slice(&self.salt);
        input[7] ^= label;

        for (round, chunk) in out.chunks_mut(AES_BLOCK_SIZE).enumerate() {
            input[14..].copy_from_slice(&(round as u16).to_be_bytes());
            let block = aes_ecb_block(&self.key, &input)?;
            chunk.copy_from_slice(&block[..chunk.len()]);
        }

        Ok(())
    }

    pub fn derive_vec(&self, label: u8, len: usize) -> Result<Vec<u8>, SrtpError> {
        let mut out = vec![0; len];
        self.derive(label, &mut out)?;
        Ok(out)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("key_len", &self.key.len())
            .finish()
    }
}
