use std::fmt;

use openssl::cipher::{Cipher, CipherRef};
use openssl::cipher_ctx::CipherCtx;
use openssl::symm::{self, Crypter, Mode};

use super::SrtpError;

pub const AES_BLOCK_SIZE: usize = 16;
pub const GCM_IV_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;

pub type CtrIv = [u8; 16];
pub type GcmIv = [u8; GCM_IV_LEN];

/// AES in counter mode. Encryption and decryption are the same operation.
pub struct AesCtr(CipherCtx);

impl AesCtr {
    pub fn new(key: &[u8]) -> Result<Self, SrtpError> {
        let t = ctr_cipher(key.len())?;
        let mut ctx = CipherCtx::new()?;
        ctx.encrypt_init(Some(t), Some(key), None)?;
        Ok(AesCtr(ctx))
    }

    pub fn apply(&mut self, iv: &CtrIv, input: &[u8], output: &mut [u8]) -> Result<(), SrtpError> {
        if input.is_empty() {
            return Ok(());
        }
        self.0.encrypt_init(None, None, Some(iv))?;
        let count = self.0.cipher_update(input, Some(output))?;
        self.0.cipher_final(&mut output[count..])?;
        Ok(())
    }
}

/// AES-GCM with a 16 byte tag.
pub struct AesGcm {
    enc: CipherCtx,
    dec: CipherCtx,
}

impl AesGcm {
    pub fn new(key: &[u8]) -> Result<Self, SrtpError> {
        let t = gcm_cipher(key.len())?;

        let mut enc = CipherCtx::new()?;
        enc.encrypt_init(Some(t), Some(key), None)?;
        enc.set_iv_length(GCM_IV_LEN)?;
        enc.set_padding(false);

        let mut dec = CipherCtx::new()?;
        dec.decrypt_init(Some(t), Some(key), None)?;
        dec.set_iv_length(GCM_IV_LEN)?;

        Ok(AesGcm { enc, dec })
    }

    /// Encrypt `input` into `output`, appending the tag.
    ///
    /// `output` must hold `input.len() + GCM_TAG_LEN` bytes.
    pub fn encrypt(
        &mut self,
        iv: &GcmIv,
        aads: &[&[u8]],
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), SrtpError> {
        self.enc.encrypt_init(None, None, Some(iv))?;

        // Omitting the output argument informs OpenSSL that we are providing AAD.
        for aad in aads {
            self.enc.cipher_update(aad, None)?;
        }

        let count = self.enc.cipher_update(input, Some(output))?;
        let final_count = self.enc.cipher_final(&mut output[count..])?;

        let tag_offset = count + final_count;
        self.enc
            .tag(&mut output[tag_offset..tag_offset + GCM_TAG_LEN])?;

        Ok(())
    }

    /// Decrypt `input` (ciphertext followed by tag) into `output`.
    ///
    /// Returns the plaintext length. Fails if the tag doesn't verify.
    pub fn decrypt(
        &mut self,
        iv: &GcmIv,
        aads: &[&[u8]],
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, SrtpError> {
        if input.len() < GCM_TAG_LEN {
            return Err(SrtpError::Parse("AEAD payload shorter than tag"));
        }

        let (cipher_text, tag) = input.split_at(input.len() - GCM_TAG_LEN);

        self.dec.decrypt_init(None, None, Some(iv))?;

        for aad in aads {
            self.dec.cipher_update(aad, None)?;
        }

        self.dec.set_tag(tag)?;

        let count = self.dec.cipher_update(cipher_text, Some(output))?;
        let final_count = self
            .dec
            .cipher_final(&mut output[count..])
            .map_err(|_| SrtpError::AuthFail)?;

        Ok(count + final_count)
    }
}

/// One AES-ECB block encryption, used as the key derivation PRF.
pub fn aes_ecb_block(key: &[u8], input: &[u8; AES_BLOCK_SIZE]) -> Result<[u8; AES_BLOCK_SIZE], SrtpError> {
    let t = match key.len() {
        16 => symm::Cipher::aes_128_ecb(),
        24 => symm::Cipher::aes_192_ecb(),
        32 => symm::Cipher::aes_256_ecb(),
        _ => return Err(SrtpError::BadParam("AES key length")),
    };

    let mut aes = Crypter::new(t, Mode::Encrypt, key, None)?;
    aes.pad(false);

    let mut buf = [0; AES_BLOCK_SIZE * 2];
    let count = aes.update(&input[..], &mut buf[..])?;
    let rest = aes.finalize(&mut buf[count..])?;
    debug_assert_eq!(count + rest, AES_BLOCK_SIZE);

    let mut out = [0; AES_BLOCK_SIZE];
    out.copy_from_slice(&buf[..AES_BLOCK_SIZE]);
    Ok(out)
}

fn ctr_cipher(key_len: usize) -> Result<&'static CipherRef, SrtpError> {
    Ok(match key_len {
        16 => Cipher::aes_128_ctr(),
        24 => Cipher::aes_192_ctr(),
        32 => Cipher::aes_256_ctr(),
        _ => return Err(SrtpError::BadParam("AES-ICM key length")),
    })
}

fn gcm_cipher(key_len: usize) -> Result<&'static CipherRef, SrtpError> {
    Ok(match key_len {
        16 => Cipher::aes_128_gcm(),
        32 => Cipher::aes_256_gcm(),
        _ => return Err(SrtpError::BadParam("AES-GCM key length")),
    })
}

impl fmt::Debug for AesCtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesCtr").finish()
    }
}

impl fmt::Debug for AesGcm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcm").finish()
    }
}
