use aes::Aes128;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::fmt; // For manual Debug impl
use thiserror::Error;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const KEY_SIZE: usize = 16; // AES-128
pub const BLOCK_SIZE: usize = 16;

/// Key and IV used for the bootstrap payload.
const REFERENCE_KEY: &[u8; KEY_SIZE] = b"1234561234561234";

/// Errors raised while decrypting a CBC ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Ciphertext is not made of whole blocks
    #[error("ciphertext length {0} is not a multiple of the 16-byte block size")]
    BlockSize(usize),

    /// Corrupt PKCS#7 trailer
    #[error("invalid padding: {0}")]
    Padding(&'static str),
}

/// Immutable AES-128 key and CBC initialization vector.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CipherKey {
    key: [u8; KEY_SIZE],
    iv: [u8; BLOCK_SIZE],
}

// Manual Debug implementation so key material never reaches the logs
impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKey")
            .field("key", &"[redacted]")
            .field("iv", &"[redacted]")
            .finish()
    }
}

impl CipherKey {
    pub const fn new(key: [u8; KEY_SIZE], iv: [u8; BLOCK_SIZE]) -> Self {
        Self { key, iv }
    }
}

impl Default for CipherKey {
    fn default() -> Self {
        Self::new(*REFERENCE_KEY, *REFERENCE_KEY)
    }
}

/// AES-128-CBC with PKCS#7 padding under a fixed key/IV pair.
///
/// The same IV is reused for every message, so this only obfuscates.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesCbcCipher {
    key: CipherKey,
}

impl AesCbcCipher {
    pub fn new(key: CipherKey) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.key.key.into(), &self.key.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CipherError::BlockSize(ciphertext.len()));
        }

        // Padding is checked separately so a bad trailer is reported as such
        let mut plaintext = Aes128CbcDec::new(&self.key.key.into(), &self.key.iv.into())
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| CipherError::BlockSize(ciphertext.len()))?;

        let unpadded_len = pkcs7_unpad(&plaintext)?.len();
        plaintext.truncate(unpadded_len);
        Ok(plaintext)
    }
}

/// Strip a PKCS#7 trailer.
///
/// Only the final byte is inspected: it must lie in `[1, data.len()]`.
pub fn pkcs7_unpad(data: &[u8]) -> Result<&[u8], CipherError> {
    let Some(&last) = data.last() else {
        return Err(CipherError::Padding("data is empty"));
    };

    let unpadding = usize::from(last);
    if unpadding == 0 || unpadding > data.len() {
        return Err(CipherError::Padding("padding length out of range"));
    }

    Ok(&data[..data.len() - unpadding])
}
