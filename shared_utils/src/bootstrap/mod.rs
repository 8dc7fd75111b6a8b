//! Bootstrap payload decoding.
//!
//! A bootstrap payload is a base64 string carrying an AES-128-CBC ciphertext
//! whose plaintext is `<address>:<port>:<aux_port>`. It lets an operator hand
//! the client a server address override without putting it on the command
//! line in clear text.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::crypto::{AesCbcCipher, CipherError, CipherKey};

/// Errors that can occur while decoding a bootstrap payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload is not valid standard base64
    #[error("malformed base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Ciphertext is not made of whole AES blocks
    #[error("ciphertext length {0} is not a multiple of the block size")]
    BlockSize(usize),

    /// Corrupt PKCS#7 trailer
    #[error("invalid padding: {0}")]
    Padding(String),

    /// Plaintext is not `<address>:<port>:<aux_port>`
    #[error("invalid plaintext format: {0}")]
    Format(String),
}

impl From<CipherError> for DecodeError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::BlockSize(len) => DecodeError::BlockSize(len),
            CipherError::Padding(reason) => DecodeError::Padding(reason.to_string()),
        }
    }
}

/// Server address override carried by a bootstrap payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapTarget {
    /// Server address
    pub address: String,
    /// Server control port
    pub port: u16,
    /// Auxiliary port, handed to the config parser untouched
    pub aux_port: u16,
}

impl BootstrapTarget {
    pub fn new(address: impl Into<String>, port: u16, aux_port: u16) -> Self {
        BootstrapTarget {
            address: address.into(),
            port,
            aux_port,
        }
    }
}

impl fmt::Display for BootstrapTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.address, self.port, self.aux_port)
    }
}

impl FromStr for BootstrapTarget {
    type Err = DecodeError;

    fn from_str(plaintext: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = plaintext.split(':').collect();
        let [address, port, aux_port] = parts.as_slice() else {
            return Err(DecodeError::Format(format!(
                "expected 3 colon-separated fields, got {}",
                parts.len()
            )));
        };

        Ok(BootstrapTarget {
            address: address.to_string(),
            port: parse_port(port)?,
            aux_port: parse_port(aux_port)?,
        })
    }
}

fn parse_port(field: &str) -> Result<u16, DecodeError> {
    field
        .parse::<u16>()
        .map_err(|e| DecodeError::Format(format!("invalid port {:?}: {}", field, e)))
}

/// Decodes bootstrap payloads under an injected key.
#[derive(Debug, Clone, Copy, Default)]
pub struct BootstrapDecoder {
    cipher: AesCbcCipher,
}

impl BootstrapDecoder {
    pub fn new(key: CipherKey) -> Self {
        BootstrapDecoder {
            cipher: AesCbcCipher::new(key),
        }
    }

    /// Decode a payload. An empty payload means "no override".
    pub fn decode(&self, payload: &str) -> Result<Option<BootstrapTarget>, DecodeError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Ok(None);
        }

        let ciphertext = STANDARD.decode(payload)?;
        let plaintext = self.cipher.decrypt(&ciphertext)?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| DecodeError::Format("plaintext is not valid UTF-8".to_string()))?;

        plaintext.parse().map(Some)
    }

    /// Produce the payload that [`decode`](Self::decode) turns back into `target`.
    pub fn encode(&self, target: &BootstrapTarget) -> String {
        STANDARD.encode(self.cipher.encrypt(target.to_string().as_bytes()))
    }
}

/// Decode `payload` under `key`. See [`BootstrapDecoder::decode`].
pub fn decode_target(
    payload: &str,
    key: &CipherKey,
) -> Result<Option<BootstrapTarget>, DecodeError> {
    BootstrapDecoder::new(*key).decode(payload)
}

/// Build the payload for `target` under `key`.
pub fn encrypt_target(target: &BootstrapTarget, key: &CipherKey) -> String {
    BootstrapDecoder::new(*key).encode(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Produced with `openssl enc -aes-128-cbc -K <hex key> -iv <hex key> -base64`
    const REFERENCE_PAYLOAD: &str = "9ew69oNF1EG/Op0Bm3nFhmg5ASqIO7HK88S1fn3prA8=";
    const ZERO_PADDING_PAYLOAD: &str = "uIjSsM1bWRSdWd+3sT1zQg==";
    const OVERSIZED_PADDING_PAYLOAD: &str = "IxGm7iUHTocvkvDcTSl2Gg==";
    const TWO_FIELD_PAYLOAD: &str = "9ew69oNF1EG/Op0Bm3nFhnFj5zWwf1bHs3UU4sSoJ0c=";
    const FOUR_FIELD_PAYLOAD: &str = "9ew69oNF1EG/Op0Bm3nFhlQlII6uI6ZPV1H2dBAhWik=";
    const NON_NUMERIC_PORT_PAYLOAD: &str = "DSKRPY2yGp4KVtbW7o2ySg==";
    // Same plaintext under key "aaaaaaaaaaaaaaaa", IV "bbbbbbbbbbbbbbbb"
    const ALTERNATE_KEY_PAYLOAD: &str = "fD11v+4Hb3vkcZh97KZhpNlbOaWAGquX88RSPbnzc48=";

    #[test]
    fn test_decode_reference_payload() {
        let target = BootstrapDecoder::default()
            .decode(REFERENCE_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(target.address, "203.0.113.5");
        assert_eq!(target.port, 7000);
        assert_eq!(target.aux_port, 7001);
    }

    #[test]
    fn test_decode_empty_payload_is_no_override() {
        let decoder = BootstrapDecoder::default();
        assert_eq!(decoder.decode("").unwrap(), None);
        assert_eq!(decoder.decode("   ").unwrap(), None);
    }

    #[test]
    fn test_decode_with_substituted_key() {
        let key = CipherKey::new(*b"aaaaaaaaaaaaaaaa", *b"bbbbbbbbbbbbbbbb");
        let target = BootstrapDecoder::new(key)
            .decode(ALTERNATE_KEY_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(target, BootstrapTarget::new("203.0.113.5", 7000, 7001));

        // The reference key cannot read it
        assert!(BootstrapDecoder::default().decode(ALTERNATE_KEY_PAYLOAD).is_err());
    }

    #[test]
    fn test_decode_malformed_base64() {
        let result = BootstrapDecoder::default().decode("not base64!");
        assert!(matches!(result, Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_decode_partial_block() {
        // 5 bytes of ciphertext
        let result = BootstrapDecoder::default().decode("AAAAAAA=");
        assert_eq!(result, Err(DecodeError::BlockSize(5)));
    }

    #[test]
    fn test_decode_bad_padding() {
        let decoder = BootstrapDecoder::default();
        assert!(matches!(
            decoder.decode(ZERO_PADDING_PAYLOAD),
            Err(DecodeError::Padding(_))
        ));
        assert!(matches!(
            decoder.decode(OVERSIZED_PADDING_PAYLOAD),
            Err(DecodeError::Padding(_))
        ));
    }

    #[test]
    fn test_decode_wrong_field_count() {
        let decoder = BootstrapDecoder::default();
        assert!(matches!(
            decoder.decode(TWO_FIELD_PAYLOAD),
            Err(DecodeError::Format(_))
        ));
        assert!(matches!(
            decoder.decode(FOUR_FIELD_PAYLOAD),
            Err(DecodeError::Format(_))
        ));
    }

    #[test]
    fn test_decode_non_numeric_port() {
        let result = BootstrapDecoder::default().decode(NON_NUMERIC_PORT_PAYLOAD);
        assert!(matches!(result, Err(DecodeError::Format(_))));
    }

    #[test]
    fn test_encode_matches_reference_payload() {
        let target = BootstrapTarget::new("203.0.113.5", 7000, 7001);
        assert_eq!(BootstrapDecoder::default().encode(&target), REFERENCE_PAYLOAD);
    }

    #[test]
    fn test_plaintext_parsing() {
        assert_eq!(
            "example.com:443:0".parse::<BootstrapTarget>().unwrap(),
            BootstrapTarget::new("example.com", 443, 0)
        );
        assert!("example.com:65536:0".parse::<BootstrapTarget>().is_err());
        assert!("example.com:-1:0".parse::<BootstrapTarget>().is_err());
        assert!("example.com".parse::<BootstrapTarget>().is_err());
    }
}
