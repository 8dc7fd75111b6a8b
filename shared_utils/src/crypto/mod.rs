//! Cryptographic primitives.

pub mod aes_cbc;

pub use aes_cbc::{AesCbcCipher, CipherError, CipherKey};
