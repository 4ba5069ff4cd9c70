//! Legacy OpenSSL PEM encryption (`Proc-Type: 4,ENCRYPTED` + `DEK-Info`).
//!
//! The key is derived with OpenSSL's `EVP_BytesToKey` using MD5, one
//! iteration, and the first eight bytes of the IV as salt. The body is
//! CBC-encrypted with PKCS#7 padding.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use md5::{Digest, Md5};
use thiserror::Error;

/// Errors from decrypting a legacy encrypted PEM block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Pkcs5Error {
    #[error("PEM block is not encrypted (no Proc-Type: 4,ENCRYPTED header)")]
    NotEncrypted,

    #[error("encrypted PEM block has no DEK-Info header")]
    MissingDekInfo,

    #[error("malformed DEK-Info header: {0}")]
    MalformedDekInfo(String),

    #[error("unsupported PEM cipher: {0}")]
    UnsupportedCipher(String),

    #[error("IV must be {expected} bytes, got {actual}")]
    InvalidIv { expected: usize, actual: usize },

    #[error("decryption failed, the passphrase is probably incorrect")]
    BadDecrypt,
}

/// Block ciphers OpenSSL writes into `DEK-Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemCipher {
    DesCbc,
    DesEde3Cbc,
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl PemCipher {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DES-CBC" => Some(PemCipher::DesCbc),
            "DES-EDE3-CBC" => Some(PemCipher::DesEde3Cbc),
            "AES-128-CBC" => Some(PemCipher::Aes128Cbc),
            "AES-192-CBC" => Some(PemCipher::Aes192Cbc),
            "AES-256-CBC" => Some(PemCipher::Aes256Cbc),
            _ => None,
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            PemCipher::DesCbc => 8,
            PemCipher::DesEde3Cbc => 24,
            PemCipher::Aes128Cbc => 16,
            PemCipher::Aes192Cbc => 24,
            PemCipher::Aes256Cbc => 32,
        }
    }

    pub fn iv_len(self) -> usize {
        match self {
            PemCipher::DesCbc | PemCipher::DesEde3Cbc => 8,
            _ => 16,
        }
    }
}

/// Whether the block carries the legacy encryption headers.
pub fn is_encrypted_block(block: &pem::Pem) -> bool {
    block
        .headers()
        .get("Proc-Type")
        .is_some_and(|v| v.trim() == "4,ENCRYPTED")
}

/// Decrypt a legacy encrypted PEM block, returning the inner DER.
///
/// The DER keeps the block's original format: PKCS#1 for `RSA PRIVATE KEY`,
/// SEC1 for `EC PRIVATE KEY`.
pub fn decrypt_pem_block(block: &pem::Pem, passphrase: &[u8]) -> Result<Vec<u8>, Pkcs5Error> {
    if !is_encrypted_block(block) {
        return Err(Pkcs5Error::NotEncrypted);
    }

    let dek_info = block
        .headers()
        .get("DEK-Info")
        .ok_or(Pkcs5Error::MissingDekInfo)?;
    let (name, iv_hex) = dek_info
        .split_once(',')
        .ok_or_else(|| Pkcs5Error::MalformedDekInfo(dek_info.to_string()))?;

    let cipher = PemCipher::from_name(name.trim())
        .ok_or_else(|| Pkcs5Error::UnsupportedCipher(name.trim().to_string()))?;
    let iv = decode_hex(iv_hex.trim())
        .ok_or_else(|| Pkcs5Error::MalformedDekInfo(dek_info.to_string()))?;
    if iv.len() != cipher.iv_len() {
        return Err(Pkcs5Error::InvalidIv {
            expected: cipher.iv_len(),
            actual: iv.len(),
        });
    }

    let key = bytes_to_key(passphrase, &iv[..8], cipher.key_len());
    decrypt_cbc(cipher, &key, &iv, block.contents())
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration.
pub fn bytes_to_key(passphrase: &[u8], salt: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut prev: Option<[u8; 16]> = None;

    while key.len() < key_len {
        let mut hasher = Md5::new();
        if let Some(prev) = prev {
            hasher.update(prev);
        }
        hasher.update(passphrase);
        hasher.update(salt);
        let digest: [u8; 16] = hasher.finalize().into();
        key.extend_from_slice(&digest);
        prev = Some(digest);
    }

    key.truncate(key_len);
    key
}

fn decrypt_cbc(cipher: PemCipher, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, Pkcs5Error> {
    let invalid = |_: aes::cipher::InvalidLength| Pkcs5Error::InvalidIv {
        expected: cipher.iv_len(),
        actual: iv.len(),
    };

    let plain = match cipher {
        PemCipher::DesCbc => cbc::Decryptor::<des::Des>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        PemCipher::DesEde3Cbc => cbc::Decryptor::<des::TdesEde3>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        PemCipher::Aes128Cbc => cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        PemCipher::Aes192Cbc => cbc::Decryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        PemCipher::Aes256Cbc => cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
    };

    plain.map_err(|_| Pkcs5Error::BadDecrypt)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
