//! AES-CFB payload encryption, the black-box crypto primitive spec §4.B /
//! §6 describes: "AES-CFB using PKCS#7 padding and a per-frame random
//! 16-byte IV prepended to the ciphertext", 128/192/256-bit keys, and
//! SHA-256 key derivation when the caller hands us a textual key.

use crate::error::Error;
use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use sha2::{Digest, Sha256};

const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

type Aes128CfbEnc = cfb_mode::Encryptor<Aes128>;
type Aes128CfbDec = cfb_mode::Decryptor<Aes128>;
type Aes192CfbEnc = cfb_mode::Encryptor<Aes192>;
type Aes192CfbDec = cfb_mode::Decryptor<Aes192>;
type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Per-connection symmetric key material. Stateless across frames (a fresh
/// IV is generated for every call) so it is cheap to clone along with the
/// `Protocol` template it belongs to (spec §3: "per-connection mutable
/// state ... is isolated" by cloning).
#[derive(Debug, Clone)]
pub struct CryptoContext {
    key: Vec<u8>,
}

impl CryptoContext {
    /// `key` must be 16, 24, or 32 bytes (AES-128/192/256).
    pub fn from_key_bytes(key: Vec<u8>) -> Result<Self, Error> {
        match key.len() {
            16 | 24 | 32 => Ok(CryptoContext { key }),
            other => Err(Error::EncryptionError(format!(
                "AES key must be 16, 24 or 32 bytes, got {other}"
            ))),
        }
    }

    /// A textual key is always SHA-256-hashed down to a 256-bit key (spec
    /// §6: "when constructed from a textual key, the key is SHA-256-hashed
    /// to 256 bits").
    pub fn from_text(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        CryptoContext {
            key: hasher.finalize().to_vec(),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let mut buf = pkcs7_pad(plaintext);
        let iv: [u8; IV_LEN] = rand::random();

        match self.key.len() {
            16 => Aes128CfbEnc::new(self.key.as_slice().into(), &iv.into()).encrypt(&mut buf),
            24 => Aes192CfbEnc::new(self.key.as_slice().into(), &iv.into()).encrypt(&mut buf),
            32 => Aes256CfbEnc::new(self.key.as_slice().into(), &iv.into()).encrypt(&mut buf),
            _ => unreachable!("key length validated at construction"),
        }

        let mut out = Vec::with_capacity(IV_LEN + buf.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&buf);
        Ok(out)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        if ciphertext.len() < IV_LEN {
            return Err(Error::EncryptionError("ciphertext shorter than IV".into()));
        }
        let (iv, body) = ciphertext.split_at(IV_LEN);
        let mut buf = body.to_vec();

        match self.key.len() {
            16 => Aes128CfbDec::new(self.key.as_slice().into(), iv.into()).decrypt(&mut buf),
            24 => Aes192CfbDec::new(self.key.as_slice().into(), iv.into()).decrypt(&mut buf),
            32 => Aes256CfbDec::new(self.key.as_slice().into(), iv.into()).decrypt(&mut buf),
            _ => unreachable!("key length validated at construction"),
        }

        pkcs7_unpad(buf)
    }
}

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_LEN - (data.len() % BLOCK_LEN);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
}

fn pkcs7_unpad(mut data: Vec<u8>) -> Result<Vec<u8>, Error> {
    let pad_len = *data
        .last()
        .ok_or_else(|| Error::EncryptionError("empty plaintext after decryption".into()))?
        as usize;
    if pad_len == 0 || pad_len > BLOCK_LEN || pad_len > data.len() {
        return Err(Error::EncryptionError("invalid PKCS#7 padding".into()));
    }
    if data[data.len() - pad_len..].iter().any(|&b| b as usize != pad_len) {
        return Err(Error::EncryptionError("invalid PKCS#7 padding".into()));
    }
    data.truncate(data.len() - pad_len);
    Ok(data)
}
