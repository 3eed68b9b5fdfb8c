//! Secure passthrough session crypto for pre-KLAP firmware.
//!
//! The client sends an RSA public key in a `handshake` call. The device
//! answers with 32 bytes of AES-128-CBC key material encrypted to that key:
//! the first half is the key, the second half the IV. Every later call is
//! wrapped in a `securePassthrough` envelope whose `request` and `response`
//! fields carry base64 ciphertext.

use crate::types::Credentials;
use aes::Aes128;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Modulus size of the handshake key pair.
pub const RSA_BITS: usize = 1024;

/// Length of the key material the device returns.
pub const KEY_MATERIAL_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum PassthroughError {
    #[error("RSA key operation failed: {0}")]
    Rsa(#[from] rsa::Error),
    #[error("public key encoding failed: {0}")]
    Encoding(String),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("session key material has {0} bytes")]
    KeyLength(usize),
    #[error("payload padding is invalid")]
    Padding,
}

/// RSA key pair offered to devices during the handshake.
pub struct KeyPair {
    private: RsaPrivateKey,
    public_pem: String,
}

impl KeyPair {
    /// Generate a fresh key pair. CPU bound; run off the async executor.
    pub fn generate() -> Result<Self, PassthroughError> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_BITS)?;
        let public_pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| PassthroughError::Encoding(e.to_string()))?;

        Ok(Self {
            private,
            public_pem,
        })
    }

    /// SPKI PEM sent as `params.key`.
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    /// Decrypt the device's `result.key` into a session cipher.
    pub fn open_session_key(&self, encoded: &str) -> Result<PassthroughCipher, PassthroughError> {
        let encrypted = STANDARD.decode(encoded.trim())?;
        let material = self.private.decrypt(Pkcs1v15Encrypt, &encrypted)?;
        PassthroughCipher::from_material(&material)
    }
}

/// AES session cipher of a passthrough session.
#[derive(Clone)]
pub struct PassthroughCipher {
    key: [u8; 16],
    iv: [u8; 16],
}

impl PassthroughCipher {
    pub fn from_material(material: &[u8]) -> Result<Self, PassthroughError> {
        if material.len() != KEY_MATERIAL_LEN {
            return Err(PassthroughError::KeyLength(material.len()));
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(&material[..16]);
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&material[16..]);
        Ok(Self { key, iv })
    }

    /// Encrypt and base64 encode.
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        STANDARD.encode(ciphertext)
    }

    /// Base64 decode and decrypt.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, PassthroughError> {
        let ciphertext = STANDARD.decode(encoded.trim())?;
        Aes128CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| PassthroughError::Padding)
    }
}

/// `login_device` parameters: base64 of the hex SHA-1 of the username and
/// base64 of the plain password.
pub fn login_params(credentials: &Credentials) -> (String, String) {
    let digest: String = Sha1::digest(credentials.username.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    (
        STANDARD.encode(digest),
        STANDARD.encode(credentials.password.as_bytes()),
    )
}
