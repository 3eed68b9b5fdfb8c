//! KLAP handshake hashes and session cipher.
//!
//! A KLAP session is derived from three values: a random seed chosen by the
//! client, a seed chosen by the device, and a hash of the account
//! credentials. Both sides derive the same AES-128-CBC key, IV prefix,
//! signing key and starting sequence number from them.

use crate::types::Credentials;
use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha1::Sha1;
use sha2::{Digest, Sha256};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Length of the client and device seeds.
pub const SEED_LEN: usize = 16;

/// Length of the SHA-256 signature prefixed to every encrypted payload.
pub const SIGNATURE_LEN: usize = 32;

/// Errors while opening an encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("payload of {0} bytes is shorter than its signature")]
    Truncated(usize),
    #[error("payload padding is invalid")]
    Padding,
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// `sha256(sha1(username) ‖ sha1(password))`.
pub fn auth_hash(credentials: &Credentials) -> [u8; 32] {
    sha256(&[
        &sha1(credentials.username.as_bytes()),
        &sha1(credentials.password.as_bytes()),
    ])
}

/// Hash the device returns from handshake1 to prove it knows the credentials.
pub fn server_proof(local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> [u8; 32] {
    sha256(&[local_seed, remote_seed, auth_hash])
}

/// Hash the client sends in handshake2.
pub fn client_proof(local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> [u8; 32] {
    sha256(&[remote_seed, local_seed, auth_hash])
}

/// Session cipher shared by client and device.
#[derive(Clone)]
pub struct KlapCipher {
    key: [u8; 16],
    iv: [u8; 12],
    sig: [u8; 28],
    seq: i32,
}

impl KlapCipher {
    pub fn new(local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> Self {
        let key_digest = sha256(&[b"lsk", local_seed, remote_seed, auth_hash]);
        let iv_digest = sha256(&[b"iv", local_seed, remote_seed, auth_hash]);
        let sig_digest = sha256(&[b"ldk", local_seed, remote_seed, auth_hash]);

        let mut key = [0u8; 16];
        key.copy_from_slice(&key_digest[..16]);
        let mut iv = [0u8; 12];
        iv.copy_from_slice(&iv_digest[..12]);
        let mut seq_bytes = [0u8; 4];
        seq_bytes.copy_from_slice(&iv_digest[28..]);
        let mut sig = [0u8; 28];
        sig.copy_from_slice(&sig_digest[..28]);

        Self {
            key,
            iv,
            sig,
            seq: i32::from_be_bytes(seq_bytes),
        }
    }

    /// Current sequence number.
    pub fn seq(&self) -> i32 {
        self.seq
    }

    fn iv_for(&self, seq: i32) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[..12].copy_from_slice(&self.iv);
        iv[12..].copy_from_slice(&seq.to_be_bytes());
        iv
    }

    /// Advance the sequence and seal `plaintext` for the next request.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> (Vec<u8>, i32) {
        self.seq = self.seq.wrapping_add(1);
        (self.seal(self.seq, plaintext), self.seq)
    }

    /// Encrypt under `seq` and prefix the signature.
    pub fn seal(&self, seq: i32, plaintext: &[u8]) -> Vec<u8> {
        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &self.iv_for(seq).into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        let signature = sha256(&[&self.sig, &seq.to_be_bytes(), &ciphertext]);

        let mut payload = Vec::with_capacity(SIGNATURE_LEN + ciphertext.len());
        payload.extend_from_slice(&signature);
        payload.extend_from_slice(&ciphertext);
        payload
    }

    /// Strip the signature and decrypt a payload sealed under `seq`.
    pub fn open(&self, seq: i32, payload: &[u8]) -> Result<Vec<u8>, CipherError> {
        if payload.len() < SIGNATURE_LEN {
            return Err(CipherError::Truncated(payload.len()));
        }
        Aes128CbcDec::new(&self.key.into(), &self.iv_for(seq).into())
            .decrypt_padded_vec_mut::<Pkcs7>(&payload[SIGNATURE_LEN..])
            .map_err(|_| CipherError::Padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: [u8; SEED_LEN] = [1; SEED_LEN];
    const REMOTE: [u8; SEED_LEN] = [2; SEED_LEN];

    #[test]
    fn test_auth_hash_depends_on_both_fields() {
        let a = auth_hash(&Credentials::new("user", "pass"));
        let b = auth_hash(&Credentials::new("user", "other"));
        let c = auth_hash(&Credentials::new("other", "pass"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, auth_hash(&Credentials::new("user", "pass")));
    }

    #[test]
    fn test_proofs_are_order_sensitive() {
        let auth = auth_hash(&Credentials::new("user", "pass"));
        assert_ne!(
            server_proof(&LOCAL, &REMOTE, &auth),
            client_proof(&LOCAL, &REMOTE, &auth)
        );
    }

    #[test]
    fn test_device_opens_client_request() {
        let auth = auth_hash(&Credentials::new("user", "pass"));
        let mut client = KlapCipher::new(&LOCAL, &REMOTE, &auth);
        let device = KlapCipher::new(&LOCAL, &REMOTE, &auth);

        let start = client.seq();
        let (payload, seq) = client.encrypt(br#"{"method":"get_device_info"}"#);
        assert_eq!(seq, start.wrapping_add(1));
        assert_eq!(payload.len() % 16, 0);
        assert_eq!(
            device.open(seq, &payload).unwrap(),
            br#"{"method":"get_device_info"}"#.to_vec()
        );
    }

    #[test]
    fn test_wrong_credentials_cannot_open() {
        let mut client = KlapCipher::new(&LOCAL, &REMOTE, &auth_hash(&Credentials::new("u", "a")));
        let device = KlapCipher::new(&LOCAL, &REMOTE, &auth_hash(&Credentials::new("u", "b")));

        let (payload, seq) = client.encrypt(&[b'x'; 40]);
        assert_ne!(device.open(seq, &payload), Ok(vec![b'x'; 40]));
    }

    #[test]
    fn test_truncated_payload() {
        let cipher = KlapCipher::new(&LOCAL, &REMOTE, &[0; 32]);
        assert_eq!(cipher.open(1, &[0; 10]), Err(CipherError::Truncated(10)));
    }
}
