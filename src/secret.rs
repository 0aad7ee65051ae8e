//! At-rest obfuscation of the remote store access token.
//!
//! The key is derived from the hostname and user name. Ciphertext written
//! on one machine does not decrypt on another.

use aes::Aes128;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Derives a 16-byte key and a 16-byte IV from a machine-specific seed.
fn derive_machine_key() -> ([u8; 16], [u8; 16]) {
    let hostname = hostname::get().map_or_else(
        |_| "unknown-host".to_string(),
        |h| h.to_string_lossy().into_owned(),
    );
    let username = whoami::username();

    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update(b":");
    hasher.update(username.as_bytes());
    hasher.update(b":seedup-token-key");
    let hash = hasher.finalize();

    let mut key = [0u8; 16];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&hash[..16]);
    iv.copy_from_slice(&hash[16..]);
    (key, iv)
}

/// Encrypts `plaintext` with the machine key and returns base64 text.
#[must_use]
pub fn encrypt(plaintext: &str) -> String {
    let (key, iv) = derive_machine_key();
    let cipher = Aes128CbcEnc::new(&key.into(), &iv.into());
    let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    BASE64.encode(encrypted)
}

/// Reverses [`encrypt`]; returns `None` for anything not produced by it on this machine.
#[must_use]
pub fn decrypt(encrypted: &str) -> Option<String> {
    let (key, iv) = derive_machine_key();
    let data = BASE64.decode(encrypted).ok()?;
    if data.is_empty() || data.len() % 16 != 0 {
        return None;
    }
    let cipher = Aes128CbcDec::new(&key.into(), &iv.into());
    let decrypted = cipher.decrypt_padded_vec_mut::<Pkcs7>(&data).ok()?;
    String::from_utf8(decrypted).ok()
}
