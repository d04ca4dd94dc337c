use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit},
};
use getrandom::fill;
use zeroize::Zeroizing;

use super::{IV_LEN, KEY_LEN, SALT_LEN, TAG_LEN};
use crate::error::{Error, Result};

/// Fill buffer with cryptographically secure random bytes
pub fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| Error::Random)
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Generate a 96-bit GCM IV. Never reuse one under the same key.
pub fn generate_iv() -> Result<[u8; IV_LEN]> {
    let mut iv = [0u8; IV_LEN];
    secure_random(&mut iv)?;
    Ok(iv)
}

/// Generate a one-off AES-256 data key.
pub fn generate_data_key() -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    secure_random(key.as_mut())?;
    Ok(key)
}

/// AES-256-GCM without associated data. The 16-byte tag is appended.
pub fn seal(key: &[u8; KEY_LEN], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce = nonce(iv)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher.encrypt(nonce, plaintext).map_err(|_| Error::Encryption)
}

/// Inverse of [`seal`]; any tag mismatch is an [`Error::Authentication`].
pub fn open(key: &[u8; KEY_LEN], iv: &[u8], ciphertext_with_tag: &[u8]) -> Result<Vec<u8>> {
    if ciphertext_with_tag.len() < TAG_LEN {
        return Err(Error::format("ciphertext too small"));
    }
    let nonce = nonce(iv)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(nonce, ciphertext_with_tag)
        .map_err(|_| Error::Authentication)
}

fn nonce(iv: &[u8]) -> Result<&Nonce<<Aes256Gcm as AeadCore>::NonceSize>> {
    if iv.len() != IV_LEN {
        return Err(Error::format(format!(
            "unsupported IV length {} (expected {IV_LEN})",
            iv.len()
        )));
    }
    Ok(Nonce::from_slice(iv))
}
