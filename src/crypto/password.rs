//! Password-based encryption: PBKDF2-HMAC-SHA256 key, AES-256-GCM payload.

use super::aead::{self, generate_iv, generate_salt};
use super::kdf::{KdfParams, derive_key};

use crate::error::Result;

/// Output of [`encrypt_with_fresh_salt_and_iv`]: everything a password
/// container needs besides the descriptive metadata.
#[derive(Debug, Clone)]
pub struct PasswordCiphertext {
    pub salt: Vec<u8>,
    pub iv: Vec<u8>,
    pub kdf: KdfParams,
    pub ciphertext_with_tag: Vec<u8>,
}

pub fn encrypt(
    plaintext: &[u8],
    password: &str,
    salt: &[u8],
    iv: &[u8],
    kdf: KdfParams,
) -> Result<Vec<u8>> {
    let key = derive_key(password, salt, kdf)?;
    aead::seal(&key, iv, plaintext)
}

/// Fails with `Authentication` when the password, salt, IV or data is wrong,
/// and with `Format` when the input cannot even hold a tag.
pub fn decrypt(
    ciphertext_with_tag: &[u8],
    password: &str,
    salt: &[u8],
    iv: &[u8],
    kdf: KdfParams,
) -> Result<Vec<u8>> {
    let key = derive_key(password, salt, kdf)?;
    aead::open(&key, iv, ciphertext_with_tag)
}

/// Encrypts under a random 16-byte salt and 12-byte IV drawn from the OS
/// CSPRNG.
pub fn encrypt_with_fresh_salt_and_iv(
    plaintext: &[u8],
    password: &str,
    kdf: KdfParams,
) -> Result<PasswordCiphertext> {
    let salt = generate_salt()?;
    let iv = generate_iv()?;
    let ciphertext_with_tag = encrypt(plaintext, password, &salt, &iv, kdf)?;

    Ok(PasswordCiphertext {
        salt: salt.to_vec(),
        iv: iv.to_vec(),
        kdf,
        ciphertext_with_tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{IV_LEN, SALT_LEN, TAG_LEN};
    use crate::error::Error;

    fn fast() -> KdfParams {
        KdfParams::new(1_000).unwrap()
    }

    #[test]
    fn fresh_roundtrip() {
        let out = encrypt_with_fresh_salt_and_iv(b"secret data", "correcthorse", fast()).unwrap();

        assert_eq!(out.salt.len(), SALT_LEN);
        assert_eq!(out.iv.len(), IV_LEN);
        assert_eq!(out.ciphertext_with_tag.len(), 11 + TAG_LEN);

        let plain = decrypt(&out.ciphertext_with_tag, "correcthorse", &out.salt, &out.iv, fast())
            .unwrap();
        assert_eq!(plain, b"secret data");
    }

    #[test]
    fn fixed_inputs_are_deterministic() {
        let a = encrypt(b"x", "pw", &[1u8; 16], &[2u8; 12], fast()).unwrap();
        let b = encrypt(b"x", "pw", &[1u8; 16], &[2u8; 12], fast()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_password_fails_authentication() {
        let out = encrypt_with_fresh_salt_and_iv(b"data", "correcthorse", fast()).unwrap();
        let res = decrypt(&out.ciphertext_with_tag, "wronghorse", &out.salt, &out.iv, fast());
        assert!(matches!(res, Err(Error::Authentication)));
    }

    #[test]
    fn wrong_salt_or_iterations_fails_authentication() {
        let out = encrypt_with_fresh_salt_and_iv(b"data", "correcthorse", fast()).unwrap();

        let other_salt = [0u8; SALT_LEN];
        let res = decrypt(&out.ciphertext_with_tag, "correcthorse", &other_salt, &out.iv, fast());
        assert!(matches!(res, Err(Error::Authentication)));

        let res = decrypt(
            &out.ciphertext_with_tag,
            "correcthorse",
            &out.salt,
            &out.iv,
            KdfParams::new(999).unwrap(),
        );
        assert!(matches!(res, Err(Error::Authentication)));
    }

    #[test]
    fn empty_plaintext_is_just_a_tag() {
        let out = encrypt_with_fresh_salt_and_iv(b"", "correcthorse", fast()).unwrap();
        assert_eq!(out.ciphertext_with_tag.len(), TAG_LEN);
        let plain = decrypt(&out.ciphertext_with_tag, "correcthorse", &out.salt, &out.iv, fast())
            .unwrap();
        assert!(plain.is_empty());
    }
}
