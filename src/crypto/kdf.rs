use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{DEFAULT_ITERATIONS, KEY_LEN};
use crate::error::{Error, Result};

/// PBKDF2 parameters stored alongside every password container, so files
/// stay readable after the default round count changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn new(iterations: u32) -> Result<Self> {
        let params = Self { iterations };
        params.validate()?;
        Ok(params)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::validation("PBKDF2 iterations must be >= 1"));
        }
        Ok(())
    }
}

/// Derives the AES-256 key from a password with PBKDF2-HMAC-SHA256.
pub fn derive_key(password: &str, salt: &[u8], kdf: KdfParams) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    kdf.validate()?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, kdf.iterations, key.as_mut());
    tracing::debug!(iterations = kdf.iterations, salt_len = salt.len(), "derived key");

    Ok(key)
}
