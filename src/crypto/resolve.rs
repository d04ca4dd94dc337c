//! Finds the wrapped-key entry addressed to a private key.
//!
//! Entries carry only an untrusted label, so the only way to know which one
//! belongs to us is to try them in order.

use zeroize::Zeroizing;

use super::KEY_LEN;
use super::hybrid::WrappedKey;
use super::keys::PrivateKey;

/// A data key recovered from one wrapped-key entry.
pub struct ResolvedKey {
    pub index: usize,
    pub key: Zeroizing<[u8; KEY_LEN]>,
}

/// Returns the first entry that unwraps under `private_key` to a key of the
/// right length, or `None` when the key is not among the recipients.
pub fn resolve(wrapped_keys: &[WrappedKey], private_key: &PrivateKey) -> Option<ResolvedKey> {
    wrapped_keys.iter().enumerate().find_map(|(index, entry)| {
        let raw = private_key.unwrap_key(&entry.wrapped_key)?;
        let key: [u8; KEY_LEN] = raw.as_slice().try_into().ok()?;
        tracing::debug!(index, label = %entry.label, "unwrapped data key");
        Some(ResolvedKey {
            index,
            key: Zeroizing::new(key),
        })
    })
}
