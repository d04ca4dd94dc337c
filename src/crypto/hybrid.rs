//! Hybrid public-key encryption: one AES-256-GCM pass under a random data
//! key, plus one RSA-OAEP wrap of that key per recipient.

use super::aead::{self, generate_data_key, generate_iv};
use super::keys::{PrivateKey, PublicKey};
use super::resolve::resolve;
use crate::error::{Error, Result};

/// A public key addressed by a human-readable, non-unique label.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub label: String,
    pub public_key: PublicKey,
}

impl Recipient {
    pub fn new(label: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            label: label.into(),
            public_key,
        }
    }
}

/// The data key encrypted for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    pub label: String,
    pub wrapped_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct HybridCiphertext {
    pub iv: Vec<u8>,
    pub wrapped_keys: Vec<WrappedKey>,
    pub ciphertext_with_tag: Vec<u8>,
}

/// Wrapped keys come back in recipient order. The data key is dropped
/// (and zeroed) before returning.
pub fn encrypt_for_recipients(
    plaintext: &[u8],
    recipients: &[Recipient],
) -> Result<HybridCiphertext> {
    if recipients.is_empty() {
        return Err(Error::NoRecipients);
    }

    let data_key = generate_data_key()?;
    let iv = generate_iv()?;
    let ciphertext_with_tag = aead::seal(&data_key, &iv, plaintext)?;

    let wrapped_keys = recipients
        .iter()
        .map(|r| {
            Ok(WrappedKey {
                label: r.label.clone(),
                wrapped_key: r.public_key.wrap(data_key.as_slice())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(recipients = wrapped_keys.len(), "wrapped data key");

    Ok(HybridCiphertext {
        iv: iv.to_vec(),
        wrapped_keys,
        ciphertext_with_tag,
    })
}

/// `NoMatchingRecipient` when no entry unwraps; `Authentication` when one
/// does but the payload tag fails.
pub fn decrypt_with_private_key(
    iv: &[u8],
    wrapped_keys: &[WrappedKey],
    ciphertext_with_tag: &[u8],
    private_key: &PrivateKey,
) -> Result<Vec<u8>> {
    let resolved = resolve(wrapped_keys, private_key).ok_or(Error::NoMatchingRecipient)?;
    aead::open(&resolved.key, iv, ciphertext_with_tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::tests::test_keys;
    use crate::crypto::{IV_LEN, TAG_LEN};

    fn recipients(idx: &[usize]) -> Vec<Recipient> {
        idx.iter()
            .map(|&i| Recipient::new(format!("r{i}"), test_keys()[i].public().clone()))
            .collect()
    }

    #[test]
    fn every_recipient_can_decrypt() {
        let out = encrypt_for_recipients(b"payload", &recipients(&[0, 1, 2])).unwrap();
        assert_eq!(out.iv.len(), IV_LEN);
        assert_eq!(out.ciphertext_with_tag.len(), 7 + TAG_LEN);

        let labels: Vec<_> = out.wrapped_keys.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(labels, ["r0", "r1", "r2"]);

        for i in 0..3 {
            let plain = decrypt_with_private_key(
                &out.iv,
                &out.wrapped_keys,
                &out.ciphertext_with_tag,
                test_keys()[i].private(),
            )
            .unwrap();
            assert_eq!(plain, b"payload");
        }
    }

    #[test]
    fn outsider_gets_no_matching_recipient() {
        let out = encrypt_for_recipients(b"payload", &recipients(&[0, 1])).unwrap();
        let res = decrypt_with_private_key(
            &out.iv,
            &out.wrapped_keys,
            &out.ciphertext_with_tag,
            test_keys()[3].private(),
        );
        assert!(matches!(res, Err(Error::NoMatchingRecipient)));
    }

    #[test]
    fn tampered_payload_is_authentication_not_recipient_error() {
        let mut out = encrypt_for_recipients(b"payload", &recipients(&[0])).unwrap();
        out.ciphertext_with_tag[0] ^= 0x01;

        let res = decrypt_with_private_key(
            &out.iv,
            &out.wrapped_keys,
            &out.ciphertext_with_tag,
            test_keys()[0].private(),
        );
        assert!(matches!(res, Err(Error::Authentication)));
    }

    #[test]
    fn empty_recipient_list_rejected() {
        assert!(matches!(
            encrypt_for_recipients(b"x", &[]),
            Err(Error::NoRecipients)
        ));
    }

    #[test]
    fn ciphertext_size_is_independent_of_recipient_count() {
        let one = encrypt_for_recipients(b"same size", &recipients(&[0])).unwrap();
        let three = encrypt_for_recipients(b"same size", &recipients(&[0, 1, 2])).unwrap();
        assert_eq!(one.ciphertext_with_tag.len(), three.ciphertext_with_tag.len());
    }
}
