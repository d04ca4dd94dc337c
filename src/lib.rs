//! Portable encrypted file containers.
//!
//! Two self-describing formats:
//!
//! - `.osenc`: binary container, PBKDF2-HMAC-SHA256 + AES-256-GCM under a
//!   password.
//! - `.osencpk`: JSON container, AES-256-GCM under a random data key that is
//!   RSA-OAEP-wrapped once per recipient.
//!
//! Both are whole-file and in-memory. Every call is independent and holds no
//! shared state, so callers may run them on worker threads freely.

mod bytes;
pub mod crypto;
pub mod error;
pub mod format;
pub mod keystore;
pub mod storage;

pub use crate::crypto::{KdfParams, KeyBackup, Keypair, PrivateKey, PublicKey, Recipient};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::format::{
    ContainerKind, detect_container_kind, make_osenc_filename, make_osencpk_filename,
};
pub use crate::keystore::{Contact, FileKeyStore, KeyStore, MemoryKeyStore};
pub use crate::storage::AtomicFile;

use crate::crypto::{hybrid, password as pbe};
use crate::format::{osenc, osencpk};

/// Minimum password length (after trimming) accepted for encryption.
pub const MIN_PASSWORD_LEN: usize = 8;
/// Name recorded when the caller has none.
pub const DEFAULT_FILENAME: &str = "file.bin";
/// MIME type recorded when the caller has none.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Plaintext plus the metadata recorded at encryption time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFile {
    pub plaintext: Vec<u8>,
    pub filename: String,
    pub mime: String,
}

/// What is needed to open a container of either kind.
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
    Password(&'a str),
    PrivateKey(&'a PrivateKey),
}

/// Non-secret description of a container, obtained without decrypting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub kind: ContainerKind,
    pub filename: String,
    pub mime: String,
    pub original_size: u64,
    pub payload_len: usize,
    /// PBKDF2 rounds, password containers only.
    pub iterations: Option<u32>,
    /// Wrapped-key labels in order, public-key containers only.
    pub recipients: Vec<String>,
}

/// Encrypts under a password with the default PBKDF2 round count and
/// returns an `.osenc` container.
///
/// Empty `original_name` or `mime` are recorded as [`DEFAULT_FILENAME`] and
/// [`DEFAULT_MIME`].
///
/// # Errors
///
/// `Validation` if the trimmed password is shorter than
/// [`MIN_PASSWORD_LEN`] or a metadata field does not fit the header.
pub fn encrypt_password(
    plaintext: &[u8],
    password: &str,
    original_name: &str,
    mime: &str,
) -> Result<Vec<u8>> {
    encrypt_password_with_kdf(plaintext, password, original_name, mime, KdfParams::default())
}

/// Same as [`encrypt_password`] with an explicit round count.
pub fn encrypt_password_with_kdf(
    plaintext: &[u8],
    password: &str,
    original_name: &str,
    mime: &str,
    kdf: KdfParams,
) -> Result<Vec<u8>> {
    // Length in UTF-16 code units, matching browser-side checks.
    if password.trim().encode_utf16().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let sealed = pbe::encrypt_with_fresh_salt_and_iv(plaintext, password, kdf)?;
    let envelope = osenc::Envelope {
        iterations: sealed.kdf.iterations(),
        original_size: plaintext.len() as u64,
        salt: sealed.salt,
        iv: sealed.iv,
        filename: or_default(original_name, DEFAULT_FILENAME),
        mime: or_default(mime, DEFAULT_MIME),
        ciphertext_with_tag: sealed.ciphertext_with_tag,
    };
    tracing::debug!(
        iterations = envelope.iterations,
        size = plaintext.len(),
        "encrypting password container"
    );

    osenc::encode(&envelope)
}

/// Opens an `.osenc` container.
///
/// # Errors
///
/// `Format` if the container is malformed, `Authentication` if the password
/// is wrong or the data was modified.
pub fn decrypt_password(container: &[u8], password: &str) -> Result<DecryptedFile> {
    let envelope = osenc::decode(container)?;
    let plaintext = pbe::decrypt(
        &envelope.ciphertext_with_tag,
        password,
        &envelope.salt,
        &envelope.iv,
        envelope.kdf()?,
    )?;
    check_original_size(envelope.original_size, plaintext.len());

    Ok(DecryptedFile {
        plaintext,
        filename: envelope.filename,
        mime: envelope.mime,
    })
}

/// Encrypts once and wraps the data key for every recipient, in order,
/// returning an `.osencpk` document.
///
/// # Errors
///
/// `Validation` ([`Error::NoRecipients`]) if `recipients` is empty.
pub fn encrypt_public_key(
    plaintext: &[u8],
    recipients: &[Recipient],
    original_name: &str,
    mime: &str,
) -> Result<Vec<u8>> {
    let sealed = hybrid::encrypt_for_recipients(plaintext, recipients)?;

    osencpk::encode(&osencpk::PkContainer {
        iv: sealed.iv,
        wrapped_keys: sealed.wrapped_keys,
        ciphertext_with_tag: sealed.ciphertext_with_tag,
        filename: or_default(original_name, DEFAULT_FILENAME),
        mime: or_default(mime, DEFAULT_MIME),
        original_size: plaintext.len() as u64,
    })
}

/// Opens an `.osencpk` document with the first wrapped key that
/// `private_key` can unwrap.
///
/// # Errors
///
/// `Format` if the document is malformed, `NoMatchingRecipient` if no entry
/// was wrapped for this key, `Authentication` if the payload was modified.
pub fn decrypt_public_key(container: &[u8], private_key: &PrivateKey) -> Result<DecryptedFile> {
    let parsed = osencpk::decode(container)?;
    let plaintext = hybrid::decrypt_with_private_key(
        &parsed.iv,
        &parsed.wrapped_keys,
        &parsed.ciphertext_with_tag,
        private_key,
    )?;
    check_original_size(parsed.original_size, plaintext.len());

    Ok(DecryptedFile {
        plaintext,
        filename: parsed.filename,
        mime: parsed.mime,
    })
}

/// Detects the container kind and opens it with the matching credential.
pub fn decrypt_any(container: &[u8], credential: Credential<'_>) -> Result<DecryptedFile> {
    match (detect_container_kind(container), credential) {
        (ContainerKind::Password, Credential::Password(pw)) => decrypt_password(container, pw),
        (ContainerKind::PublicKey, Credential::PrivateKey(key)) => {
            decrypt_public_key(container, key)
        }
        (ContainerKind::Password, Credential::PrivateKey(_)) => Err(Error::validation(
            "this file is password-encrypted; a password is required",
        )),
        (ContainerKind::PublicKey, Credential::Password(_)) => Err(Error::validation(
            "this file is public-key encrypted; a private key is required",
        )),
    }
}

/// Describes a container from its metadata alone.
pub fn inspect(container: &[u8]) -> Result<ContainerInfo> {
    Ok(match detect_container_kind(container) {
        ContainerKind::Password => {
            let env = osenc::decode(container)?;
            ContainerInfo {
                kind: ContainerKind::Password,
                payload_len: env.ciphertext_with_tag.len(),
                iterations: Some(env.iterations),
                recipients: Vec::new(),
                filename: env.filename,
                mime: env.mime,
                original_size: env.original_size,
            }
        }
        ContainerKind::PublicKey => {
            let c = osencpk::decode(container)?;
            ContainerInfo {
                kind: ContainerKind::PublicKey,
                payload_len: c.ciphertext_with_tag.len(),
                iterations: None,
                recipients: c.wrapped_keys.into_iter().map(|w| w.label).collect(),
                filename: c.filename,
                mime: c.mime,
                original_size: c.original_size,
            }
        }
    })
}

fn or_default(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// The recorded size is informational; a mismatch is logged, not fatal.
fn check_original_size(recorded: u64, actual: usize) {
    if recorded != actual as u64 {
        tracing::warn!(recorded, actual, "original size does not match decrypted length");
    }
}
