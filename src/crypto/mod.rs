//! Cryptographic engines behind both container formats.
//!
//! Password containers use PBKDF2-HMAC-SHA256 + AES-256-GCM; public-key
//! containers encrypt once under a random data key and wrap that key with
//! RSA-OAEP-SHA256 for each recipient.

pub mod aead;
pub mod hybrid;
pub mod kdf;
pub mod keys;
pub mod password;
pub mod resolve;

pub use aead::{generate_data_key, generate_iv, generate_salt};
pub use hybrid::{HybridCiphertext, Recipient, WrappedKey};
pub use kdf::{KdfParams, derive_key};
pub use keys::{KeyBackup, Keypair, PrivateKey, PublicKey, RsaPrivateJwk};
pub use password::PasswordCiphertext;

/// Length of a freshly generated PBKDF2 salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the AES-GCM IV (96 bits).
pub const IV_LEN: usize = 12;
/// Length of the AES-256 key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the AES-GCM authentication tag appended to ciphertext.
pub const TAG_LEN: usize = 16;
/// Default PBKDF2 round count for new password containers.
pub const DEFAULT_ITERATIONS: u32 = 310_000;
/// Default RSA modulus size for device keypairs.
pub const RSA_BITS: usize = 4096;
