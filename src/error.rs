//! Error types for container encoding, decoding and decryption.

use thiserror::Error;

/// Broad failure classes callers branch on.
///
/// `Format`, `Authentication` and `NoMatchingRecipient` must be reported
/// differently to users: a malformed file, a wrong password or tampered
/// data, and a file that was sealed for somebody else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Format,
    Authentication,
    NoMatchingRecipient,
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("at least one recipient is required")]
    NoRecipients,

    #[error("not a valid encrypted file: {0}")]
    Format(String),

    #[error("invalid password or corrupted data")]
    Authentication,

    #[error("this file was not encrypted for your key")]
    NoMatchingRecipient,

    #[error("invalid key: {0}")]
    Key(String),

    #[error("encryption failed")]
    Encryption,

    #[error("OS random generator unavailable")]
    Random,

    #[error("key store error: {0}")]
    KeyStore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        Error::Format(reason.into())
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Error::Validation(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::NoRecipients | Error::Key(_) => ErrorKind::Validation,
            Error::Format(_) => ErrorKind::Format,
            Error::Authentication => ErrorKind::Authentication,
            Error::NoMatchingRecipient => ErrorKind::NoMatchingRecipient,
            Error::Encryption
            | Error::Random
            | Error::KeyStore(_)
            | Error::Io(_)
            | Error::Json(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
