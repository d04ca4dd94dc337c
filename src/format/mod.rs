//! Container formats.
//!
//! - [`osenc`]: compact binary container for password encryption.
//! - [`osencpk`]: JSON container for multi-recipient public-key encryption.

pub mod osenc;
pub mod osencpk;

/// File extension for password containers.
pub const OSENC_EXT: &str = ".osenc";
/// File extension for public-key containers.
pub const OSENCPK_EXT: &str = ".osencpk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Binary password container.
    Password,
    /// JSON public-key container.
    PublicKey,
}

/// Classifies raw container bytes without relying on a file extension.
///
/// A JSON document (`{` or `[` as first byte) is a public-key container;
/// anything else is treated as a password container and left for
/// [`osenc::decode`] to accept or reject. The binary magic starts with `O`,
/// so the two can never collide.
pub fn detect_container_kind(data: &[u8]) -> ContainerKind {
    match data.first() {
        Some(b'{') | Some(b'[') => ContainerKind::PublicKey,
        _ => ContainerKind::Password,
    }
}

/// Output name for a password container: `.osenc` appended unless present.
pub fn make_osenc_filename(original_name: &str) -> String {
    with_suffix(original_name, OSENC_EXT)
}

/// Output name for a public-key container.
pub fn make_osencpk_filename(original_name: &str) -> String {
    with_suffix(original_name, OSENCPK_EXT)
}

pub fn strip_osenc_suffix(name: &str) -> &str {
    name.strip_suffix(OSENC_EXT).unwrap_or(name)
}

fn with_suffix(name: &str, ext: &str) -> String {
    if name.is_empty() {
        format!("file{ext}")
    } else if name.ends_with(ext) {
        name.to_string()
    } else {
        format!("{name}{ext}")
    }
}
