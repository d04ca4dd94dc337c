//! Binary password container.
//!
//! ```text
//! MAGIC "OSENC1" (6) | VERSION (1) | ITERATIONS (u32 BE) | ORIGINAL_SIZE (u32 BE)
//! | SALT_LEN (u8) | IV_LEN (u8) | FILENAME_LEN (u16 BE) | MIME_LEN (u16 BE)
//! | SALT | IV | FILENAME (UTF-8) | MIME (UTF-8) | CIPHERTEXT || TAG (16)
//! ```

use crate::bytes::{ByteReader, utf8_lossy};
use crate::crypto::{KdfParams, TAG_LEN};
use crate::error::{Error, Result};

/// Magic bytes identifying format and major version.
pub const MAGIC: &[u8; MAGIC_LEN] = b"OSENC1";
pub const MAGIC_LEN: usize = 6;
/// Current container version.
pub const VERSION_V1: u8 = 1;

/// Fixed-size prefix before the variable-length fields.
pub const HEADER_LEN: usize = MAGIC_LEN + 1 + 4 + 4 + 1 + 1 + 2 + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub iterations: u32,
    /// Plaintext length at encryption time. Informational only.
    pub original_size: u64,
    pub salt: Vec<u8>,
    pub iv: Vec<u8>,
    pub filename: String,
    pub mime: String,
    pub ciphertext_with_tag: Vec<u8>,
}

impl Envelope {
    pub fn kdf(&self) -> Result<KdfParams> {
        KdfParams::new(self.iterations)
    }
}

/// Serializes an envelope.
///
/// # Errors
///
/// `Validation` if a value does not fit its field: zero iterations, an
/// original size over `u32::MAX`, salt/IV over 255 bytes, filename/MIME
/// over 65535 UTF-8 bytes, or a ciphertext shorter than the GCM tag.
pub fn encode(env: &Envelope) -> Result<Vec<u8>> {
    if env.iterations == 0 {
        return Err(Error::validation("iterations must be > 0"));
    }
    let original_size = u32::try_from(env.original_size)
        .map_err(|_| Error::validation("original size does not fit in 32 bits"))?;
    let salt_len =
        u8::try_from(env.salt.len()).map_err(|_| Error::validation("salt too long"))?;
    let iv_len = u8::try_from(env.iv.len()).map_err(|_| Error::validation("IV too long"))?;
    let filename_len = u16::try_from(env.filename.len())
        .map_err(|_| Error::validation("filename too long"))?;
    let mime_len =
        u16::try_from(env.mime.len()).map_err(|_| Error::validation("MIME type too long"))?;
    if env.ciphertext_with_tag.len() < TAG_LEN {
        return Err(Error::validation("ciphertext shorter than authentication tag"));
    }

    let meta_len = env.salt.len() + env.iv.len() + env.filename.len() + env.mime.len();
    let mut buf = Vec::with_capacity(HEADER_LEN + meta_len + env.ciphertext_with_tag.len());

    buf.extend_from_slice(MAGIC);
    buf.push(VERSION_V1);
    buf.extend_from_slice(&env.iterations.to_be_bytes());
    buf.extend_from_slice(&original_size.to_be_bytes());
    buf.push(salt_len);
    buf.push(iv_len);
    buf.extend_from_slice(&filename_len.to_be_bytes());
    buf.extend_from_slice(&mime_len.to_be_bytes());

    buf.extend_from_slice(&env.salt);
    buf.extend_from_slice(&env.iv);
    buf.extend_from_slice(env.filename.as_bytes());
    buf.extend_from_slice(env.mime.as_bytes());
    buf.extend_from_slice(&env.ciphertext_with_tag);

    Ok(buf)
}

/// Parses a password container. Structural checks only; no cryptography.
///
/// # Errors
///
/// `Format` with reason "too small", "bad magic", "unsupported version",
/// "invalid iterations" or "truncated".
pub fn decode(data: &[u8]) -> Result<Envelope> {
    if data.len() < HEADER_LEN {
        return Err(Error::format("too small"));
    }

    let mut r = ByteReader::new(data);
    let truncated = || Error::format("truncated");

    if r.take(MAGIC_LEN).ok_or_else(truncated)? != MAGIC {
        return Err(Error::format("bad magic"));
    }
    let version = r.u8().ok_or_else(truncated)?;
    if version != VERSION_V1 {
        return Err(Error::format(format!("unsupported version {version}")));
    }

    let iterations = r.u32_be().ok_or_else(truncated)?;
    let original_size = r.u32_be().ok_or_else(truncated)?;
    let salt_len = r.u8().ok_or_else(truncated)? as usize;
    let iv_len = r.u8().ok_or_else(truncated)? as usize;
    let filename_len = r.u16_be().ok_or_else(truncated)? as usize;
    let mime_len = r.u16_be().ok_or_else(truncated)? as usize;

    if iterations == 0 {
        return Err(Error::format("invalid iterations"));
    }

    let meta_len = salt_len + iv_len + filename_len + mime_len;
    if r.remaining() < meta_len + TAG_LEN {
        return Err(truncated());
    }

    let salt = r.take(salt_len).ok_or_else(truncated)?.to_vec();
    let iv = r.take(iv_len).ok_or_else(truncated)?.to_vec();
    let filename = utf8_lossy(r.take(filename_len).ok_or_else(truncated)?);
    let mime = utf8_lossy(r.take(mime_len).ok_or_else(truncated)?);
    let ciphertext_with_tag = r.rest().to_vec();

    tracing::debug!(
        iterations,
        salt_len,
        iv_len,
        payload = ciphertext_with_tag.len(),
        "decoded password container"
    );

    Ok(Envelope {
        iterations,
        original_size: u64::from(original_size),
        salt,
        iv,
        filename,
        mime,
        ciphertext_with_tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            iterations: 310_000,
            original_size: 11,
            salt: vec![1u8; 16],
            iv: vec![2u8; 12],
            filename: "notes.txt".into(),
            mime: "text/plain".into(),
            ciphertext_with_tag: vec![3u8; 27],
        }
    }

    #[test]
    fn header_layout_is_big_endian() {
        let bytes = encode(&sample()).unwrap();

        assert_eq!(&bytes[..6], b"OSENC1");
        assert_eq!(bytes[6], 1);
        assert_eq!(&bytes[7..11], &310_000u32.to_be_bytes());
        assert_eq!(&bytes[11..15], &[0, 0, 0, 11]);
        assert_eq!(bytes[15], 16);
        assert_eq!(bytes[16], 12);
        assert_eq!(&bytes[17..19], &[0, 9]);
        assert_eq!(&bytes[19..21], &[0, 10]);
        assert_eq!(&bytes[21 + 28..21 + 28 + 9], b"notes.txt");
        assert_eq!(bytes.len(), HEADER_LEN + 16 + 12 + 9 + 10 + 27);
    }

    #[test]
    fn decode_returns_encoded_envelope() {
        let env = sample();
        let parsed = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn utf8_filename_length_counts_bytes() {
        let mut env = sample();
        env.filename = "résumé.pdf".into();
        let bytes = encode(&env).unwrap();
        assert_eq!(&bytes[17..19], &12u16.to_be_bytes());
        assert_eq!(decode(&bytes).unwrap().filename, "résumé.pdf");
    }

    #[test]
    fn encode_rejects_out_of_range_fields() {
        let cases: Vec<Box<dyn Fn(&mut Envelope)>> = vec![
            Box::new(|e| e.iterations = 0),
            Box::new(|e| e.original_size = u64::from(u32::MAX) + 1),
            Box::new(|e| e.salt = vec![0; 256]),
            Box::new(|e| e.iv = vec![0; 256]),
            Box::new(|e| e.filename = "x".repeat(65_536)),
            Box::new(|e| e.mime = "x".repeat(65_536)),
            Box::new(|e| e.ciphertext_with_tag = vec![0; 15]),
        ];
        for mutate in cases {
            let mut env = sample();
            mutate(&mut env);
            assert!(matches!(encode(&env), Err(Error::Validation(_))));
        }
    }

    #[test]
    fn encode_accepts_field_maxima() {
        let mut env = sample();
        env.original_size = u64::from(u32::MAX);
        env.salt = vec![0; 255];
        env.filename = "x".repeat(65_535);
        let parsed = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(parsed.salt.len(), 255);
        assert_eq!(parsed.original_size, u64::from(u32::MAX));
    }

    fn reason(res: Result<Envelope>) -> String {
        match res {
            Err(Error::Format(reason)) => reason,
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn too_small_fails() {
        assert_eq!(reason(decode(&[0u8; HEADER_LEN - 1])), "too small");
        assert_eq!(reason(decode(b"")), "too small");
    }

    #[test]
    fn bad_magic_fails() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = b'X';
        assert_eq!(reason(decode(&bytes)), "bad magic");
    }

    #[test]
    fn unsupported_version_fails() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[6] = 2;
        assert!(reason(decode(&bytes)).starts_with("unsupported version"));
    }

    #[test]
    fn declared_lengths_beyond_buffer_fail() {
        let bytes = encode(&sample()).unwrap();

        // drop into the tag
        assert_eq!(reason(decode(&bytes[..bytes.len() - 12])), "truncated");

        // claim a huge MIME type
        let mut bytes = bytes.clone();
        bytes[19] = 0xFF;
        bytes[20] = 0xFF;
        assert_eq!(reason(decode(&bytes)), "truncated");

        // header only
        assert_eq!(reason(decode(&bytes[..HEADER_LEN])), "truncated");
    }

    #[test]
    fn zero_iterations_fail() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[7..11].copy_from_slice(&[0, 0, 0, 0]);
        assert_eq!(reason(decode(&bytes)), "invalid iterations");
    }

    #[test]
    fn empty_metadata_with_bare_tag_decodes() {
        let env = Envelope {
            iterations: 1,
            original_size: 0,
            salt: vec![],
            iv: vec![],
            filename: String::new(),
            mime: String::new(),
            ciphertext_with_tag: vec![0; TAG_LEN],
        };
        let bytes = encode(&env).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + TAG_LEN);
        assert_eq!(decode(&bytes).unwrap(), env);
    }
}
