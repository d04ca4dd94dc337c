//! JSON public-key container.
//!
//! Two schema versions are readable; only v2 is written.
//!
//! ```text
//! v1: {"v":1,"iv","wrappedKey","ciphertext","filename","mime","originalSize"}
//! v2: {"v":2,"iv","wrappedKeys":[{"label","wrappedKey"}],"ciphertext","filename","mime","originalSize"}
//! ```
//!
//! Binary fields are standard base64. Descriptive metadata that is missing,
//! empty or of the wrong JSON type falls back to defaults since it does not
//! affect decryptability.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::WrappedKey;
use crate::error::{Error, Result};

pub const VERSION_V1: u64 = 1;
pub const VERSION_V2: u64 = 2;

/// Label given to the single recipient of a v1 document.
pub const V1_RECIPIENT_LABEL: &str = "Recipient";
/// Label given to v2 entries that carry none.
pub const UNKNOWN_LABEL: &str = "Unknown";
pub const DEFAULT_FILENAME: &str = "file";
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Legacy single-recipient document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkEnvelopeV1 {
    #[serde(deserialize_with = "version_number")]
    pub v: u64,
    pub iv: Option<String>,
    pub wrapped_key: Option<String>,
    pub ciphertext: Option<String>,
    pub filename: Option<Value>,
    pub mime: Option<Value>,
    pub original_size: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKeyEntry {
    #[serde(default)]
    pub label: Option<Value>,
    #[serde(default)]
    pub wrapped_key: Option<String>,
}

/// Multi-recipient document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkEnvelopeV2 {
    #[serde(deserialize_with = "version_number")]
    pub v: u64,
    pub iv: Option<String>,
    pub wrapped_keys: Option<Vec<WrappedKeyEntry>>,
    pub ciphertext: Option<String>,
    pub filename: Option<Value>,
    pub mime: Option<Value>,
    pub original_size: Option<Value>,
}

/// One constructor per schema version, selected by the `v` tag.
#[derive(Debug, Clone)]
pub enum PkEnvelope {
    V1(PkEnvelopeV1),
    V2(PkEnvelopeV2),
}

/// A decoded container, normalized across schema versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkContainer {
    pub iv: Vec<u8>,
    pub wrapped_keys: Vec<WrappedKey>,
    pub ciphertext_with_tag: Vec<u8>,
    pub filename: String,
    pub mime: String,
    pub original_size: u64,
}

/// Serializes a container as a v2 document.
pub fn encode(container: &PkContainer) -> Result<Vec<u8>> {
    let doc = PkEnvelopeV2 {
        v: VERSION_V2,
        iv: Some(STANDARD.encode(&container.iv)),
        wrapped_keys: Some(
            container
                .wrapped_keys
                .iter()
                .map(|wk| WrappedKeyEntry {
                    label: Some(Value::from(wk.label.as_str())),
                    wrapped_key: Some(STANDARD.encode(&wk.wrapped_key)),
                })
                .collect(),
        ),
        ciphertext: Some(STANDARD.encode(&container.ciphertext_with_tag)),
        filename: Some(Value::from(container.filename.as_str())),
        mime: Some(Value::from(container.mime.as_str())),
        original_size: Some(Value::from(container.original_size)),
    };
    Ok(serde_json::to_vec(&doc)?)
}

/// Parses the raw JSON into its versioned shape without validating fields.
pub fn parse(data: &[u8]) -> Result<PkEnvelope> {
    let value: Value =
        serde_json::from_slice(data).map_err(|_| Error::format("not valid JSON"))?;

    let malformed = |e: serde_json::Error| Error::format(format!("malformed fields: {e}"));
    match value.get("v").and_then(whole_number) {
        Some(VERSION_V1) => Ok(PkEnvelope::V1(
            serde_json::from_value(value).map_err(malformed)?,
        )),
        Some(VERSION_V2) => Ok(PkEnvelope::V2(
            serde_json::from_value(value).map_err(malformed)?,
        )),
        _ => Err(Error::format("unsupported version")),
    }
}

/// Parses and validates a public-key container.
///
/// # Errors
///
/// `Format` with reason "not valid JSON", "unsupported version",
/// "missing fields" or "invalid base64".
pub fn decode(data: &[u8]) -> Result<PkContainer> {
    let container = match parse(data)? {
        PkEnvelope::V1(doc) => {
            let wrapped_key = required(doc.wrapped_key.as_deref())?;
            PkContainer {
                iv: b64(required(doc.iv.as_deref())?)?,
                wrapped_keys: vec![WrappedKey {
                    label: V1_RECIPIENT_LABEL.into(),
                    wrapped_key: b64(wrapped_key)?,
                }],
                ciphertext_with_tag: b64(required(doc.ciphertext.as_deref())?)?,
                filename: text_or(doc.filename, DEFAULT_FILENAME),
                mime: text_or(doc.mime, DEFAULT_MIME),
                original_size: doc.original_size.as_ref().and_then(whole_number).unwrap_or(0),
            }
        }
        PkEnvelope::V2(doc) => {
            let entries = doc.wrapped_keys.unwrap_or_default();
            if entries.is_empty() {
                return Err(Error::format("missing fields"));
            }
            let wrapped_keys = entries
                .into_iter()
                .map(|entry| {
                    Ok(WrappedKey {
                        wrapped_key: b64(required(entry.wrapped_key.as_deref())?)?,
                        label: text_or(entry.label, UNKNOWN_LABEL),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            PkContainer {
                iv: b64(required(doc.iv.as_deref())?)?,
                wrapped_keys,
                ciphertext_with_tag: b64(required(doc.ciphertext.as_deref())?)?,
                filename: text_or(doc.filename, DEFAULT_FILENAME),
                mime: text_or(doc.mime, DEFAULT_MIME),
                original_size: doc.original_size.as_ref().and_then(whole_number).unwrap_or(0),
            }
        }
    };

    tracing::debug!(
        recipients = container.wrapped_keys.len(),
        payload = container.ciphertext_with_tag.len(),
        "decoded public-key container"
    );
    Ok(container)
}

fn required(field: Option<&str>) -> Result<&str> {
    match field {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(Error::format("missing fields")),
    }
}

/// Descriptive text: anything but a non-empty string takes the fallback.
fn text_or(field: Option<Value>, fallback: &str) -> String {
    match field {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => fallback.to_string(),
    }
}

/// Non-negative integer, also when written as a float like `2.0`.
fn whole_number(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && (0.0..=u64::MAX as f64).contains(f))
            .map(|f| f as u64)
    })
}

fn version_number<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    whole_number(&value).ok_or_else(|| serde::de::Error::custom("invalid version number"))
}

fn b64(field: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(field)
        .map_err(|_| Error::format("invalid base64"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PkContainer {
        PkContainer {
            iv: vec![1u8; 12],
            wrapped_keys: vec![
                WrappedKey {
                    label: "alice".into(),
                    wrapped_key: vec![2u8; 64],
                },
                WrappedKey {
                    label: "bob".into(),
                    wrapped_key: vec![3u8; 64],
                },
            ],
            ciphertext_with_tag: vec![4u8; 20],
            filename: "report.pdf".into(),
            mime: "application/pdf".into(),
            original_size: 4,
        }
    }

    fn reason(res: Result<PkContainer>) -> String {
        match res {
            Err(Error::Format(reason)) => reason,
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn encodes_v2_document_in_field_order() {
        let bytes = encode(&sample()).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("{\"v\":2,\"iv\":\"AQEBAQEBAQEBAQEB\",\"wrappedKeys\":[{\"label\":\"alice\""));
        assert!(text.ends_with("\"filename\":\"report.pdf\",\"mime\":\"application/pdf\",\"originalSize\":4}"));
    }

    #[test]
    fn decode_returns_encoded_container() {
        let c = sample();
        assert_eq!(decode(&encode(&c).unwrap()).unwrap(), c);
    }

    #[test]
    fn v1_document_becomes_single_recipient() {
        let doc = br#"{"v":1,"iv":"AQEBAQEBAQEBAQEB","wrappedKey":"AgIC","ciphertext":"BAQEBAQEBAQEBAQEBAQEBA==","filename":"a.txt","mime":"text/plain","originalSize":0}"#;
        let c = decode(doc).unwrap();

        assert_eq!(c.wrapped_keys.len(), 1);
        assert_eq!(c.wrapped_keys[0].label, "Recipient");
        assert_eq!(c.wrapped_keys[0].wrapped_key, vec![2u8; 3]);
        assert_eq!(c.filename, "a.txt");
        assert!(matches!(parse(doc).unwrap(), PkEnvelope::V1(_)));
    }

    #[test]
    fn missing_metadata_uses_defaults() {
        let doc = br#"{"v":2,"iv":"AQEB","wrappedKeys":[{"wrappedKey":"AgIC"},{"label":"","wrappedKey":"AgIC"}],"ciphertext":"BAQE"}"#;
        let c = decode(doc).unwrap();

        assert_eq!(c.filename, "file");
        assert_eq!(c.mime, "application/octet-stream");
        assert_eq!(c.original_size, 0);
        assert_eq!(c.wrapped_keys[0].label, "Unknown");
        assert_eq!(c.wrapped_keys[1].label, "Unknown");
    }

    #[test]
    fn invalid_json_fails() {
        assert_eq!(reason(decode(b"{not json")), "not valid JSON");
        assert_eq!(reason(decode(b"\xff\xfe")), "not valid JSON");
    }

    #[test]
    fn unknown_or_absent_version_fails() {
        assert_eq!(reason(decode(br#"{"v":3,"iv":"AA=="}"#)), "unsupported version");
        assert_eq!(reason(decode(br#"{"iv":"AA=="}"#)), "unsupported version");
        assert_eq!(reason(decode(b"[1,2]")), "unsupported version");
    }

    #[test]
    fn required_fields_enforced_per_version() {
        let cases: [&[u8]; 6] = [
            br#"{"v":1,"iv":"AQEB","ciphertext":"BAQE"}"#,
            br#"{"v":1,"wrappedKey":"AgIC","ciphertext":"BAQE"}"#,
            br#"{"v":2,"iv":"AQEB","ciphertext":"BAQE"}"#,
            br#"{"v":2,"iv":"AQEB","wrappedKeys":[],"ciphertext":"BAQE"}"#,
            br#"{"v":2,"iv":"AQEB","wrappedKeys":[{"label":"x"}],"ciphertext":"BAQE"}"#,
            br#"{"v":2,"iv":"","wrappedKeys":[{"wrappedKey":"AgIC"}],"ciphertext":"BAQE"}"#,
        ];
        for doc in cases {
            assert_eq!(reason(decode(doc)), "missing fields");
        }
    }

    #[test]
    fn bad_base64_fails() {
        let doc = br#"{"v":2,"iv":"!!!","wrappedKeys":[{"wrappedKey":"AgIC"}],"ciphertext":"BAQE"}"#;
        assert_eq!(reason(decode(doc)), "invalid base64");
    }

    #[test]
    fn mistyped_metadata_uses_defaults() {
        let doc = br#"{"v":2,"iv":"AQEB","wrappedKeys":[{"label":7,"wrappedKey":"AgIC"}],"ciphertext":"BAQE","filename":["x"],"mime":false,"originalSize":4.0}"#;
        let c = decode(doc).unwrap();

        assert_eq!(c.wrapped_keys[0].label, "Unknown");
        assert_eq!(c.filename, "file");
        assert_eq!(c.mime, "application/octet-stream");
        assert_eq!(c.original_size, 4);

        let doc = br#"{"v":1,"iv":"AQEB","wrappedKey":"AgIC","ciphertext":"BAQE","originalSize":-3}"#;
        assert_eq!(decode(doc).unwrap().original_size, 0);
        let doc = br#"{"v":1,"iv":"AQEB","wrappedKey":"AgIC","ciphertext":"BAQE","originalSize":"12"}"#;
        assert_eq!(decode(doc).unwrap().original_size, 0);
    }

    #[test]
    fn float_versions_are_accepted() {
        let v2 = br#"{"v":2.0,"iv":"AQEB","wrappedKeys":[{"label":"a","wrappedKey":"AgIC"}],"ciphertext":"BAQE"}"#;
        assert!(matches!(parse(v2).unwrap(), PkEnvelope::V2(_)));
        assert_eq!(decode(v2).unwrap().wrapped_keys[0].label, "a");

        let v1 = br#"{"v":1.0,"iv":"AQEB","wrappedKey":"AgIC","ciphertext":"BAQE"}"#;
        assert_eq!(decode(v1).unwrap().wrapped_keys[0].label, "Recipient");

        assert_eq!(reason(decode(br#"{"v":1.5,"iv":"AQEB"}"#)), "unsupported version");
        assert_eq!(reason(decode(br#"{"v":"2","iv":"AQEB"}"#)), "unsupported version");
    }

    #[test]
    fn wrong_field_types_fail() {
        let doc = br#"{"v":2,"iv":5,"wrappedKeys":[{"wrappedKey":"AgIC"}],"ciphertext":"BAQE"}"#;
        assert!(reason(decode(doc)).starts_with("malformed fields"));
        let doc = br#"{"v":2,"iv":"AQEB","wrappedKeys":[{"wrappedKey":9}],"ciphertext":"BAQE"}"#;
        assert!(reason(decode(doc)).starts_with("malformed fields"));
    }
}
