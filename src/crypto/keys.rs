//! RSA-OAEP device keys and their portable encodings.
//!
//! Public keys travel as base64 SPKI DER (what WebCrypto exports as
//! `spki`); private keys are persisted as RSA JWKs so a backup made in a
//! browser imports here unchanged, and the other way round.

use std::fmt;

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::{SecondsFormat, Utc};
use rand::rngs::OsRng;
use rsa::{
    BigUint, Oaep, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePublicKey, EncodePublicKey},
    traits::{PrivateKeyParts, PublicKeyParts},
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::RSA_BITS;
use crate::error::{Error, Result};

/// Smallest modulus accepted for generation or import.
pub const MIN_RSA_BITS: usize = 2048;
const PUBLIC_EXPONENT: u32 = 65_537;
const JWK_ALG: &str = "RSA-OAEP-256";
const BACKUP_VERSION: u32 = 1;

#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parses a DER `SubjectPublicKeyInfo` holding an RSA key.
    ///
    /// # Errors
    ///
    /// `Key` if the bytes are not an RSA SPKI structure or the modulus is
    /// smaller than [`MIN_RSA_BITS`].
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| Error::Key(format!("not an RSA SPKI public key: {e}")))?;
        check_size(key.size() * 8)?;
        Ok(Self(key))
    }

    /// Accepts base64 SPKI (whitespace ignored) or a PEM `PUBLIC KEY` block.
    pub fn from_base64(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.starts_with("-----BEGIN") {
            let key = RsaPublicKey::from_public_key_pem(text)
                .map_err(|e| Error::Key(format!("invalid PEM public key: {e}")))?;
            check_size(key.size() * 8)?;
            return Ok(Self(key));
        }

        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let der = STANDARD
            .decode(compact)
            .map_err(|_| Error::Key("public key is not valid base64".into()))?;
        Self::from_spki_der(&der)
    }

    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let doc = self
            .0
            .to_public_key_der()
            .map_err(|e| Error::Key(format!("cannot encode public key: {e}")))?;
        Ok(doc.as_bytes().to_vec())
    }

    pub fn to_base64(&self) -> Result<String> {
        Ok(STANDARD.encode(self.to_spki_der()?))
    }

    pub fn bits(&self) -> usize {
        self.0.size() * 8
    }

    /// RSA-OAEP-SHA256 encryption of a data key.
    pub(crate) fn wrap(&self, data_key: &[u8]) -> Result<Vec<u8>> {
        self.0
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), data_key)
            .map_err(|e| Error::Key(format!("key wrapping failed: {e}")))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey").field("bits", &self.bits()).finish()
    }
}

#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    /// `None` when the entry was not wrapped for this key (or is garbage).
    pub(crate) fn unwrap_key(&self, wrapped: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        self.0
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .ok()
            .map(Zeroizing::new)
    }

    /// Rebuilds a private key from its JWK, checking the key is consistent.
    ///
    /// # Errors
    ///
    /// `Key` for a non-RSA JWK, bad base64url components, an inconsistent
    /// key or a modulus below [`MIN_RSA_BITS`].
    pub fn from_jwk(jwk: &RsaPrivateJwk) -> Result<Self> {
        if jwk.kty != "RSA" {
            return Err(Error::Key(format!("unsupported JWK key type '{}'", jwk.kty)));
        }

        let key = RsaPrivateKey::from_components(
            jwk_uint("n", &jwk.n)?,
            jwk_uint("e", &jwk.e)?,
            jwk_uint("d", &jwk.d)?,
            vec![jwk_uint("p", &jwk.p)?, jwk_uint("q", &jwk.q)?],
        )
        .map_err(|e| Error::Key(format!("inconsistent RSA private key: {e}")))?;
        key.validate()
            .map_err(|e| Error::Key(format!("inconsistent RSA private key: {e}")))?;
        check_size(key.size() * 8)?;

        Ok(Self(key))
    }

    pub fn to_jwk(&self) -> Result<RsaPrivateJwk> {
        let key = &self.0;
        let [p, q] = key.primes() else {
            return Err(Error::Key("multi-prime RSA keys are not supported".into()));
        };
        let missing = || Error::Key("private key lacks CRT parameters".into());
        let qi = key.crt_coefficient().ok_or_else(missing)?;

        Ok(RsaPrivateJwk {
            kty: "RSA".into(),
            n: b64url(key.n()),
            e: b64url(key.e()),
            d: b64url(key.d()),
            p: b64url(p),
            q: b64url(q),
            dp: Some(b64url(key.dp().ok_or_else(missing)?)),
            dq: Some(b64url(key.dq().ok_or_else(missing)?)),
            qi: Some(b64url(&qi)),
            alg: Some(JWK_ALG.into()),
            ext: Some(true),
            key_ops: Some(vec!["decrypt".into()]),
        })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// A device keypair. The private half never leaves the device except via
/// an explicit [`KeyBackup`].
#[derive(Debug, Clone)]
pub struct Keypair {
    public: PublicKey,
    private: PrivateKey,
}

impl Keypair {
    /// RSA-OAEP keypair with a 4096-bit modulus and e = 65537.
    pub fn generate() -> Result<Self> {
        Self::generate_with_bits(RSA_BITS)
    }

    pub fn generate_with_bits(bits: usize) -> Result<Self> {
        check_size(bits)?;
        let exp = BigUint::from(PUBLIC_EXPONENT);
        let key = RsaPrivateKey::new_with_exp(&mut OsRng, bits, &exp)
            .map_err(|e| Error::Key(format!("key generation failed: {e}")))?;
        tracing::debug!(bits, "generated RSA keypair");
        Ok(Self::from_private(PrivateKey(key)))
    }

    pub fn from_private(private: PrivateKey) -> Self {
        Self {
            public: private.public_key(),
            private,
        }
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn private(&self) -> &PrivateKey {
        &self.private
    }
}

/// RSA private key in JWK form, field-compatible with WebCrypto exports.
#[derive(Clone, Serialize, Deserialize)]
pub struct RsaPrivateJwk {
    pub kty: String,
    pub n: String,
    pub e: String,
    pub d: String,
    pub p: String,
    pub q: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
}

/// Keypair backup file: `{version, exportedAt, publicKey, privateKey}`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBackup {
    pub version: u32,
    pub exported_at: String,
    pub public_key: String,
    pub private_key: RsaPrivateJwk,
}

impl KeyBackup {
    pub fn new(keypair: &Keypair) -> Result<Self> {
        Ok(Self {
            version: BACKUP_VERSION,
            exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            public_key: keypair.public().to_base64()?,
            private_key: keypair.private().to_jwk()?,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses either a backup document or a bare RSA private JWK. The public
    /// key is always re-derived from the private one; a backup whose stored
    /// public key disagrees is rejected.
    pub fn import(text: &str) -> Result<Keypair> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|_| Error::Key("key file is not valid JSON".into()))?;

        let is_backup = value.get("privateKey").is_some() && value.get("publicKey").is_some();
        let is_jwk = value.get("kty").and_then(|v| v.as_str()) == Some("RSA");

        if is_backup {
            let backup: KeyBackup = serde_json::from_value(value)
                .map_err(|e| Error::Key(format!("invalid key backup: {e}")))?;
            let keypair = Keypair::from_private(PrivateKey::from_jwk(&backup.private_key)?);
            let stored = PublicKey::from_base64(&backup.public_key)?;
            if &stored != keypair.public() {
                return Err(Error::Key(
                    "backup public key does not match its private key".into(),
                ));
            }
            Ok(keypair)
        } else if is_jwk {
            let jwk: RsaPrivateJwk = serde_json::from_value(value)
                .map_err(|e| Error::Key(format!("invalid RSA JWK: {e}")))?;
            Ok(Keypair::from_private(PrivateKey::from_jwk(&jwk)?))
        } else {
            Err(Error::Key("invalid key file format".into()))
        }
    }
}

fn check_size(bits: usize) -> Result<()> {
    if bits < MIN_RSA_BITS {
        return Err(Error::Key(format!(
            "RSA modulus of {bits} bits is below the {MIN_RSA_BITS}-bit minimum"
        )));
    }
    Ok(())
}

fn b64url(n: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(n.to_bytes_be())
}

fn jwk_uint(name: &str, value: &str) -> Result<BigUint> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|_| Error::Key(format!("JWK field '{name}' is not base64url")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}
