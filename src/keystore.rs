//! Persistence of the device keypair and the contact list.
//!
//! Cipher and container code never touches this; callers load what they
//! need from a [`KeyStore`] and pass keys in explicitly.

use getrandom::fill;
use serde::{Deserialize, Serialize};

use crate::crypto::{Keypair, PrivateKey, PublicKey, Recipient, RsaPrivateJwk};
use crate::error::{Error, Result};
use crate::storage::AtomicFile;

/// A recipient public key saved under a free-form label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub label: String,
    pub public_key_base64: String,
}

impl Contact {
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_base64(&self.public_key_base64)
    }

    pub fn recipient(&self) -> Result<Recipient> {
        Ok(Recipient::new(self.label.clone(), self.public_key()?))
    }
}

pub trait KeyStore {
    /// `None` until a keypair has been generated or imported.
    fn load_device_keypair(&self) -> Result<Option<Keypair>>;

    /// Replaces the device keypair. Containers wrapped for the previous key
    /// become undecryptable here.
    fn save_device_keypair(&mut self, keypair: &Keypair) -> Result<()>;

    fn list_contacts(&self) -> Result<Vec<Contact>>;

    /// Validates the public key and stores it under a fresh random id.
    fn add_contact(&mut self, label: &str, public_key_base64: &str) -> Result<Contact>;

    fn remove_contact(&mut self, id: &str) -> Result<()>;
}

/// Picks one contact by exact id, or else by label when the label is
/// unambiguous.
pub fn find_contact<'a>(contacts: &'a [Contact], query: &str) -> Result<&'a Contact> {
    if let Some(c) = contacts.iter().find(|c| c.id == query) {
        return Ok(c);
    }
    let mut by_label = contacts.iter().filter(|c| c.label == query);
    match (by_label.next(), by_label.next()) {
        (Some(c), None) => Ok(c),
        (Some(_), Some(_)) => Err(Error::KeyStore(format!(
            "label '{query}' matches several contacts; use the contact id"
        ))),
        (None, _) => Err(Error::KeyStore(format!("contact '{query}' not found"))),
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceKeys {
    public_key: String,
    private_key: RsaPrivateJwk,
}

/// Serialized form shared by every store implementation.
#[derive(Clone, Default, Serialize, Deserialize)]
struct KeyStoreDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device: Option<DeviceKeys>,
    #[serde(default)]
    contacts: Vec<Contact>,
}

impl KeyStoreDocument {
    fn keypair(&self) -> Result<Option<Keypair>> {
        let Some(device) = &self.device else {
            return Ok(None);
        };
        let keypair = Keypair::from_private(PrivateKey::from_jwk(&device.private_key)?);
        if &PublicKey::from_base64(&device.public_key)? != keypair.public() {
            return Err(Error::KeyStore(
                "stored public key does not match the device private key".into(),
            ));
        }
        Ok(Some(keypair))
    }

    fn set_keypair(&mut self, keypair: &Keypair) -> Result<()> {
        self.device = Some(DeviceKeys {
            public_key: keypair.public().to_base64()?,
            private_key: keypair.private().to_jwk()?,
        });
        Ok(())
    }

    fn add_contact(&mut self, label: &str, public_key_base64: &str) -> Result<Contact> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::validation("contact label cannot be empty"));
        }
        let public_key = PublicKey::from_base64(public_key_base64)?;

        let contact = Contact {
            id: random_id()?,
            label: label.to_string(),
            public_key_base64: public_key.to_base64()?,
        };
        self.contacts.push(contact.clone());
        Ok(contact)
    }

    fn remove_contact(&mut self, id: &str) -> Result<()> {
        let before = self.contacts.len();
        self.contacts.retain(|c| c.id != id);
        if self.contacts.len() == before {
            return Err(Error::KeyStore(format!("contact '{id}' not found")));
        }
        Ok(())
    }
}

fn random_id() -> Result<String> {
    let mut buf = [0u8; 8];
    fill(&mut buf).map_err(|_| Error::Random)?;
    Ok(buf.iter().map(|b| format!("{b:02x}")).collect())
}

/// In-process store, mainly for tests and embedding.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    doc: KeyStoreDocument,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn load_device_keypair(&self) -> Result<Option<Keypair>> {
        self.doc.keypair()
    }

    fn save_device_keypair(&mut self, keypair: &Keypair) -> Result<()> {
        self.doc.set_keypair(keypair)
    }

    fn list_contacts(&self) -> Result<Vec<Contact>> {
        Ok(self.doc.contacts.clone())
    }

    fn add_contact(&mut self, label: &str, public_key_base64: &str) -> Result<Contact> {
        self.doc.add_contact(label, public_key_base64)
    }

    fn remove_contact(&mut self, id: &str) -> Result<()> {
        self.doc.remove_contact(id)
    }
}

/// JSON file store. Every mutation rewrites the file atomically.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    file: AtomicFile,
}

impl FileKeyStore {
    pub fn new(file: AtomicFile) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &AtomicFile {
        &self.file
    }

    fn load(&self) -> Result<KeyStoreDocument> {
        if !self.file.exists() {
            return Ok(KeyStoreDocument::default());
        }
        let data = self.file.read()?;
        serde_json::from_slice(&data).map_err(|e| {
            Error::KeyStore(format!(
                "cannot parse {}: {e}",
                self.file.path().display()
            ))
        })
    }

    fn update<T>(&self, f: impl FnOnce(&mut KeyStoreDocument) -> Result<T>) -> Result<T> {
        let mut doc = self.load()?;
        let out = f(&mut doc)?;
        self.file.write(&serde_json::to_vec_pretty(&doc)?)?;
        Ok(out)
    }
}

impl KeyStore for FileKeyStore {
    fn load_device_keypair(&self) -> Result<Option<Keypair>> {
        self.load()?.keypair()
    }

    fn save_device_keypair(&mut self, keypair: &Keypair) -> Result<()> {
        self.update(|doc| doc.set_keypair(keypair))
    }

    fn list_contacts(&self) -> Result<Vec<Contact>> {
        Ok(self.load()?.contacts)
    }

    fn add_contact(&mut self, label: &str, public_key_base64: &str) -> Result<Contact> {
        self.update(|doc| doc.add_contact(label, public_key_base64))
    }

    fn remove_contact(&mut self, id: &str) -> Result<()> {
        self.update(|doc| doc.remove_contact(id))
    }
}
