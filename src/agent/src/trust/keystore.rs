//! Per-host legacy keystore.
//!
//! Hosts registered before TLS policies existed carry a small keystore blob
//! holding the certificates they were trusted with. Entry purpose is encoded
//! as an alias suffix, e.g. `vcenter.example.com (ssl)` or `root (ca)`.
//!
//! Encoding is JSON:
//!
//! ```json
//! {"entries":[{"alias":"root (ca)","certificate":"MIIB..."}],"mac":"9f2c..."}
//! ```
//!
//! `mac` is HMAC-SHA256 over the serialized `entries`, keyed by the keystore
//! password. A keystore without `mac` is accepted unverified.

use base64::Engine;
use ring::hmac;
use serde::{Deserialize, Serialize};
use verity_core::error::{Result, VerityError};

use super::certificate::TrustedCertificate;

/// Purpose of a keystore entry, taken from its alias suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificatePurpose {
    /// Certificate authority that signed the host's certificate
    Ca,
    /// The host's own TLS certificate
    Ssl,
}

impl CertificatePurpose {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ca => "ca",
            Self::Ssl => "ssl",
        }
    }

    /// Purpose encoded in `alias`, if any.
    pub fn from_alias(alias: &str) -> Option<Self> {
        let alias = alias.trim_end();
        let open = alias.rfind('(')?;
        let tag = alias[open + 1..].strip_suffix(')')?.trim();
        match tag.to_ascii_lowercase().as_str() {
            "ca" => Some(Self::Ca),
            "ssl" => Some(Self::Ssl),
            _ => None,
        }
    }

    /// Alias for `name` carrying this purpose.
    pub fn alias(&self, name: &str) -> String {
        format!("{} ({})", name, self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct KeystoreEntry {
    alias: String,
    /// Base64 DER certificate
    certificate: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeystoreFile {
    entries: Vec<KeystoreEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mac: Option<String>,
}

/// An opened, integrity-checked legacy keystore.
#[derive(Debug, Clone)]
pub struct SimpleKeystore {
    entries: Vec<KeystoreEntry>,
}

impl SimpleKeystore {
    /// Open a keystore blob with its password.
    pub fn open(bytes: &[u8], password: &str) -> Result<Self> {
        let file: KeystoreFile = serde_json::from_slice(bytes)
            .map_err(|e| VerityError::Keystore(format!("Malformed keystore: {}", e)))?;

        match &file.mac {
            Some(mac) => {
                let tag = hex::decode(mac.trim())
                    .map_err(|e| VerityError::Keystore(format!("Malformed keystore mac: {}", e)))?;
                let content = serde_json::to_vec(&file.entries)?;
                hmac::verify(&integrity_key(password), &content, &tag).map_err(|_| {
                    VerityError::Keystore(
                        "Integrity check failed: wrong password or modified keystore".to_string(),
                    )
                })?;
            }
            None => tracing::debug!("Keystore has no integrity mac; skipping verification"),
        }

        Ok(Self {
            entries: file.entries,
        })
    }

    pub fn builder() -> SimpleKeystoreBuilder {
        SimpleKeystoreBuilder::default()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.alias.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Certificates stored for `purpose`, in keystore order.
    ///
    /// Entries that fail to decode are skipped with a warning.
    pub fn trusted_certificates(&self, purpose: CertificatePurpose) -> Vec<TrustedCertificate> {
        self.entries
            .iter()
            .filter(|e| CertificatePurpose::from_alias(&e.alias) == Some(purpose))
            .filter_map(|e| match decode_entry(e) {
                Ok(cert) => Some(cert),
                Err(err) => {
                    tracing::warn!(alias = %e.alias, error = %err, "Skipping unreadable keystore entry");
                    None
                }
            })
            .collect()
    }
}

fn decode_entry(entry: &KeystoreEntry) -> Result<TrustedCertificate> {
    let der = base64::engine::general_purpose::STANDARD
        .decode(entry.certificate.trim())
        .map_err(|e| VerityError::Keystore(format!("Entry is not valid base64: {}", e)))?;
    TrustedCertificate::from_der(&der)
}

fn integrity_key(password: &str) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, password.as_bytes())
}

/// Builds sealed keystore blobs.
#[derive(Debug, Default)]
pub struct SimpleKeystoreBuilder {
    entries: Vec<KeystoreEntry>,
}

impl SimpleKeystoreBuilder {
    /// Add a DER certificate under `name` with the given purpose.
    pub fn add(mut self, name: &str, purpose: CertificatePurpose, der: &[u8]) -> Self {
        self.entries.push(KeystoreEntry {
            alias: purpose.alias(name),
            certificate: base64::engine::general_purpose::STANDARD.encode(der),
        });
        self
    }

    /// Serialize the keystore with an integrity mac keyed by `password`.
    pub fn seal(self, password: &str) -> Result<Vec<u8>> {
        let content = serde_json::to_vec(&self.entries)?;
        let tag = hmac::sign(&integrity_key(password), &content);
        let file = KeystoreFile {
            entries: self.entries,
            mac: Some(hex::encode(tag.as_ref())),
        };
        Ok(serde_json::to_vec(&file)?)
    }
}
