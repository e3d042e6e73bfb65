//! TLS trust policy data model.
//!
//! A host's TLS policy is either a reference to a stored policy or an inline
//! descriptor. The descriptor's wire form is
//! `{"policyType": "...", "protection": {...}, "data": ["<base64>", ...]}`.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VerityError};

/// Closed vocabulary of policy types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TlsPolicyType {
    /// Accept any server certificate.
    #[serde(rename = "INSECURE")]
    Insecure,
    /// Accept the first certificate seen.
    #[serde(rename = "TRUST_FIRST_CERTIFICATE")]
    TrustFirstCertificate,
    /// Material is a list of trusted subject public keys.
    #[serde(rename = "public-key")]
    PublicKey,
    /// Material is a list of trusted certificates.
    #[serde(rename = "certificate")]
    Certificate,
    /// Interpreted by the vendor agent.
    #[serde(rename = "CUSTOM")]
    Custom,
}

impl TlsPolicyType {
    /// Whether this type verifies the server against trust material.
    pub fn requires_verification(&self) -> bool {
        matches!(self, Self::PublicKey | Self::Certificate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insecure => "INSECURE",
            Self::TrustFirstCertificate => "TRUST_FIRST_CERTIFICATE",
            Self::PublicKey => "public-key",
            Self::Certificate => "certificate",
            Self::Custom => "CUSTOM",
        }
    }
}

impl std::fmt::Display for TlsPolicyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security properties required of the TLS connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsProtection {
    #[serde(default)]
    pub integrity: bool,
    #[serde(default)]
    pub encryption: bool,
    #[serde(default)]
    pub authentication: bool,
    #[serde(default)]
    pub forward_secrecy: bool,
}

impl TlsProtection {
    /// All four protections required.
    pub fn full() -> Self {
        Self {
            integrity: true,
            encryption: true,
            authentication: true,
            forward_secrecy: true,
        }
    }

    pub fn is_full(&self) -> bool {
        *self == Self::full()
    }

    pub fn is_none(&self) -> bool {
        *self == Self::default()
    }
}

/// Inline TLS policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsPolicyDescriptor {
    pub policy_type: TlsPolicyType,
    #[serde(default)]
    pub protection: TlsProtection,
    /// Base64 trust material; public keys or certificates depending on `policy_type`.
    #[serde(default)]
    pub data: Vec<String>,
}

impl TlsPolicyDescriptor {
    pub fn insecure() -> Self {
        Self {
            policy_type: TlsPolicyType::Insecure,
            protection: TlsProtection::default(),
            data: Vec::new(),
        }
    }

    pub fn trust_first_certificate() -> Self {
        Self {
            policy_type: TlsPolicyType::TrustFirstCertificate,
            protection: TlsProtection::default(),
            data: Vec::new(),
        }
    }

    /// Trust servers presenting one of these DER-encoded SubjectPublicKeyInfos.
    pub fn public_keys<I, B>(keys: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self {
            policy_type: TlsPolicyType::PublicKey,
            protection: TlsProtection::full(),
            data: encode_all(keys),
        }
    }

    /// Trust servers whose chain ends in one of these DER-encoded certificates.
    pub fn certificates<I, B>(certs: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self {
            policy_type: TlsPolicyType::Certificate,
            protection: TlsProtection::full(),
            data: encode_all(certs),
        }
    }

    /// Decode the trust material.
    pub fn decoded_data(&self) -> Result<Vec<Vec<u8>>> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, item)| {
                base64::engine::general_purpose::STANDARD
                    .decode(item.trim())
                    .map_err(|e| {
                        VerityError::TlsConfig(format!(
                            "{} policy material #{} is not valid base64: {}",
                            self.policy_type, i, e
                        ))
                    })
            })
            .collect()
    }

    /// Check the descriptor's internal consistency.
    ///
    /// Verifying types need full protection; INSECURE and
    /// TRUST_FIRST_CERTIFICATE carry no protection flags and no material.
    pub fn validate(&self) -> Result<()> {
        match self.policy_type {
            TlsPolicyType::PublicKey | TlsPolicyType::Certificate => {
                if !self.protection.is_full() {
                    return Err(VerityError::TlsConfig(format!(
                        "{} policy must require all protections",
                        self.policy_type
                    )));
                }
            }
            TlsPolicyType::Insecure | TlsPolicyType::TrustFirstCertificate => {
                if !self.protection.is_none() {
                    return Err(VerityError::TlsConfig(format!(
                        "{} policy cannot claim protection flags",
                        self.policy_type
                    )));
                }
                if !self.data.is_empty() {
                    return Err(VerityError::TlsConfig(format!(
                        "{} policy cannot carry trust material",
                        self.policy_type
                    )));
                }
            }
            TlsPolicyType::Custom => {}
        }
        self.decoded_data().map(|_| ())
    }

    /// Parse and validate a descriptor from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptor: Self = serde_json::from_str(json)?;
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// Either a reference to a stored policy or an inline descriptor, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsPolicyChoice {
    /// Opaque id of a persisted policy; not dereferenced during resolution.
    #[serde(rename = "tlsPolicyId")]
    PolicyId(String),
    #[serde(rename = "tlsPolicyDescriptor")]
    Descriptor(TlsPolicyDescriptor),
}

impl TlsPolicyChoice {
    pub fn policy_id(&self) -> Option<&str> {
        match self {
            Self::PolicyId(id) => Some(id),
            Self::Descriptor(_) => None,
        }
    }

    pub fn descriptor(&self) -> Option<&TlsPolicyDescriptor> {
        match self {
            Self::PolicyId(_) => None,
            Self::Descriptor(d) => Some(d),
        }
    }
}

fn encode_all<I, B>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    items
        .into_iter()
        .map(|b| base64::engine::general_purpose::STANDARD.encode(b.as_ref()))
        .collect()
}
