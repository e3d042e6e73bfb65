//! Host record as stored by the persistence layer.
//!
//! Records are consumed read-only. Trust-policy fields exist in the current
//! form (`tls_policy_id` / `tls_policy_descriptor`) and in the pre-migration
//! form (`tls_policy_name` plus an embedded keystore).

use serde::{Deserialize, Serialize};

use crate::policy::TlsPolicyDescriptor;

/// A registered host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    /// Host name as registered; usually a DNS name
    pub name: String,

    #[serde(default)]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Vendor connection string, `<vendor>:<url>[;<user>;<pass>]`
    #[serde(default)]
    pub connection_string: Option<String>,

    #[serde(default)]
    pub tls_policy_id: Option<String>,

    #[serde(default)]
    pub tls_policy_descriptor: Option<TlsPolicyDescriptor>,

    /// Pre-migration policy name (e.g. `TRUST_CA_VERIFY_HOSTNAME`)
    #[serde(default)]
    pub tls_policy_name: Option<String>,

    /// Pre-migration per-host keystore, base64 in JSON
    #[serde(default, with = "base64_bytes")]
    pub tls_keystore: Option<Vec<u8>>,
}

impl HostRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Network address of the host: the host name when present, else the IP.
    pub fn address(&self) -> Option<&str> {
        Some(self.name.trim())
            .filter(|s| !s.is_empty())
            .or_else(|| present(&self.ip_address))
    }

    /// Label used in logs and errors.
    pub fn label(&self) -> &str {
        self.address().unwrap_or("<unnamed host>")
    }

    pub fn connection_text(&self) -> Option<&str> {
        present(&self.connection_string)
    }

    /// Stored policy id exactly as recorded; blank ids count as absent.
    pub fn policy_id(&self) -> Option<&str> {
        self.tls_policy_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn legacy_policy_name(&self) -> Option<&str> {
        present(&self.tls_policy_name)
    }

    pub fn keystore(&self) -> Option<&[u8]> {
        self.tls_keystore.as_deref().filter(|k| !k.is_empty())
    }
}

/// Non-empty, trimmed value of an optional field.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => {
                s.serialize_some(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| {
            base64::engine::general_purpose::STANDARD
                .decode(t.trim())
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
