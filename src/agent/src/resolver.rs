//! TLS trust-policy resolution for host records.
//!
//! Precedence, first match wins:
//! 1. stored policy id (returned as a reference, never dereferenced)
//! 2. inline descriptor (returned as-is)
//! 3. legacy policy name, mapped through [`LegacyTlsPolicy`]
//!
//! Legacy names that verify the peer draw their trust material from the
//! global trust-anchor file plus the host's own keystore.

use std::collections::HashSet;
use std::sync::Arc;

use verity_core::{HostRecord, TlsPolicyChoice, TlsPolicyDescriptor, VerityConfig};

use crate::trust::{CertificatePurpose, LegacyTrustAnchors, SimpleKeystore, TrustedCertificate};

/// Pre-migration named TLS policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyTlsPolicy {
    Insecure,
    TrustFirstCertificate,
    /// Pin the public keys of known certificates
    TrustKnownCertificate,
    /// Verify the chain against known certificates and check the hostname
    TrustCaVerifyHostname,
    Unrecognized(String),
}

impl LegacyTlsPolicy {
    /// Map a stored name. Matching ignores case and surrounding whitespace.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "INSECURE" => Self::Insecure,
            "TRUST_FIRST_CERTIFICATE" => Self::TrustFirstCertificate,
            "TRUST_KNOWN_CERTIFICATE" => Self::TrustKnownCertificate,
            "TRUST_CA_VERIFY_HOSTNAME" => Self::TrustCaVerifyHostname,
            _ => Self::Unrecognized(name.to_string()),
        }
    }

    /// Whether mapping this policy reads global anchors and host keystores.
    pub fn needs_trust_material(&self) -> bool {
        matches!(self, Self::TrustKnownCertificate | Self::TrustCaVerifyHostname)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Insecure => "INSECURE",
            Self::TrustFirstCertificate => "TRUST_FIRST_CERTIFICATE",
            Self::TrustKnownCertificate => "TRUST_KNOWN_CERTIFICATE",
            Self::TrustCaVerifyHostname => "TRUST_CA_VERIFY_HOSTNAME",
            Self::Unrecognized(name) => name,
        }
    }
}

impl std::fmt::Display for LegacyTlsPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of resolving a host's policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyResolution {
    Resolved(TlsPolicyChoice),
    /// The record names a legacy policy this engine does not know
    Unrecognized(String),
    /// The record carries no policy information at all
    NotConfigured,
}

impl PolicyResolution {
    /// The resolved choice; unrecognized and missing policies both collapse to `None`.
    pub fn into_choice(self) -> Option<TlsPolicyChoice> {
        match self {
            Self::Resolved(choice) => Some(choice),
            Self::Unrecognized(_) | Self::NotConfigured => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Resolves the effective TLS policy of host records.
///
/// Holds no per-host state; the legacy trust-anchor cache is the only
/// shared state and may be shared between resolvers.
#[derive(Debug, Clone)]
pub struct TlsPolicyResolver {
    anchors: Arc<LegacyTrustAnchors>,
    keystore_password: String,
}

impl TlsPolicyResolver {
    pub fn new(anchors: Arc<LegacyTrustAnchors>, keystore_password: impl Into<String>) -> Self {
        Self {
            anchors,
            keystore_password: keystore_password.into(),
        }
    }

    pub fn from_config(config: &VerityConfig) -> Self {
        Self::new(
            Arc::new(LegacyTrustAnchors::from_config(config)),
            config.tls_keystore_password.clone(),
        )
    }

    pub fn anchors(&self) -> &Arc<LegacyTrustAnchors> {
        &self.anchors
    }

    /// Effective policy of `host`, or `None` when it has none usable.
    pub fn resolve(&self, host: &HostRecord) -> Option<TlsPolicyChoice> {
        self.resolve_detailed(host).into_choice()
    }

    /// Whether resolving `host` goes through the legacy trust-anchor file.
    pub fn reads_trust_material(&self, host: &HostRecord) -> bool {
        host.policy_id().is_none()
            && host.tls_policy_descriptor.is_none()
            && host
                .legacy_policy_name()
                .is_some_and(|name| LegacyTlsPolicy::parse(name).needs_trust_material())
    }

    /// Effective policy of `host`, distinguishing why none was found.
    pub fn resolve_detailed(&self, host: &HostRecord) -> PolicyResolution {
        let label = host.label();

        if let Some(id) = host.policy_id() {
            tracing::debug!(host = %label, policy_id = %id, "Using stored TLS policy reference");
            return PolicyResolution::Resolved(TlsPolicyChoice::PolicyId(id.to_string()));
        }

        if let Some(descriptor) = &host.tls_policy_descriptor {
            tracing::debug!(
                host = %label,
                policy_type = %descriptor.policy_type,
                "Using inline TLS policy descriptor"
            );
            return PolicyResolution::Resolved(TlsPolicyChoice::Descriptor(descriptor.clone()));
        }

        let Some(name) = host.legacy_policy_name() else {
            tracing::debug!(host = %label, "Host has no TLS policy");
            return PolicyResolution::NotConfigured;
        };

        let legacy = LegacyTlsPolicy::parse(name);
        let descriptor = match &legacy {
            LegacyTlsPolicy::Insecure => TlsPolicyDescriptor::insecure(),
            LegacyTlsPolicy::TrustFirstCertificate => TlsPolicyDescriptor::trust_first_certificate(),
            LegacyTlsPolicy::TrustKnownCertificate => {
                let certs = self.trusted_certificates(host);
                TlsPolicyDescriptor::public_keys(certs.iter().map(|c| c.public_key_der()))
            }
            LegacyTlsPolicy::TrustCaVerifyHostname => {
                let certs = self.trusted_certificates(host);
                TlsPolicyDescriptor::certificates(certs.iter().map(|c| c.der()))
            }
            LegacyTlsPolicy::Unrecognized(name) => {
                tracing::warn!(host = %label, policy = %name, "Unrecognized legacy TLS policy");
                return PolicyResolution::Unrecognized(name.clone());
            }
        };

        tracing::debug!(
            host = %label,
            legacy_policy = %legacy,
            policy_type = %descriptor.policy_type,
            material = descriptor.data.len(),
            "Mapped legacy TLS policy"
        );
        PolicyResolution::Resolved(TlsPolicyChoice::Descriptor(descriptor))
    }

    /// Union of global trust anchors and the host's CA and SSL keystore
    /// entries, without duplicates, in that order.
    fn trusted_certificates(&self, host: &HostRecord) -> Vec<TrustedCertificate> {
        let anchors = self.anchors.snapshot();
        let host_certs = self.keystore_certificates(host);

        let mut seen = HashSet::new();
        anchors
            .certificates()
            .iter()
            .cloned()
            .chain(host_certs)
            .filter(|cert| seen.insert(cert.der().to_vec()))
            .collect()
    }

    fn keystore_certificates(&self, host: &HostRecord) -> Vec<TrustedCertificate> {
        let Some(bytes) = host.keystore() else {
            return Vec::new();
        };

        match SimpleKeystore::open(bytes, &self.keystore_password) {
            Ok(keystore) => {
                let mut certs = keystore.trusted_certificates(CertificatePurpose::Ca);
                certs.extend(keystore.trusted_certificates(CertificatePurpose::Ssl));
                certs
            }
            Err(e) => {
                tracing::warn!(
                    host = %host.label(),
                    error = %e,
                    "Cannot open host keystore; using global trust anchors only"
                );
                Vec::new()
            }
        }
    }
}
