//! TLS policy binding for rustls.
//!
//! Vendor factories turn the policy bound to a host agent into a
//! `rustls::ClientConfig` for every connection the agent opens.
//!
//! ## Policy types
//!
//! - `INSECURE`: any server certificate is accepted
//! - `TRUST_FIRST_CERTIFICATE`: the first certificate seen is pinned for the
//!   lifetime of the config; nothing is written back to the host record
//! - `public-key`: the server's SubjectPublicKeyInfo must match one of the keys
//! - `certificate`: WebPKI chain validation against the certificates as
//!   roots, with hostname verification
//! - `CUSTOM`: not supported by this crate

use std::collections::HashMap;
use std::sync::Arc;

use der::{Decode, Encode};
use parking_lot::Mutex;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use verity_core::error::{Result, VerityError};
use verity_core::{TlsPolicyChoice, TlsPolicyDescriptor, TlsPolicyType};
use x509_cert::Certificate;

/// Source of persisted policies referenced by id.
pub trait TlsPolicyStore: Send + Sync {
    fn find(&self, policy_id: &str) -> Option<TlsPolicyDescriptor>;
}

/// In-memory policy store.
#[derive(Debug, Clone, Default)]
pub struct StaticTlsPolicyStore {
    policies: HashMap<String, TlsPolicyDescriptor>,
}

impl StaticTlsPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, policy_id: impl Into<String>, descriptor: TlsPolicyDescriptor) {
        self.policies.insert(policy_id.into(), descriptor);
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl TlsPolicyStore for StaticTlsPolicyStore {
    fn find(&self, policy_id: &str) -> Option<TlsPolicyDescriptor> {
        self.policies.get(policy_id).cloned()
    }
}

impl FromIterator<(String, TlsPolicyDescriptor)> for StaticTlsPolicyStore {
    fn from_iter<T: IntoIterator<Item = (String, TlsPolicyDescriptor)>>(iter: T) -> Self {
        Self {
            policies: iter.into_iter().collect(),
        }
    }
}

/// Dereference a policy choice into a descriptor.
pub fn resolve_descriptor(
    choice: &TlsPolicyChoice,
    store: &dyn TlsPolicyStore,
) -> Result<TlsPolicyDescriptor> {
    match choice {
        TlsPolicyChoice::Descriptor(descriptor) => Ok(descriptor.clone()),
        TlsPolicyChoice::PolicyId(id) => store
            .find(id)
            .ok_or_else(|| VerityError::TlsConfig(format!("TLS policy '{}' not found", id))),
    }
}

/// Client config for a policy choice, dereferencing ids through `store`.
pub fn client_config_for_choice(
    choice: &TlsPolicyChoice,
    store: &dyn TlsPolicyStore,
) -> Result<ClientConfig> {
    client_config(&resolve_descriptor(choice, store)?)
}

/// Build a rustls client configuration enforcing `descriptor`.
pub fn client_config(descriptor: &TlsPolicyDescriptor) -> Result<ClientConfig> {
    descriptor.validate()?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let algorithms = provider.signature_verification_algorithms;
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| VerityError::TlsConfig(format!("Unsupported protocol versions: {}", e)))?;

    let config = match descriptor.policy_type {
        TlsPolicyType::Insecure => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyVerifier { algorithms }))
            .with_no_client_auth(),
        TlsPolicyType::TrustFirstCertificate => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(FirstCertificateVerifier::new(algorithms)))
            .with_no_client_auth(),
        TlsPolicyType::PublicKey => {
            let verifier = PublicKeyVerifier {
                algorithms,
                keys: descriptor.decoded_data()?,
            };
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(verifier))
                .with_no_client_auth()
        }
        TlsPolicyType::Certificate => builder
            .with_root_certificates(root_store(descriptor)?)
            .with_no_client_auth(),
        TlsPolicyType::Custom => {
            return Err(VerityError::TlsConfig(
                "CUSTOM TLS policies cannot be bound to a connection".to_string(),
            ))
        }
    };

    tracing::debug!(
        policy_type = %descriptor.policy_type,
        material = descriptor.data.len(),
        "Built TLS client config"
    );
    Ok(config)
}

fn root_store(descriptor: &TlsPolicyDescriptor) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for (i, der) in descriptor.decoded_data()?.into_iter().enumerate() {
        roots.add(CertificateDer::from(der)).map_err(|e| {
            VerityError::TlsConfig(format!("Trusted certificate #{} rejected: {}", i, e))
        })?;
    }
    Ok(roots)
}

/// DER-encoded SubjectPublicKeyInfo of a certificate.
fn subject_public_key(cert: &CertificateDer<'_>) -> std::result::Result<Vec<u8>, rustls::Error> {
    Certificate::from_der(cert.as_ref())
        .and_then(|c| c.tbs_certificate.subject_public_key_info.to_der())
        .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadEncoding))
}

/// Accepts any server certificate; handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Pins the first server certificate it sees and rejects any other.
#[derive(Debug)]
struct FirstCertificateVerifier {
    algorithms: WebPkiSupportedAlgorithms,
    pinned: Mutex<Option<Vec<u8>>>,
}

impl FirstCertificateVerifier {
    fn new(algorithms: WebPkiSupportedAlgorithms) -> Self {
        Self {
            algorithms,
            pinned: Mutex::new(None),
        }
    }
}

impl ServerCertVerifier for FirstCertificateVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let mut pinned = self.pinned.lock();
        match pinned.as_deref() {
            None => {
                tracing::debug!(server = ?server_name, "Pinned first server certificate");
                *pinned = Some(end_entity.as_ref().to_vec());
                Ok(ServerCertVerified::assertion())
            }
            Some(known) if known == end_entity.as_ref() => Ok(ServerCertVerified::assertion()),
            Some(_) => {
                tracing::warn!(server = ?server_name, "Server certificate differs from pinned certificate");
                Err(rustls::Error::InvalidCertificate(
                    CertificateError::ApplicationVerificationFailure,
                ))
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Accepts servers whose public key is one of the trusted keys.
#[derive(Debug)]
struct PublicKeyVerifier {
    algorithms: WebPkiSupportedAlgorithms,
    /// DER-encoded SubjectPublicKeyInfos
    keys: Vec<Vec<u8>>,
}

impl ServerCertVerifier for PublicKeyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let key = subject_public_key(end_entity)?;
        if self.keys.iter().any(|trusted| *trusted == key) {
            Ok(ServerCertVerified::assertion())
        } else {
            tracing::warn!(
                server = ?server_name,
                trusted = self.keys.len(),
                "Server public key is not trusted"
            );
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
