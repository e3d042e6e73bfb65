//! Trusted X.509 certificate decoding.
//!
//! Certificates are kept as their original DER encoding together with the
//! DER-encoded SubjectPublicKeyInfo, which are the two forms of trust
//! material a TLS policy can carry.

use std::path::Path;

use base64::Engine;
use der::{Decode, Encode};
use verity_core::error::{Result, VerityError};
use x509_cert::Certificate;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// A decoded trusted certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct TrustedCertificate {
    der: Vec<u8>,
    public_key_der: Vec<u8>,
    subject: String,
}

impl TrustedCertificate {
    /// Decode a DER-encoded X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(der).map_err(|e| {
            VerityError::TrustMaterial(format!("Failed to parse certificate: {}", e))
        })?;
        let public_key_der = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| {
                VerityError::TrustMaterial(format!("Failed to encode public key: {}", e))
            })?;

        Ok(Self {
            der: der.to_vec(),
            public_key_der,
            subject: cert.tbs_certificate.subject.to_string(),
        })
    }

    /// Full certificate encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// DER-encoded SubjectPublicKeyInfo.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// RFC 4514 subject name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Base64 of the full certificate, as carried by `certificate` policies.
    pub fn encoded_certificate(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// Base64 of the public key, as carried by `public-key` policies.
    pub fn encoded_public_key(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.public_key_der)
    }
}

impl std::fmt::Debug for TrustedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustedCertificate")
            .field("subject", &self.subject)
            .field("der_len", &self.der.len())
            .finish()
    }
}

/// On-disk encoding of a certificate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateFormat {
    /// One or more PEM `CERTIFICATE` blocks.
    PemBundle,
    /// A single binary DER certificate.
    Der,
}

impl CertificateFormat {
    /// Pick the format from the file extension, sniffing content when the
    /// extension does not settle it.
    pub fn detect(path: &Path, content: &[u8]) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pem") => Self::PemBundle,
            _ if looks_like_pem(content) => Self::PemBundle,
            _ => Self::Der,
        }
    }
}

fn looks_like_pem(content: &[u8]) -> bool {
    String::from_utf8_lossy(content).contains(PEM_BEGIN)
}

/// Decode every certificate in `content`.
///
/// Each entry is decoded independently so that one bad entry does not hide
/// the others; callers decide what to do with the failures.
pub fn decode_certificates(
    content: &[u8],
    format: CertificateFormat,
) -> Vec<Result<TrustedCertificate>> {
    match format {
        CertificateFormat::Der => vec![TrustedCertificate::from_der(content)],
        CertificateFormat::PemBundle => decode_pem_bundle(&String::from_utf8_lossy(content)),
    }
}

/// Decode all `CERTIFICATE` blocks of a PEM bundle.
pub fn decode_pem_bundle(pem: &str) -> Vec<Result<TrustedCertificate>> {
    let mut results = Vec::new();
    let mut rest = pem;

    while let Some(start) = rest.find(PEM_BEGIN) {
        let body_start = &rest[start + PEM_BEGIN.len()..];
        let next_begin = body_start.find(PEM_BEGIN);
        let end = match (body_start.find(PEM_END), next_begin) {
            (Some(end), Some(next)) if next < end => None,
            (end, _) => end,
        };

        // A block missing its END line ends at the next BEGIN
        let Some(end) = end else {
            results.push(Err(VerityError::TrustMaterial(
                "Unterminated PEM certificate block".to_string(),
            )));
            match next_begin {
                Some(next) => {
                    rest = &body_start[next..];
                    continue;
                }
                None => break,
            }
        };

        let decoded = pem_body_to_der(&body_start[..end])
            .and_then(|der| TrustedCertificate::from_der(&der));
        results.push(decoded);
        rest = &body_start[end + PEM_END.len()..];
    }

    results
}

/// Decode the base64 body between PEM armor lines.
fn pem_body_to_der(body: &str) -> Result<Vec<u8>> {
    let b64: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| {
            VerityError::TrustMaterial(format!("Failed to decode PEM certificate: {}", e))
        })
}
