//! Legacy trust material: the global trust-anchor file and per-host keystores.

pub mod anchors;
pub mod certificate;
pub mod keystore;

pub use anchors::{AnchorSnapshot, LegacyTrustAnchors};
pub use certificate::{decode_certificates, decode_pem_bundle, CertificateFormat, TrustedCertificate};
pub use keystore::{CertificatePurpose, SimpleKeystore, SimpleKeystoreBuilder};
