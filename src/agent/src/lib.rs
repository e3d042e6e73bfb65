//! Verity Agent - host trust resolution and vendor dispatch.
//!
//! Resolves the TLS trust policy of registered hosts, including pre-migration
//! legacy policies backed by a global trust-anchor file and per-host
//! keystores, and dispatches each host to the vendor factory that builds a
//! policy-bound host agent for it.

#![allow(clippy::result_large_err)]

pub mod agent;
pub mod factory;
pub mod registry;
pub mod resolver;
pub mod tls;
pub mod trust;

// Re-export common types
pub use agent::HostAgent;
pub use factory::HostAgentFactory;
pub use registry::{VendorHostAgentFactory, VendorRegistry};
pub use resolver::{LegacyTlsPolicy, PolicyResolution, TlsPolicyResolver};
pub use tls::{client_config, client_config_for_choice, resolve_descriptor};
pub use tls::{StaticTlsPolicyStore, TlsPolicyStore};
pub use trust::{CertificatePurpose, LegacyTrustAnchors, SimpleKeystore, TrustedCertificate};

/// Verity Agent version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
