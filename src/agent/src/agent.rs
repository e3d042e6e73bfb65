//! Host agent abstraction.

use verity_core::{TlsPolicyChoice, Vendor};

/// A capability for retrieving attestation data from one host.
///
/// An agent is bound at construction to exactly one target address and one
/// TLS policy; every connection it opens must honor that policy.
pub trait HostAgent: Send + Sync {
    /// Protocol family this agent speaks.
    fn vendor(&self) -> Vendor;

    /// Address of the attested host.
    fn host_address(&self) -> &str;

    /// TLS policy bound into this agent's connections.
    fn tls_policy(&self) -> &TlsPolicyChoice;
}

impl std::fmt::Debug for dyn HostAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostAgent")
            .field("vendor", &self.vendor())
            .field("host_address", &self.host_address())
            .field("tls_policy", self.tls_policy())
            .finish()
    }
}
