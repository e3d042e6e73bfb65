//! Verity Core - Host and Trust Policy Types
//!
//! This crate provides the data model shared by the trust resolution and
//! vendor dispatch engine: host records, vendor connection strings, TLS
//! policy descriptors, configuration and the error taxonomy.

pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod policy;
pub mod vendor;

// Re-export commonly used types
pub use config::VerityConfig;
pub use connection::ConnectionString;
pub use error::{Result, VerityError};
pub use host::HostRecord;
pub use policy::{TlsPolicyChoice, TlsPolicyDescriptor, TlsPolicyType, TlsProtection};
pub use vendor::Vendor;

/// Verity version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
