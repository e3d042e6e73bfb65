use thiserror::Error;

/// Verity error types
#[derive(Error, Debug)]
pub enum VerityError {
    /// Malformed vendor connection text
    #[error("Invalid connection string '{input}': {reason}")]
    Parse { input: String, reason: String },

    /// Host record lacks the information needed to reach or trust the host
    #[error("Cannot resolve host {host}: {reason}")]
    ConfigurationMissing { host: String, reason: String },

    /// No vendor factory registered for the host's protocol
    #[error("Unsupported host type: {vendor}")]
    UnsupportedVendor { host: String, vendor: String },

    /// Legacy trust-anchor material could not be read or decoded
    #[error("Trust material error: {0}")]
    TrustMaterial(String),

    /// Per-host legacy keystore could not be opened
    #[error("Keystore error: {0}")]
    Keystore(String),

    /// A resolved policy could not be turned into a TLS client configuration
    #[error("TLS policy error: {0}")]
    TlsConfig(String),

    /// Vendor factory failed to construct an agent
    #[error("Host agent error: {vendor} {host} - {message}")]
    Agent {
        host: String,
        vendor: String,
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl VerityError {
    /// Whether the failure concerns a single host only.
    ///
    /// Host-scoped failures must not stop the caller from processing other hosts.
    pub fn is_host_scoped(&self) -> bool {
        matches!(
            self,
            VerityError::Parse { .. }
                | VerityError::ConfigurationMissing { .. }
                | VerityError::UnsupportedVendor { .. }
                | VerityError::Keystore(_)
                | VerityError::TlsConfig(_)
                | VerityError::Agent { .. }
        )
    }

    /// Whether this is the "cannot resolve host" condition.
    pub fn is_configuration_missing(&self) -> bool {
        matches!(self, VerityError::ConfigurationMissing { .. })
    }

    /// Shorthand for [`VerityError::ConfigurationMissing`].
    pub fn missing(host: &str, reason: impl Into<String>) -> Self {
        VerityError::ConfigurationMissing {
            host: host.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for VerityError {
    fn from(err: serde_json::Error) -> Self {
        VerityError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for VerityError {
    fn from(err: serde_yaml::Error) -> Self {
        VerityError::SerializationError(err.to_string())
    }
}

/// Result type alias for Verity operations
pub type Result<T> = std::result::Result<T, VerityError>;
