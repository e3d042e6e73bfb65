//! Host agent factory: turns a host record into a policy-bound host agent.

use std::sync::Arc;

use verity_core::error::{Result, VerityError};
use verity_core::{ConnectionString, HostRecord, TlsPolicyChoice, VerityConfig};

use crate::agent::HostAgent;
use crate::registry::VendorRegistry;
use crate::resolver::{PolicyResolution, TlsPolicyResolver};

/// Resolves host records into host agents.
///
/// Each call runs the full pipeline: address, TLS policy, connection string,
/// vendor dispatch. Host records are never modified.
#[derive(Debug, Clone)]
pub struct HostAgentFactory {
    resolver: TlsPolicyResolver,
    registry: Arc<VendorRegistry>,
    /// Stored policy applied to hosts without any policy of their own
    default_policy_id: Option<String>,
}

impl HostAgentFactory {
    pub fn new(resolver: TlsPolicyResolver, registry: Arc<VendorRegistry>) -> Self {
        Self {
            resolver,
            registry,
            default_policy_id: None,
        }
    }

    pub fn from_config(config: &VerityConfig, registry: Arc<VendorRegistry>) -> Self {
        Self::new(TlsPolicyResolver::from_config(config), registry)
            .with_default_policy_id(config.default_policy_id().map(str::to_string))
    }

    pub fn with_default_policy_id(mut self, policy_id: Option<String>) -> Self {
        self.default_policy_id = policy_id;
        self
    }

    pub fn resolver(&self) -> &TlsPolicyResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<VendorRegistry> {
        &self.registry
    }

    /// The host's own TLS policy, without the configured default.
    pub fn resolve_tls_policy(&self, host: &HostRecord) -> Option<TlsPolicyChoice> {
        self.resolver.resolve(host)
    }

    /// Build an agent for `host`, bound to its resolved TLS policy.
    ///
    /// Legacy policies that need trust material are resolved on the blocking
    /// pool, since the trust-anchor cache stats and reads its file. Must be
    /// called from within a Tokio runtime.
    pub async fn get_host_agent(&self, host: &HostRecord) -> Result<Box<dyn HostAgent>> {
        let address = host
            .address()
            .ok_or_else(|| VerityError::missing(host.label(), "no host name or IP address"))?;

        let text = host
            .connection_text()
            .ok_or_else(|| VerityError::missing(address, "no vendor connection string"))?;

        let policy = self.effective_policy(host, address).await?;

        let connection = ConnectionString::parse(
            text,
            Some(host.name.as_str()),
            host.ip_address.as_deref(),
            host.port,
        )?;

        tracing::debug!(
            host = %address,
            vendor = %connection.vendor(),
            policy = ?policy,
            "Resolved host agent target"
        );

        self.registry.get_host_agent(address, &connection, policy).await
    }

    async fn effective_policy(&self, host: &HostRecord, address: &str) -> Result<TlsPolicyChoice> {
        let resolution = if self.resolver.reads_trust_material(host) {
            let resolver = self.resolver.clone();
            let record = host.clone();
            tokio::task::spawn_blocking(move || resolver.resolve_detailed(&record))
                .await
                .map_err(|e| {
                    VerityError::Other(format!("TLS policy resolution task failed: {}", e))
                })?
        } else {
            self.resolver.resolve_detailed(host)
        };

        let reason = match resolution {
            PolicyResolution::Resolved(choice) => return Ok(choice),
            PolicyResolution::Unrecognized(name) => {
                format!("unrecognized legacy TLS policy '{}'", name)
            }
            PolicyResolution::NotConfigured => "no TLS policy".to_string(),
        };

        match &self.default_policy_id {
            Some(id) => {
                tracing::debug!(host = %address, policy_id = %id, reason = %reason, "Using default TLS policy");
                Ok(TlsPolicyChoice::PolicyId(id.clone()))
            }
            None => Err(VerityError::missing(address, reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VendorHostAgentFactory;
    use crate::trust::LegacyTrustAnchors;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use verity_core::Vendor;

    struct RecordingAgent {
        address: String,
        policy: TlsPolicyChoice,
    }

    impl HostAgent for RecordingAgent {
        fn vendor(&self) -> Vendor {
            Vendor::Intel
        }

        fn host_address(&self) -> &str {
            &self.address
        }

        fn tls_policy(&self) -> &TlsPolicyChoice {
            &self.policy
        }
    }

    struct IntelFactory;

    #[async_trait]
    impl VendorHostAgentFactory for IntelFactory {
        fn vendor_protocol(&self) -> &str {
            "intel"
        }

        async fn construct_agent(
            &self,
            address: &str,
            _connection: &ConnectionString,
            policy: TlsPolicyChoice,
        ) -> Result<Box<dyn HostAgent>> {
            Ok(Box::new(RecordingAgent {
                address: address.to_string(),
                policy,
            }))
        }
    }

    fn factory(dir: &TempDir) -> HostAgentFactory {
        let anchors = Arc::new(LegacyTrustAnchors::new(dir.path().join("tls.pem")));
        let registry = VendorRegistry::from_factories(vec![
            Arc::new(IntelFactory) as Arc<dyn VendorHostAgentFactory>
        ]);
        HostAgentFactory::new(TlsPolicyResolver::new(anchors, "changeit"), Arc::new(registry))
    }

    fn intel_host() -> HostRecord {
        HostRecord {
            connection_string: Some("intel:https://h1.example.com:1443".to_string()),
            tls_policy_id: Some("p1".to_string()),
            ..HostRecord::new("h1.example.com")
        }
    }

    #[tokio::test]
    async fn test_get_host_agent() {
        let dir = TempDir::new().unwrap();
        let agent = factory(&dir).get_host_agent(&intel_host()).await.unwrap();
        assert_eq!(agent.host_address(), "h1.example.com");
        assert_eq!(agent.tls_policy(), &TlsPolicyChoice::PolicyId("p1".to_string()));
    }

    #[tokio::test]
    async fn test_prefers_name_over_ip() {
        let dir = TempDir::new().unwrap();
        let host = HostRecord {
            ip_address: Some("10.0.0.5".to_string()),
            ..intel_host()
        };
        let agent = factory(&dir).get_host_agent(&host).await.unwrap();
        assert_eq!(agent.host_address(), "h1.example.com");

        let host = HostRecord {
            name: String::new(),
            ..host
        };
        let agent = factory(&dir).get_host_agent(&host).await.unwrap();
        assert_eq!(agent.host_address(), "10.0.0.5");
    }

    #[tokio::test]
    async fn test_missing_address() {
        let dir = TempDir::new().unwrap();
        let host = HostRecord {
            name: " ".to_string(),
            ..intel_host()
        };
        let err = factory(&dir).get_host_agent(&host).await.unwrap_err();
        assert!(err.is_configuration_missing());
    }

    #[tokio::test]
    async fn test_missing_connection_string() {
        let dir = TempDir::new().unwrap();
        let host = HostRecord {
            connection_string: None,
            ..intel_host()
        };
        let err = factory(&dir).get_host_agent(&host).await.unwrap_err();
        assert!(err.is_configuration_missing());
        assert!(err.to_string().contains("h1.example.com"));
    }

    #[tokio::test]
    async fn test_missing_policy() {
        let dir = TempDir::new().unwrap();
        let host = HostRecord {
            tls_policy_id: None,
            ..intel_host()
        };
        let factory = factory(&dir);
        assert!(factory.resolve_tls_policy(&host).is_none());
        let err = factory.get_host_agent(&host).await.unwrap_err();
        assert!(err.is_configuration_missing());
    }

    #[tokio::test]
    async fn test_unrecognized_policy_is_missing() {
        let dir = TempDir::new().unwrap();
        let host = HostRecord {
            tls_policy_id: None,
            tls_policy_name: Some("TRUST_NOBODY".to_string()),
            ..intel_host()
        };
        let err = factory(&dir).get_host_agent(&host).await.unwrap_err();
        assert!(err.is_configuration_missing());
        assert!(err.to_string().contains("TRUST_NOBODY"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_legacy_trust_material_resolved_off_runtime() {
        let dir = TempDir::new().unwrap();
        let certified =
            rcgen::generate_simple_self_signed(vec!["a.example.com".to_string()]).unwrap();
        std::fs::write(dir.path().join("tls.pem"), certified.cert.pem()).unwrap();

        let host = HostRecord {
            tls_policy_id: None,
            tls_policy_name: Some("TRUST_CA_VERIFY_HOSTNAME".to_string()),
            ..intel_host()
        };
        let factory = factory(&dir);
        assert!(factory.resolver().reads_trust_material(&host));

        let agent = factory.get_host_agent(&host).await.unwrap();
        let descriptor = agent.tls_policy().descriptor().unwrap();
        assert_eq!(descriptor.data.len(), 1);
        assert_eq!(factory.resolver().anchors().load_count(), 1);
    }

    #[tokio::test]
    async fn test_default_policy_id() {
        let dir = TempDir::new().unwrap();
        let host = HostRecord {
            tls_policy_id: None,
            ..intel_host()
        };
        let factory = factory(&dir).with_default_policy_id(Some("fleet".to_string()));

        // Not part of the host's own policy
        assert!(factory.resolve_tls_policy(&host).is_none());

        let agent = factory.get_host_agent(&host).await.unwrap();
        assert_eq!(agent.tls_policy(), &TlsPolicyChoice::PolicyId("fleet".to_string()));
    }

    #[tokio::test]
    async fn test_parse_error_propagates() {
        let dir = TempDir::new().unwrap();
        let host = HostRecord {
            connection_string: Some("hyperv:https://h1.example.com".to_string()),
            ..intel_host()
        };
        let err = factory(&dir).get_host_agent(&host).await.unwrap_err();
        assert!(matches!(err, VerityError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_vendor() {
        let dir = TempDir::new().unwrap();
        let host = HostRecord {
            connection_string: Some("citrix:https://xen.example.com".to_string()),
            ..intel_host()
        };
        let err = factory(&dir).get_host_agent(&host).await.unwrap_err();
        assert!(matches!(err, VerityError::UnsupportedVendor { .. }));
        assert!(err.is_host_scoped());
    }
}
