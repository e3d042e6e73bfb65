//! Vendor Host-Agent Registry
//!
//! Maps vendor protocol tags to the factories that build host agents for
//! them. The hosting application registers one factory per supported vendor
//! at startup; lookups are case-insensitive.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use verity_core::error::{Result, VerityError};
use verity_core::{ConnectionString, TlsPolicyChoice};

use crate::agent::HostAgent;

/// Builds host agents for one vendor protocol.
#[async_trait]
pub trait VendorHostAgentFactory: Send + Sync {
    /// Protocol tag this factory serves, e.g. `vmware`.
    fn vendor_protocol(&self) -> &str;

    /// Build an agent for the host at `address`.
    ///
    /// The returned agent must apply `policy` to every connection it opens.
    async fn construct_agent(
        &self,
        address: &str,
        connection: &ConnectionString,
        policy: TlsPolicyChoice,
    ) -> Result<Box<dyn HostAgent>>;
}

/// Registry of vendor factories keyed by lowercase protocol tag.
#[derive(Default)]
pub struct VendorRegistry {
    factories: DashMap<String, Arc<dyn VendorHostAgentFactory>>,
}

impl VendorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the factories available at startup, each
    /// registered under its own protocol tag.
    pub fn from_factories<I>(factories: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn VendorHostAgentFactory>>,
    {
        let registry = Self::new();
        for factory in factories {
            let tag = factory.vendor_protocol().to_string();
            registry.register(&tag, factory);
        }
        registry
    }

    /// Register a factory for `vendor`.
    ///
    /// Replaces and returns any factory previously registered for the tag.
    pub fn register(
        &self,
        vendor: &str,
        factory: Arc<dyn VendorHostAgentFactory>,
    ) -> Option<Arc<dyn VendorHostAgentFactory>> {
        let tag = normalize(vendor);
        let previous = self.factories.insert(tag.clone(), factory);
        if previous.is_some() {
            tracing::info!(vendor = %tag, "Replaced vendor host-agent factory");
        } else {
            tracing::info!(vendor = %tag, "Registered vendor host-agent factory");
        }
        previous
    }

    /// Remove the factory for `vendor`. Returns true if one was registered.
    pub fn unregister(&self, vendor: &str) -> bool {
        let removed = self.factories.remove(&normalize(vendor)).is_some();
        if removed {
            tracing::info!(vendor = %normalize(vendor), "Unregistered vendor host-agent factory");
        }
        removed
    }

    pub fn lookup(&self, vendor: &str) -> Option<Arc<dyn VendorHostAgentFactory>> {
        self.factories
            .get(&normalize(vendor))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, vendor: &str) -> bool {
        self.factories.contains_key(&normalize(vendor))
    }

    /// Registered protocol tags, sorted.
    pub fn protocols(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Construct an agent through the factory for the connection's vendor.
    pub async fn get_host_agent(
        &self,
        address: &str,
        connection: &ConnectionString,
        policy: TlsPolicyChoice,
    ) -> Result<Box<dyn HostAgent>> {
        let vendor = connection.vendor_protocol();
        let factory = self
            .lookup(vendor)
            .ok_or_else(|| VerityError::UnsupportedVendor {
                host: address.to_string(),
                vendor: connection.vendor().to_string(),
            })?;

        tracing::debug!(
            host = %address,
            vendor,
            management_server = %connection.management_server_name(),
            "Constructing host agent"
        );

        factory
            .construct_agent(address, connection, policy)
            .await
            .inspect_err(|e| {
                tracing::warn!(host = %address, vendor, error = %e, "Host agent construction failed");
            })
    }
}

impl std::fmt::Debug for VendorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

fn normalize(vendor: &str) -> String {
    vendor.trim().to_ascii_lowercase()
}
