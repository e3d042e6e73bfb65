//! Host vendor (management protocol family) identifiers.

use serde::{Deserialize, Serialize};

/// Wire-protocol family used to retrieve attestation data from a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// Intel TXT trust agent running on the host itself.
    Intel,
    /// Citrix XenServer.
    Citrix,
    /// VMware vCenter fronting one or more ESXi hosts.
    Vmware,
}

impl Vendor {
    /// All known vendors.
    pub const ALL: [Vendor; 3] = [Vendor::Intel, Vendor::Citrix, Vendor::Vmware];

    /// Lowercase protocol tag used as the registry key.
    pub fn protocol_tag(&self) -> &'static str {
        match self {
            Self::Intel => "intel",
            Self::Citrix => "citrix",
            Self::Vmware => "vmware",
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intel => write!(f, "INTEL"),
            Self::Citrix => write!(f, "CITRIX"),
            Self::Vmware => write!(f, "VMWARE"),
        }
    }
}

impl std::str::FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intel" => Ok(Self::Intel),
            "citrix" => Ok(Self::Citrix),
            "vmware" => Ok(Self::Vmware),
            _ => Err(format!(
                "unknown vendor: '{}' (supported: intel, citrix, vmware)",
                s
            )),
        }
    }
}
