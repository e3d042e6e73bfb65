use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VerityError};

/// Default configuration directory for legacy files
pub const DEFAULT_CONFIG_DIR: &str = "/etc/intel/cloudsecurity";

/// Default legacy trust-anchor file name
pub const DEFAULT_TLS_CERTIFICATE_FILE: &str = "mtwilson-tls.pem";

/// Default password of per-host legacy keystores
pub const DEFAULT_TLS_KEYSTORE_PASSWORD: &str = "changeit";

/// Trust resolution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerityConfig {
    /// Directory against which relative legacy file names are resolved
    pub config_dir: PathBuf,

    /// Legacy global trust-anchor file (`.pem` bundle or `.crt` certificate)
    pub tls_certificate_file: String,

    /// Password protecting per-host legacy keystores
    pub tls_keystore_password: String,

    /// Stored policy used when a host record carries no policy at all
    pub default_tls_policy_id: Option<String>,
}

impl Default for VerityConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            tls_certificate_file: DEFAULT_TLS_CERTIFICATE_FILE.to_string(),
            tls_keystore_password: DEFAULT_TLS_KEYSTORE_PASSWORD.to_string(),
            default_tls_policy_id: None,
        }
    }
}

impl VerityConfig {
    /// Load configuration from a YAML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            VerityError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&data)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
            .map_err(|e| VerityError::ConfigError(format!("Invalid configuration: {}", e)))
    }

    /// Absolute path of the legacy trust-anchor file.
    pub fn legacy_trust_anchor_path(&self) -> PathBuf {
        let file = Path::new(&self.tls_certificate_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.config_dir.join(file)
        }
    }

    /// Configured default policy id, if non-empty.
    pub fn default_policy_id(&self) -> Option<&str> {
        self.default_tls_policy_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VerityConfig::default();
        assert_eq!(
            config.legacy_trust_anchor_path(),
            PathBuf::from("/etc/intel/cloudsecurity/mtwilson-tls.pem")
        );
        assert_eq!(config.tls_keystore_password, "changeit");
        assert!(config.default_policy_id().is_none());
    }

    #[test]
    fn test_absolute_certificate_file() {
        let config = VerityConfig {
            tls_certificate_file: "/opt/trust/anchors.crt".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.legacy_trust_anchor_path(),
            PathBuf::from("/opt/trust/anchors.crt")
        );
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = VerityConfig::from_yaml(
            "config_dir: /tmp/verity\ndefault_tls_policy_id: fleet-default\n",
        )
        .unwrap();
        assert_eq!(config.config_dir, PathBuf::from("/tmp/verity"));
        assert_eq!(config.tls_certificate_file, "mtwilson-tls.pem");
        assert_eq!(config.default_policy_id(), Some("fleet-default"));
    }

    #[test]
    fn test_from_yaml_empty() {
        assert_eq!(VerityConfig::from_yaml("").unwrap(), VerityConfig::default());
    }

    #[test]
    fn test_from_yaml_invalid() {
        let err = VerityConfig::from_yaml("config_dir: [unclosed").unwrap_err();
        assert!(matches!(err, VerityError::ConfigError(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = VerityConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, VerityError::ConfigError(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("verity.yaml");
        std::fs::write(&path, "tls_keystore_password: s3cret\n").unwrap();
        let config = VerityConfig::load(&path).unwrap();
        assert_eq!(config.tls_keystore_password, "s3cret");
    }

    #[test]
    fn test_blank_default_policy_id() {
        let config = VerityConfig {
            default_tls_policy_id: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.default_policy_id().is_none());
    }
}
