//! Legacy global trust-anchor cache.
//!
//! Pre-migration deployments kept one global file of trusted TLS certificates
//! (`mtwilson-tls.pem` or a single `.crt`). The file is read lazily and only
//! re-read when its modification time advances. Each reload builds a complete
//! immutable snapshot and swaps it in, so readers never see a partial set.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use verity_core::error::{Result, VerityError};
use verity_core::VerityConfig;

use super::certificate::{decode_certificates, CertificateFormat, TrustedCertificate};

/// An immutable view of the trust-anchor file at one point in time.
#[derive(Debug)]
pub struct AnchorSnapshot {
    certificates: Vec<TrustedCertificate>,
    /// Modification time of the file this snapshot was built from
    modified: Option<SystemTime>,
    loaded_at: DateTime<Utc>,
    /// Why the snapshot is empty, if the file could not be read
    error: Option<String>,
}

impl AnchorSnapshot {
    fn empty(error: Option<String>) -> Self {
        Self {
            certificates: Vec::new(),
            modified: None,
            loaded_at: Utc::now(),
            error,
        }
    }

    pub fn certificates(&self) -> &[TrustedCertificate] {
        &self.certificates
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Read failure that produced this (empty) snapshot.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether this snapshot already reflects a file modified at `modified`.
    fn is_current(&self, modified: SystemTime) -> bool {
        self.modified.is_some_and(|loaded| modified <= loaded)
    }
}

/// Timestamp-gated, read-through cache of the legacy trust-anchor file.
pub struct LegacyTrustAnchors {
    path: PathBuf,
    snapshot: RwLock<Arc<AnchorSnapshot>>,
    /// Serializes reloads; readers never take it
    reload: Mutex<()>,
    loads: AtomicU64,
}

impl LegacyTrustAnchors {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: RwLock::new(Arc::new(AnchorSnapshot::empty(None))),
            reload: Mutex::new(()),
            loads: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &VerityConfig) -> Self {
        Self::new(config.legacy_trust_anchor_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of times the file has actually been read.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Current trust anchors, reloading the file first if it changed.
    ///
    /// Never fails: an unreadable file yields an empty snapshot.
    pub fn snapshot(&self) -> Arc<AnchorSnapshot> {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => return self.degrade(format!("{}: {}", self.path.display(), e)),
        };

        let current = self.snapshot.read().clone();
        if current.is_current(modified) {
            return current;
        }

        let _guard = self.reload.lock();

        // Another caller may have reloaded while we waited
        let current = self.snapshot.read().clone();
        if current.is_current(modified) {
            return current;
        }

        match self.load(modified) {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.snapshot.write() = snapshot.clone();
                snapshot
            }
            Err(e) => self.degrade(e.to_string()),
        }
    }

    /// Current trust-anchor certificates.
    pub fn certificates(&self) -> Vec<TrustedCertificate> {
        self.snapshot().certificates().to_vec()
    }

    /// Build a fresh snapshot from the file.
    fn load(&self, modified: SystemTime) -> Result<AnchorSnapshot> {
        let content = std::fs::read(&self.path).map_err(|e| {
            VerityError::TrustMaterial(format!(
                "Failed to read trust anchors {}: {}",
                self.path.display(),
                e
            ))
        })?;
        self.loads.fetch_add(1, Ordering::Relaxed);

        let format = CertificateFormat::detect(&self.path, &content);
        let mut certificates = Vec::new();
        let mut skipped = 0usize;

        for (index, decoded) in decode_certificates(&content, format).into_iter().enumerate() {
            match decoded {
                Ok(cert) => certificates.push(cert),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        path = %self.path.display(),
                        index,
                        error = %e,
                        "Skipping unparsable trust anchor"
                    );
                }
            }
        }

        tracing::info!(
            path = %self.path.display(),
            format = ?format,
            count = certificates.len(),
            skipped,
            "Loaded legacy trust anchors"
        );

        Ok(AnchorSnapshot {
            certificates,
            modified: Some(modified),
            loaded_at: Utc::now(),
            error: None,
        })
    }

    /// Replace the cache with an empty snapshot after a read failure.
    fn degrade(&self, reason: String) -> Arc<AnchorSnapshot> {
        let mut guard = self.snapshot.write();
        if guard.error.is_none() {
            tracing::warn!(
                path = %self.path.display(),
                error = %reason,
                "Cannot load legacy trust anchors; continuing without them"
            );
        } else {
            tracing::debug!(error = %reason, "Legacy trust anchors still unavailable");
        }
        let snapshot = Arc::new(AnchorSnapshot::empty(Some(reason)));
        *guard = snapshot.clone();
        snapshot
    }
}

impl std::fmt::Debug for LegacyTrustAnchors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyTrustAnchors")
            .field("path", &self.path)
            .field("loads", &self.load_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::certificate::tests::make_cert;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_with_mtime(path: &Path, content: &[u8], mtime: SystemTime) {
        std::fs::write(path, content).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    fn base_time() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn test_loads_pem_bundle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mtwilson-tls.pem");
        let (der_a, pem_a) = make_cert("a.example.com");
        let (der_b, pem_b) = make_cert("b.example.com");
        write_with_mtime(&path, format!("{}{}", pem_a, pem_b).as_bytes(), base_time());

        let anchors = LegacyTrustAnchors::new(&path);
        let snapshot = anchors.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.certificates()[0].der(), der_a.as_slice());
        assert_eq!(snapshot.certificates()[1].der(), der_b.as_slice());
        assert_eq!(snapshot.modified(), Some(base_time()));
        assert!(snapshot.error().is_none());
    }

    #[test]
    fn test_loads_single_der_crt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mtwilson-tls.crt");
        let (der, _) = make_cert("a.example.com");
        write_with_mtime(&path, &der, base_time());

        let anchors = LegacyTrustAnchors::new(&path);
        let certs = anchors.certificates();
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].der(), der.as_slice());
    }

    #[test]
    fn test_unchanged_mtime_serves_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tls.pem");
        let (der_a, pem_a) = make_cert("a.example.com");
        let (_, pem_b) = make_cert("b.example.com");
        write_with_mtime(&path, pem_a.as_bytes(), base_time());

        let anchors = LegacyTrustAnchors::new(&path);
        assert_eq!(anchors.snapshot().len(), 1);
        assert_eq!(anchors.load_count(), 1);

        // New content, same timestamp: not re-read
        write_with_mtime(&path, format!("{}{}", pem_a, pem_b).as_bytes(), base_time());
        let snapshot = anchors.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.certificates()[0].der(), der_a.as_slice());
        assert_eq!(anchors.load_count(), 1);
    }

    #[test]
    fn test_advanced_mtime_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tls.pem");
        let (_, pem_a) = make_cert("a.example.com");
        let (der_b, pem_b) = make_cert("b.example.com");
        write_with_mtime(&path, pem_a.as_bytes(), base_time());

        let anchors = LegacyTrustAnchors::new(&path);
        let first = anchors.snapshot();
        assert_eq!(first.len(), 1);

        write_with_mtime(&path, pem_b.as_bytes(), base_time() + Duration::from_secs(10));
        let second = anchors.snapshot();
        assert_eq!(second.len(), 1);
        assert_eq!(second.certificates()[0].der(), der_b.as_slice());
        assert_eq!(anchors.load_count(), 2);

        // The earlier snapshot is untouched by the swap
        assert_ne!(first.certificates()[0].der(), der_b.as_slice());
    }

    #[test]
    fn test_older_mtime_does_not_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tls.pem");
        let (der_a, pem_a) = make_cert("a.example.com");
        let (_, pem_b) = make_cert("b.example.com");
        write_with_mtime(&path, pem_a.as_bytes(), base_time());

        let anchors = LegacyTrustAnchors::new(&path);
        anchors.snapshot();

        write_with_mtime(&path, pem_b.as_bytes(), base_time() - Duration::from_secs(10));
        let snapshot = anchors.snapshot();
        assert_eq!(snapshot.certificates()[0].der(), der_a.as_slice());
        assert_eq!(anchors.load_count(), 1);
    }

    #[test]
    fn test_missing_file_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.pem");
        let anchors = LegacyTrustAnchors::new(&path);

        let snapshot = anchors.snapshot();
        assert!(snapshot.is_empty());
        assert!(snapshot.error().is_some());
        assert_eq!(anchors.load_count(), 0);

        // Appears later: picked up on the next call
        let (_, pem_a) = make_cert("a.example.com");
        write_with_mtime(&path, pem_a.as_bytes(), base_time());
        assert_eq!(anchors.snapshot().len(), 1);
    }

    #[test]
    fn test_removed_file_drops_previous_set() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tls.pem");
        let (_, pem_a) = make_cert("a.example.com");
        write_with_mtime(&path, pem_a.as_bytes(), base_time());

        let anchors = LegacyTrustAnchors::new(&path);
        assert_eq!(anchors.snapshot().len(), 1);

        std::fs::remove_file(&path).unwrap();
        assert!(anchors.snapshot().is_empty());

        write_with_mtime(&path, pem_a.as_bytes(), base_time());
        assert_eq!(anchors.snapshot().len(), 1);
    }

    #[test]
    fn test_unparsable_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tls.pem");
        let (der_a, pem_a) = make_cert("a.example.com");
        let content = format!(
            "-----BEGIN CERTIFICATE-----\nbm90IGEgY2VydA==\n-----END CERTIFICATE-----\n{}",
            pem_a
        );
        write_with_mtime(&path, content.as_bytes(), base_time());

        let anchors = LegacyTrustAnchors::new(&path);
        let snapshot = anchors.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.certificates()[0].der(), der_a.as_slice());
        assert!(snapshot.error().is_none());
    }

    #[test]
    fn test_unterminated_entry_keeps_following_certificate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tls.pem");
        let (der_a, pem_a) = make_cert("a.example.com");
        let (der_b, pem_b) = make_cert("b.example.com");
        let content = format!("{}-----BEGIN CERTIFICATE-----\nAQID\n{}", pem_a, pem_b);
        write_with_mtime(&path, content.as_bytes(), base_time());

        let snapshot = LegacyTrustAnchors::new(&path).snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.certificates()[0].der(), der_a.as_slice());
        assert_eq!(snapshot.certificates()[1].der(), der_b.as_slice());
    }

    #[test]
    fn test_corrupt_crt_yields_empty_set() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tls.crt");
        write_with_mtime(&path, b"\x30\x03\x01\x02", base_time());

        let anchors = LegacyTrustAnchors::new(&path);
        assert!(anchors.snapshot().is_empty());
        assert_eq!(anchors.load_count(), 1);
    }

    #[test]
    fn test_concurrent_readers_see_complete_sets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tls.pem");
        let one = make_cert("a.example.com").1;
        let three = format!(
            "{}{}{}",
            make_cert("b.example.com").1,
            make_cert("c.example.com").1,
            make_cert("d.example.com").1
        );
        write_with_mtime(&path, one.as_bytes(), base_time());

        let anchors = LegacyTrustAnchors::new(&path);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 1..=20u64 {
                    let content = if i % 2 == 0 { &one } else { &three };
                    let staging = dir.path().join("staging.pem");
                    write_with_mtime(
                        &staging,
                        content.as_bytes(),
                        base_time() + Duration::from_secs(i),
                    );
                    std::fs::rename(&staging, &path).unwrap();
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let len = anchors.snapshot().len();
                        assert!(len == 1 || len == 3, "observed partial set of {}", len);
                    }
                });
            }
        });
    }
}
