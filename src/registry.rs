//! Certificate registry: the human-readable list of issued certificates
//!
//! The registry is a display index only. The chain is the source of truth,
//! and [`CertificateRegistry::reconcile`] restores entries that the chain
//! holds but the registry file lost.

use crate::blockchain::Block;
use crate::certificate::Certificate;
use crate::error::{ChainError, Result};
use crate::persistence::write_atomic;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Thread-safe list of certificates in issuance order, optionally backed by
/// a JSON file.
#[derive(Debug, Clone, Default)]
pub struct CertificateRegistry {
    entries: Arc<RwLock<Vec<Certificate>>>,
    path: Option<PathBuf>,
}

impl CertificateRegistry {
    /// Registry that lives only in memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the registry stored at `path`. A missing or unreadable file
    /// yields an empty registry; the next save overwrites it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to load certificate registry: {}. Starting empty.", e);
                Vec::new()
            }
        };

        Self {
            entries: Arc::new(RwLock::new(entries)),
            path: Some(path),
        }
    }

    fn load(path: &Path) -> Result<Vec<Certificate>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            ChainError::StorageRead(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            ChainError::StorageRead(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    fn save_entries(&self, entries: &[Certificate]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(entries).map_err(|e| {
            ChainError::StorageWrite(format!("Failed to serialize registry: {}", e))
        })?;

        write_atomic(path, json.as_bytes()).map_err(|e| {
            ChainError::StorageWrite(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    /// Record a certificate and persist the registry. The entry is dropped
    /// again if the write fails.
    pub fn add(&self, certificate: Certificate) -> Result<()> {
        let mut entries = self.entries.write();
        entries.push(certificate);

        if let Err(e) = self.save_entries(&entries) {
            entries.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Add every certificate carried by `blocks` that the registry lacks.
    /// Returns the number of restored entries.
    pub fn reconcile(&self, blocks: &[Block]) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();

        for cert in blocks.iter().filter_map(|b| Certificate::from_payload(&b.data)) {
            if !entries.iter().any(|e| e.id == cert.id) {
                entries.push(cert);
            }
        }

        let restored = entries.len() - before;
        if restored > 0 {
            if let Err(e) = self.save_entries(&entries) {
                entries.truncate(before);
                return Err(e);
            }
            info!(restored, "Restored registry entries from chain");
        }
        Ok(restored)
    }

    pub fn get(&self, id: &str) -> Option<Certificate> {
        self.entries.read().iter().find(|c| c.id == id).cloned()
    }

    pub fn list(&self) -> Vec<Certificate> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::IssueRequest;
    use serde_json::json;
    use tempfile::TempDir;

    fn cert(recipient: &str) -> Certificate {
        IssueRequest {
            recipient: Some(recipient.into()),
            course: Some("Rust".into()),
            grade: Some("A".into()),
            issuer: Some("Academy".into()),
            date_issued: Some("2024-03-01".into()),
        }
        .into_certificate()
        .unwrap()
    }

    #[test]
    fn test_add_and_get() {
        let registry = CertificateRegistry::new();
        let alice = cert("Alice");
        registry.add(alice.clone()).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&alice.id), Some(alice));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_persists_across_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certificates.json");

        let registry = CertificateRegistry::open(&path);
        registry.add(cert("Alice")).unwrap();
        registry.add(cert("Bob")).unwrap();

        let reopened = CertificateRegistry::open(&path);
        let names: Vec<_> = reopened.list().into_iter().map(|c| c.recipient).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_corrupt_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("certificates.json");
        fs::write(&path, "{not json").unwrap();

        let registry = CertificateRegistry::open(&path);
        assert!(registry.is_empty());
        registry.add(cert("Carol")).unwrap();
        assert_eq!(CertificateRegistry::open(&path).len(), 1);
    }

    #[test]
    fn test_failed_write_drops_entry() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("occupied");
        fs::write(&blocker, "file").unwrap();

        let registry = CertificateRegistry::open(blocker.join("certificates.json"));
        assert!(matches!(
            registry.add(cert("Dave")),
            Err(ChainError::StorageWrite(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reconcile_restores_missing_entries() {
        let registry = CertificateRegistry::new();
        let alice = cert("Alice");
        let bob = cert("Bob");
        registry.add(alice.clone()).unwrap();

        let blocks = vec![
            Block::new(0, "t0".into(), json!({"info": "Genesis Block"}), "0".into()),
            Block::new(1, "t1".into(), alice.to_payload().unwrap(), "h0".into()),
            Block::new(2, "t2".into(), bob.to_payload().unwrap(), "h1".into()),
        ];

        assert_eq!(registry.reconcile(&blocks).unwrap(), 1);
        assert_eq!(registry.get(&bob.id), Some(bob));
        assert_eq!(registry.reconcile(&blocks).unwrap(), 0);
    }
}
