//! Certificate service: issuance and verification on top of the ledger
//!
//! The ledger sits behind a single `RwLock`. Issuance holds the write lock
//! for the whole build, mine, append and persist sequence; queries hold the
//! read lock and so always observe a complete chain.

use crate::blockchain::{Block, Ledger};
use crate::certificate::{payload_has_id, Certificate, IssueRequest};
use crate::config::Config;
use crate::error::Result;
use crate::persistence::JsonFileStore;
use crate::registry::CertificateRegistry;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful issuance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issued {
    pub certificate: Certificate,
    pub block: Block,
}

/// Block fields reported by a verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub index: u64,
    pub timestamp: String,
    pub hash: String,
    pub previous_hash: String,
    pub nonce: u64,
}

impl From<&Block> for BlockSummary {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index,
            timestamp: block.timestamp.clone(),
            hash: block.hash.clone(),
            previous_hash: block.previous_hash.clone(),
            nonce: block.nonce,
        }
    }
}

/// Outcome of a lookup. "Not found" is an ordinary result.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockSummary>,
    #[serde(rename = "validChain")]
    pub chain_valid: bool,
}

#[derive(Clone)]
pub struct Service {
    ledger: Arc<RwLock<Ledger>>,
    registry: CertificateRegistry,
}

impl Service {
    pub fn new(ledger: Ledger, registry: CertificateRegistry) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            registry,
        }
    }

    /// Open the chain and registry files named in `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let store = JsonFileStore::new(&config.ledger.chain_path);
        let ledger = Ledger::open(config.ledger.difficulty, Box::new(store))?
            .with_strict_validation(config.ledger.strict_validation);

        let registry = CertificateRegistry::open(&config.registry.path);
        if let Err(e) = registry.reconcile(ledger.blocks()) {
            warn!("Failed to reconcile registry with chain: {}", e);
        }

        info!(
            chain = %config.ledger.chain_path,
            height = ledger.len(),
            difficulty = ledger.difficulty(),
            "Certificate service ready"
        );
        Ok(Self::new(ledger, registry))
    }

    /// Validate the request, record the certificate on the chain, then list
    /// it in the registry.
    ///
    /// A registry write failure is only logged: the block is already durable
    /// and the entry is restored by `reconcile` on the next start.
    pub fn issue(&self, request: IssueRequest) -> Result<Issued> {
        let certificate = request.into_certificate()?;
        let payload = certificate.to_payload()?;

        let block = self.ledger.write().append(payload)?;

        if let Err(e) = self.registry.add(certificate.clone()) {
            warn!(id = %certificate.id, "Certificate recorded on chain but not in registry: {}", e);
        }

        info!(id = %certificate.id, index = block.index, "Issued certificate");
        Ok(Issued { certificate, block })
    }

    /// Look up the certificate with `id` on the chain.
    pub fn verify(&self, id: &str) -> Verification {
        self.verify_with(|data| payload_has_id(data, id))
    }

    /// Look up the first block whose payload satisfies `matcher`.
    pub fn verify_with<P>(&self, matcher: P) -> Verification
    where
        P: FnMut(&Value) -> bool,
    {
        let ledger = self.ledger.read();
        let chain_valid = ledger.is_valid();

        match ledger.find(matcher) {
            Some(block) => Verification {
                found: true,
                certificate: Certificate::from_payload(&block.data),
                block: Some(BlockSummary::from(block)),
                chain_valid,
            },
            None => Verification {
                found: false,
                certificate: None,
                block: None,
                chain_valid,
            },
        }
    }

    pub fn dump_chain(&self) -> Vec<Block> {
        self.ledger.read().blocks().to_vec()
    }

    pub fn chain_valid(&self) -> bool {
        self.ledger.read().is_valid()
    }

    /// The full chain and its validity, taken under one lock.
    pub fn chain_report(&self) -> (Vec<Block>, bool) {
        let ledger = self.ledger.read();
        (ledger.blocks().to_vec(), ledger.is_valid())
    }

    pub fn certificates(&self) -> Vec<Certificate> {
        self.registry.list()
    }

    pub fn height(&self) -> usize {
        self.ledger.read().len()
    }

    pub fn difficulty(&self) -> usize {
        self.ledger.read().difficulty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use crate::persistence::InMemoryPersistence;
    use serde_json::json;

    fn service() -> (Service, InMemoryPersistence) {
        let store = InMemoryPersistence::new();
        let ledger = Ledger::open(1, Box::new(store.clone())).unwrap();
        (Service::new(ledger, CertificateRegistry::new()), store)
    }

    fn request(recipient: &str) -> IssueRequest {
        IssueRequest {
            recipient: Some(recipient.into()),
            course: Some("Distributed Systems".into()),
            grade: Some("B+".into()),
            issuer: Some("University".into()),
            date_issued: Some("2024-09-30".into()),
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let (service, _) = service();
        let issued = service.issue(request("Alice")).unwrap();
        assert_eq!(issued.block.index, 1);

        let verification = service.verify(&issued.certificate.id);
        assert!(verification.found);
        assert!(verification.chain_valid);
        assert_eq!(verification.certificate, Some(issued.certificate.clone()));
        assert_eq!(verification.block, Some(BlockSummary::from(&issued.block)));
        assert_eq!(service.certificates(), vec![issued.certificate]);
    }

    #[test]
    fn test_verify_unknown_id() {
        let (service, _) = service();
        service.issue(request("Alice")).unwrap();
        let height = service.height();

        let verification = service.verify("ffffffffffffffff");
        assert!(!verification.found);
        assert!(verification.certificate.is_none());
        assert!(verification.chain_valid);
        assert_eq!(service.height(), height);

        let body = serde_json::to_value(&verification).unwrap();
        assert_eq!(body, json!({"found": false, "validChain": true}));
    }

    #[test]
    fn test_bad_input_does_not_touch_chain() {
        let (service, _) = service();
        let mut req = request("Alice");
        req.course = None;

        assert!(matches!(service.issue(req), Err(ChainError::InvalidInput(_))));
        assert_eq!(service.height(), 1);
        assert!(service.certificates().is_empty());
    }

    #[test]
    fn test_storage_failure_is_surfaced() {
        let (service, store) = service();
        store.fail_writes(true);

        assert!(matches!(
            service.issue(request("Alice")),
            Err(ChainError::StorageWrite(_))
        ));
        assert_eq!(service.height(), 1);
        assert!(service.certificates().is_empty());
    }

    #[test]
    fn test_concurrent_issuance_is_serialized() {
        let (service, store) = service();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let service = service.clone();
                std::thread::spawn(move || service.issue(request(&format!("R{}", i))).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let chain = service.dump_chain();
        assert_eq!(chain.len(), 5);
        assert!(service.chain_valid());
        assert_eq!(store.snapshot(), chain);
    }

    #[test]
    fn test_verify_with_custom_matcher() {
        let (service, _) = service();
        let genesis = service.verify_with(|data| data.get("info").is_some());
        assert!(genesis.found);
        assert!(genesis.certificate.is_none());
        assert_eq!(genesis.block.map(|b| b.index), Some(0));
    }
}
