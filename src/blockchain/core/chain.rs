use crate::blockchain::core::validation::validate_chain;
use crate::error::{ChainError, Result};
use crate::miner::{self, check_difficulty, mine_block};
use crate::persistence::{InMemoryPersistence, Persistence};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_INFO: &str = "Genesis Block";

/// Current UTC time as an ISO-8601 string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: String,
    pub data: Value,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    pub fn new(index: u64, timestamp: String, data: Value, previous_hash: String) -> Self {
        let mut block = Block {
            index,
            timestamp,
            data,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Unmined genesis block stamped with the current time.
    pub fn genesis() -> Self {
        Block::new(
            0,
            now_timestamp(),
            json!({ "info": GENESIS_INFO }),
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    /// SHA-256 over `index ‖ timestamp ‖ data ‖ previous_hash ‖ nonce`.
    ///
    /// `data` is rendered as compact JSON. serde_json keeps object keys in
    /// sorted order, so the same logical payload always hashes the same way.
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_string());
        hasher.update(&self.timestamp);
        hasher.update(self.data.to_string());
        hasher.update(&self.previous_hash);
        hasher.update(self.nonce.to_string());
        hex::encode(hasher.finalize())
    }

    /// Mines in place; fails only for a difficulty above [`miner::MAX_DIFFICULTY`].
    pub fn mine(&mut self, difficulty: usize) -> Result<()> {
        miner::mine(self, difficulty)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

/// The certificate ledger: a single-writer, hash-linked append log.
pub struct Ledger {
    blocks: Vec<Block>,
    difficulty: usize,
    strict_validation: bool,
    persistence: Box<dyn Persistence>,
}

impl Ledger {
    /// Open a ledger backed by an in-memory store.
    pub fn new(difficulty: usize) -> Result<Self> {
        Self::open(difficulty, Box::new(InMemoryPersistence::new()))
    }

    /// Load the chain from `persistence`, or mine and persist a fresh genesis
    /// block when nothing usable is stored.
    pub fn open(difficulty: usize, persistence: Box<dyn Persistence>) -> Result<Self> {
        check_difficulty(difficulty)?;

        let blocks = match persistence.load_chain() {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!("Failed to load chain: {}. Starting a new chain.", e);
                Vec::new()
            }
        };

        let mut ledger = Ledger {
            blocks,
            difficulty,
            strict_validation: true,
            persistence,
        };

        if ledger.blocks.is_empty() {
            ledger.create_genesis()?;
        } else {
            info!(height = ledger.blocks.len(), "Loaded existing chain");
        }

        Ok(ledger)
    }

    /// Strict validation also checks index sequencing, the genesis block and
    /// proof-of-work. Lax validation only checks hashes and linkage.
    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    pub fn create_genesis(&mut self) -> Result<&Block> {
        if !self.blocks.is_empty() {
            return Err(ChainError::InvalidBlock(
                "Genesis block can only be created on an empty chain.".to_string(),
            ));
        }

        let genesis = mine_block(Block::genesis(), self.difficulty)?;
        self.persistence.save_chain(std::slice::from_ref(&genesis))?;
        info!(hash = %genesis.hash, difficulty = self.difficulty, "Created genesis block");
        self.blocks.push(genesis);
        self.latest()
    }

    pub fn latest(&self) -> Result<&Block> {
        self.blocks.last().ok_or(ChainError::EmptyChain)
    }

    /// Mine `data` into a new block, append it and persist the chain.
    ///
    /// If the save fails the block is removed again before the error is
    /// returned, so memory never runs ahead of disk.
    pub fn append(&mut self, data: Value) -> Result<Block> {
        let previous_hash = self.latest()?.hash.clone();
        let index = self.blocks.len() as u64;

        let block = mine_block(
            Block::new(index, now_timestamp(), data, previous_hash),
            self.difficulty,
        )?;

        self.blocks.push(block.clone());
        if let Err(e) = self.persistence.save_chain(&self.blocks) {
            self.blocks.pop();
            warn!(index, "Rolled back block after failed save: {}", e);
            return Err(e);
        }

        info!(index, hash = %block.hash, nonce = block.nonce, "Appended block");
        Ok(block)
    }

    /// Re-derive every hash and check linkage, reporting the first problem.
    pub fn validate(&self) -> Result<()> {
        validate_chain(&self.blocks, self.difficulty, self.strict_validation)
    }

    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("Chain validation failed: {}", e);
                false
            }
        }
    }

    /// First block whose payload satisfies `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Option<&Block>
    where
        P: FnMut(&Value) -> bool,
    {
        self.blocks.iter().find(|block| predicate(&block.data))
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(payloads: &[Value]) -> Ledger {
        let mut ledger = Ledger::new(1).unwrap();
        for p in payloads {
            ledger.append(p.clone()).unwrap();
        }
        ledger
    }

    #[test]
    fn test_block_hash_is_deterministic() {
        let ts = "2024-05-01T10:00:00.000Z";
        let a = Block::new(3, ts.into(), json!({"b": 1, "a": 2}), "abc".into());
        let b = Block::new(3, ts.into(), json!({"a": 2, "b": 1}), "abc".into());
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
        assert_eq!(a.nonce, 0);
    }

    #[test]
    fn test_hash_covers_every_field() {
        let base =
            Block::new(1, "2024-05-01T10:00:00.000Z".into(), json!({"cert": "A"}), "p".into());

        let mut other = base.clone();
        other.index = 2;
        assert_ne!(other.calculate_hash(), base.hash);

        let mut other = base.clone();
        other.timestamp = "2024-05-01T10:00:00.001Z".into();
        assert_ne!(other.calculate_hash(), base.hash);

        let mut other = base.clone();
        other.data = json!({"cert": "B"});
        assert_ne!(other.calculate_hash(), base.hash);

        let mut other = base.clone();
        other.previous_hash = "q".into();
        assert_ne!(other.calculate_hash(), base.hash);

        let mut other = base.clone();
        other.nonce = 1;
        assert_ne!(other.calculate_hash(), base.hash);
    }

    #[test]
    fn test_fresh_ledger_has_mined_genesis() {
        let ledger = Ledger::new(2).unwrap();
        assert_eq!(ledger.len(), 1);
        let genesis = ledger.latest().unwrap();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(genesis.data, json!({"info": GENESIS_INFO}));
        assert!(genesis.hash.starts_with("00"));
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_append_to_genesis_chain() {
        let mut ledger = Ledger::new(2).unwrap();
        let genesis_hash = ledger.latest().unwrap().hash.clone();

        let block = ledger.append(json!({"cert": "A"})).unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, genesis_hash);
        assert!(block.hash.starts_with("00"));
        assert_eq!(block.hash, block.calculate_hash());
        assert_eq!(ledger.latest().unwrap(), &block);
    }

    #[test]
    fn test_append_indices_are_sequential() {
        let ledger = ledger_with(&[json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
        for (position, block) in ledger.blocks().iter().enumerate() {
            assert_eq!(block.index, position as u64);
        }
        for pair in ledger.blocks().windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].hash);
        }
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_tampered_payload_is_detected() {
        let mut ledger = ledger_with(&[json!({"cert": "A"}), json!({"cert": "B"})]);
        ledger.blocks[1].data = json!({"cert": "forged"});
        assert!(!ledger.is_valid());
    }

    #[test]
    fn test_tampered_genesis_is_detected() {
        let mut ledger = ledger_with(&[json!({"cert": "A"})]);
        ledger.blocks[0].timestamp = "1999-01-01T00:00:00.000Z".into();
        assert!(!ledger.is_valid());
    }

    #[test]
    fn test_tampered_fields_are_detected() {
        let original = ledger_with(&[json!({"cert": "A"}), json!({"cert": "B"})]);

        let mut ledger = ledger_with(&[]);
        ledger.blocks = original.blocks().to_vec();
        ledger.blocks[1].nonce += 1;
        assert!(!ledger.is_valid());

        ledger.blocks = original.blocks().to_vec();
        ledger.blocks[1].previous_hash = "0".repeat(64);
        assert!(!ledger.is_valid());

        ledger.blocks = original.blocks().to_vec();
        ledger.blocks[2].index = 7;
        assert!(!ledger.is_valid());

        ledger.blocks = original.blocks().to_vec();
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_rehashed_block_breaks_linkage() {
        let mut ledger = ledger_with(&[json!({"cert": "A"}), json!({"cert": "B"})]);
        ledger.blocks[1].data = json!({"cert": "forged"});
        ledger.blocks[1].mine(1).unwrap();
        assert!(!ledger.is_valid());
    }

    #[test]
    fn test_find_returns_matching_block() {
        let ledger = ledger_with(&[json!({"cert": "A"}), json!({"cert": "B"})]);
        let found = ledger.find(|data| data["cert"] == "B").unwrap();
        assert_eq!(found.index, 2);
    }

    #[test]
    fn test_find_missing_payload() {
        let ledger = ledger_with(&[json!({"cert": "A"})]);
        let before = ledger.blocks().to_vec();
        assert!(ledger.find(|data| data["cert"] == "Z").is_none());
        assert_eq!(ledger.blocks(), before.as_slice());
    }

    #[test]
    fn test_latest_on_empty_chain() {
        let ledger = Ledger {
            blocks: Vec::new(),
            difficulty: 1,
            strict_validation: true,
            persistence: Box::new(InMemoryPersistence::new()),
        };
        assert!(matches!(ledger.latest(), Err(ChainError::EmptyChain)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_genesis_only_on_empty_chain() {
        let mut ledger = Ledger::new(1).unwrap();
        assert!(matches!(
            ledger.create_genesis(),
            Err(ChainError::InvalidBlock(_))
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_reopen_does_not_create_second_genesis() {
        let store = InMemoryPersistence::new();
        let first = Ledger::open(1, Box::new(store.clone())).unwrap();
        let genesis = first.latest().unwrap().clone();

        let second = Ledger::open(1, Box::new(store.clone())).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.latest().unwrap(), &genesis);
    }

    #[test]
    fn test_failed_save_rolls_back_append() {
        let store = InMemoryPersistence::new();
        let mut ledger = Ledger::open(1, Box::new(store.clone())).unwrap();
        ledger.append(json!({"cert": "A"})).unwrap();

        store.fail_writes(true);
        let result = ledger.append(json!({"cert": "B"}));
        assert!(matches!(result, Err(ChainError::StorageWrite(_))));
        assert_eq!(ledger.len(), 2);
        assert_eq!(store.snapshot().len(), 2);

        store.fail_writes(false);
        let block = ledger.append(json!({"cert": "B"})).unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(store.snapshot(), ledger.blocks());
    }

    #[test]
    fn test_failed_genesis_save_is_surfaced() {
        let store = InMemoryPersistence::new();
        store.fail_writes(true);
        assert!(matches!(
            Ledger::open(1, Box::new(store)),
            Err(ChainError::StorageWrite(_))
        ));
    }

    #[test]
    fn test_lax_validation_ignores_difficulty() {
        let store = InMemoryPersistence::new();
        let mut ledger = Ledger::open(0, Box::new(store.clone())).unwrap();
        ledger.append(json!({"cert": "A"})).unwrap();

        // Reopened with a higher target, old blocks may not meet it.
        let strict = Ledger::open(4, Box::new(store.clone())).unwrap();
        let lax = Ledger::open(4, Box::new(store)).unwrap().with_strict_validation(false);
        assert!(lax.is_valid());
        if !strict.blocks().iter().all(|b| b.hash.starts_with("0000")) {
            assert!(!strict.is_valid());
        }
    }

    #[test]
    fn test_rejects_unreachable_difficulty() {
        assert!(matches!(
            Ledger::new(65),
            Err(ChainError::InvalidDifficulty(65))
        ));
    }
}
