//! Persistence layer for the certificate ledger
//!
//! The chain is stored as one JSON array of blocks. Stored `hash` and `nonce`
//! values are trusted on load; only ledger validation re-derives them.

use crate::blockchain::Block;
use crate::error::{ChainError, Result};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Abstraction for persistence backends. `save_chain` replaces the whole
/// stored sequence; `load_chain` returns it in index order.
pub trait Persistence: Send + Sync {
    fn save_chain(&self, blocks: &[Block]) -> Result<()>;
    fn load_chain(&self) -> Result<Vec<Block>>;
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so
/// readers see either the old contents or the new ones.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(path);
    let mut file = File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    // Atomic rename
    fs::rename(&temp_path, path)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// File-backed store holding the chain as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFileStore {
    fn save_chain(&self, blocks: &[Block]) -> Result<()> {
        let json = serde_json::to_string_pretty(blocks).map_err(|e| {
            ChainError::StorageWrite(format!("Failed to serialize chain: {}", e))
        })?;

        write_atomic(&self.path, json.as_bytes()).map_err(|e| {
            ChainError::StorageWrite(format!(
                "Failed to write chain to {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn load_chain(&self) -> Result<Vec<Block>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            ChainError::StorageRead(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            ChainError::StorageRead(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
///
/// Clones share the same storage, so a ledger can be reopened against it.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    blocks: Arc<Mutex<Vec<Block>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save_chain` fail until switched off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<Block> {
        self.blocks.lock().clone()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_chain(&self, blocks: &[Block]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ChainError::StorageWrite(
                "in-memory store is rejecting writes".to_string(),
            ));
        }
        *self.blocks.lock() = blocks.to_vec();
        Ok(())
    }

    fn load_chain(&self) -> Result<Vec<Block>> {
        Ok(self.blocks.lock().clone())
    }
}
