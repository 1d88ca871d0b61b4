//! Error types for CertChain

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// The persisted chain is missing or corrupt. The ledger recovers from
    /// this by starting a fresh chain.
    #[error("Storage read error: {0}")]
    StorageRead(String),
    /// A durable write failed. Never swallowed: in-memory and on-disk state
    /// must not diverge.
    #[error("Storage write error: {0}")]
    StorageWrite(String),
    #[error("Chain is empty")]
    EmptyChain,
    #[error("Invalid block linkage")]
    InvalidBlockLinkage,
    #[error("Invalid proof of work")]
    InvalidProofOfWork,
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Invalid difficulty {0}: must be at most 64")]
    InvalidDifficulty(usize),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl ChainError {
    /// True for errors caused by the caller's request rather than by the node.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChainError::InvalidInput(_))
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
