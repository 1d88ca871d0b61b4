//! CertChain - certificate issuance and verification on a local hash chain
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the ledger and chain validation
//! - [`miner`] - Proof-of-work mining
//! - [`persistence`] - Chain storage (atomic JSON file, in-memory)
//!
//! ## Certificates
//! - [`certificate`] - Certificate records and issuance requests
//! - [`registry`] - Human-readable certificate list
//! - [`service`] - Issue / verify interface over the ledger
//!
//! ## Integration
//! - [`api`] - REST API (feature `api`)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod miner;
pub mod persistence;

// ============================================================================
// Certificates
// ============================================================================
pub mod certificate;
pub mod registry;
pub mod service;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

/// Install the `tracing` subscriber used by the binaries. `RUST_LOG`
/// overrides the default `info` level.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
