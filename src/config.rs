//! Configuration management for CertChain

use crate::error::{ChainError, Result};
use crate::miner::MAX_DIFFICULTY;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(default = "default_chain_path")]
    pub chain_path: String,
    #[serde(default = "default_strict_validation")]
    pub strict_validation: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            chain_path: default_chain_path(),
            strict_validation: default_strict_validation(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_difficulty() -> usize {
    3
}

fn default_chain_path() -> String {
    "chain.json".to_string()
}

fn default_strict_validation() -> bool {
    true
}

fn default_registry_path() -> String {
    "certificates.json".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> String {
    "public".to_string()
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(source).map_err(|e| ChainError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ledger.difficulty > MAX_DIFFICULTY {
            return Err(ChainError::Config(format!(
                "ledger.difficulty must be at most {}",
                MAX_DIFFICULTY
            )));
        }
        if self.ledger.chain_path.trim().is_empty() {
            return Err(ChainError::Config("ledger.chain_path must be set".into()));
        }
        if self.registry.path.trim().is_empty() {
            return Err(ChainError::Config("registry.path must be set".into()));
        }
        if self.ledger.chain_path == self.registry.path {
            return Err(ChainError::Config(
                "ledger.chain_path and registry.path must differ".into(),
            ));
        }
        Ok(())
    }

    /// Apply environment overrides (`PORT`).
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let source = fs::read_to_string(path)?;
        Config::from_toml(&source)?
    } else {
        Config::default()
    };
    config.apply_env();
    Ok(config)
}

pub fn load_config() -> Result<Config> {
    load_config_from(Path::new(DEFAULT_CONFIG_PATH))
}
