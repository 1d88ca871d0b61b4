#![forbid(unsafe_code)]
//! HTTP server for certificate issuance and verification

use certchain::api::{run_api_server, ApiNode};
use certchain::config::load_config;
use certchain::service::Service;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    certchain::init_tracing();

    let config = load_config()?;
    tracing::info!(
        difficulty = config.ledger.difficulty,
        chain = %config.ledger.chain_path,
        "Starting CertChain server"
    );

    let service = tokio::task::spawn_blocking({
        let config = config.clone();
        move || Service::open(&config)
    })
    .await??;

    let node = Arc::new(ApiNode::new(service));
    run_api_server(node, &config.server).await
}
