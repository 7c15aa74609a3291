use crate::config::LedgerConfig;
use crate::services::ledger::{ContractArtifact, JsonRpcLedger, Ledger};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Connects to the ledger node and binds the registry contract.
///
/// Any failure here must stop the process: uploads are never accepted
/// without a deployed contract on the node's current network.
pub async fn setup_ledger(config: &LedgerConfig) -> anyhow::Result<Arc<dyn Ledger>> {
    let artifact = ContractArtifact::load(&config.artifact_path)
        .await
        .with_context(|| format!("loading {}", config.artifact_path.display()))?;

    let ledger = JsonRpcLedger::connect(config, &artifact)
        .await
        .with_context(|| format!("connecting to ledger at {}", config.rpc_url))?;

    let context = ledger.context();
    info!(
        "🔗 Ledger: {} at {} on network {} (signer {})",
        artifact.name(),
        context.contract_address,
        context.network_id,
        context.account
    );

    Ok(Arc::new(ledger))
}
