use crate::config::AppConfig;
use crate::services::remote_store::{RemoteStoreClient, SftpStore};
use crate::services::staging::StageManager;
use std::sync::Arc;
use tracing::info;

/// Primary and replica SFTP clients, in that order.
pub fn setup_remote_stores(config: &AppConfig) -> (RemoteStoreClient, RemoteStoreClient) {
    let clients = [&config.primary, &config.replica].map(|target| {
        info!(
            "☁️  {} store: sftp://{}@{}{}",
            target.name,
            target.username,
            target.endpoint(),
            target.base_path
        );
        if target.host_key_fingerprint.is_none() {
            tracing::warn!(
                "⚠️  No host key pinned for {}; any server key will be accepted",
                target.name
            );
        }
        RemoteStoreClient::new(
            Arc::new(SftpStore::new(target.clone(), config.transfer_timeout)),
            config.transfer_timeout,
        )
    });
    let [primary, replica] = clients;
    (primary, replica)
}

pub async fn setup_staging(config: &AppConfig) -> anyhow::Result<StageManager> {
    let stager = StageManager::new(&config.staging_dir, config.max_file_size);
    tokio::fs::create_dir_all(stager.dir()).await?;

    let removed = stager.sweep_stale().await?;
    if removed > 0 {
        tracing::warn!(
            "🧹 Removed {} staged file(s) left over from a previous run",
            removed
        );
    }
    info!("📂 Staging uploads in {}", stager.dir().display());

    Ok(stager)
}
