use crate::config::RemoteTarget;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod sftp;

pub use sftp::SftpStore;

#[derive(Debug, Error)]
pub enum RemoteStoreError {
    #[error("could not connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("transfer to {remote_path} failed: {reason}")]
    Transfer { remote_path: String, reason: String },

    #[error("{operation} on {endpoint} timed out after {timeout:?}")]
    Timeout {
        endpoint: String,
        operation: &'static str,
        timeout: Duration,
    },
}

/// A remote file store that hands out short-lived sessions.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn target(&self) -> &RemoteTarget;

    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteStoreError>;
}

/// One open session against a remote store.
#[async_trait]
pub trait RemoteSession: Send {
    /// Copies the local file to `remote_path`, replacing any existing file.
    /// Returns the number of bytes written.
    async fn transfer(&mut self, local: &Path, remote_path: &str) -> Result<u64, RemoteStoreError>;

    async fn remove(&mut self, remote_path: &str) -> Result<(), RemoteStoreError>;

    async fn close(self: Box<Self>) -> Result<(), RemoteStoreError>;
}

/// Runs connect, one operation, disconnect against a store, bounded by a timeout.
#[derive(Clone)]
pub struct RemoteStoreClient {
    store: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl RemoteStoreClient {
    pub fn new(store: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn target(&self) -> &RemoteTarget {
        self.store.target()
    }

    /// Pushes a local file to `<base_path>/<filename>` and returns the remote path.
    pub async fn push(&self, local: &Path, filename: &str) -> Result<String, RemoteStoreError> {
        let remote_path = self.target().remote_path(filename);

        let bytes = self
            .bounded("transfer", async {
                let mut session = self.store.connect().await?;
                let transferred = session.transfer(local, &remote_path).await;
                // The session is closed whether or not the transfer succeeded
                let closed = session.close().await;
                let bytes = transferred?;
                if let Err(e) = closed {
                    tracing::warn!(
                        "Closing {} session after transfer failed: {}",
                        self.target().name,
                        e
                    );
                }
                Ok(bytes)
            })
            .await?;

        tracing::info!(
            "Pushed {} bytes to {} ({}:{})",
            bytes,
            self.target().name,
            self.target().endpoint(),
            remote_path
        );
        Ok(remote_path)
    }

    /// Removes `<base_path>/<filename>` from the store.
    pub async fn retract(&self, filename: &str) -> Result<(), RemoteStoreError> {
        let remote_path = self.target().remote_path(filename);

        self.bounded("remove", async {
            let mut session = self.store.connect().await?;
            let removed = session.remove(&remote_path).await;
            if let Err(e) = session.close().await {
                tracing::warn!(
                    "Closing {} session after remove failed: {}",
                    self.target().name,
                    e
                );
            }
            removed
        })
        .await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl std::future::Future<Output = Result<T, RemoteStoreError>>,
    ) -> Result<T, RemoteStoreError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| RemoteStoreError::Timeout {
                endpoint: self.target().endpoint(),
                operation,
                timeout: self.timeout,
            })?
    }
}
