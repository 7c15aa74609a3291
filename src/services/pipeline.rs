//! Upload pipeline: stage, push to primary, hash, record on the ledger,
//! replicate, clean up.
//!
//! Stages run strictly in that order and the first failure aborts the run.
//! Completed stages are not undone, with one optional exception: the primary
//! copy can be removed if the run fails before anything reached the ledger.
//! The staged file is removed on every exit path.

use crate::services::ledger::{Ledger, LedgerError, TransactionReceipt};
use crate::services::remote_store::{RemoteStoreClient, RemoteStoreError};
use crate::services::staging::{StageManager, StagedFile, StagingError};
use crate::utils::hash::hash_file;
use crate::utils::keyed_mutex::KeyedMutex;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Staging,
    PrimaryTransfer,
    Hashing,
    LedgerRecord,
    ReplicaTransfer,
    Cleanup,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Staging => "staging",
            PipelineStage::PrimaryTransfer => "primary_transfer",
            PipelineStage::Hashing => "hashing",
            PipelineStage::LedgerRecord => "ledger_record",
            PipelineStage::ReplicaTransfer => "replica_transfer",
            PipelineStage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Remote(#[from] RemoteStoreError),

    #[error("staged file unreadable: {0}")]
    Hash(#[source] std::io::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("ledger stage timed out after {0:?}")]
    LedgerTimeout(Duration),
}

impl StageFailure {
    /// Whether a failed ledger stage certainly wrote nothing. A timeout may
    /// fire after the transaction reached the node, so it never qualifies.
    pub fn ledger_untouched(&self) -> bool {
        match self {
            StageFailure::Ledger(e) => e.leaves_no_record(),
            StageFailure::LedgerTimeout(_) => false,
            _ => true,
        }
    }
}

/// A failed run, tagged with the stage that failed and the stages that had
/// already completed (and were not undone).
#[derive(Debug, Error)]
#[error("upload failed at {stage}: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    pub completed: Vec<PipelineStage>,
    #[source]
    pub source: StageFailure,
}

impl PipelineError {
    fn at(stage: PipelineStage, completed: &[PipelineStage], source: impl Into<StageFailure>) -> Self {
        Self {
            stage,
            completed: completed.to_vec(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadOutcome {
    pub filename: String,
    pub remote_path: String,
    pub digest: String,
    pub size: u64,
    pub receipt: TransactionReceipt,
    pub stages: Vec<PipelineStage>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Upper bound on submitting the record and waiting for it to be mined
    pub ledger_timeout: Duration,
    /// Remove the primary copy if the run fails before anything reached the ledger
    pub rollback_primary_on_failure: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            ledger_timeout: Duration::from_secs(180),
            rollback_primary_on_failure: false,
        }
    }
}

pub struct UploadPipeline {
    stager: StageManager,
    primary: RemoteStoreClient,
    replica: RemoteStoreClient,
    ledger: Arc<dyn Ledger>,
    options: PipelineOptions,
    filename_locks: KeyedMutex,
}

impl UploadPipeline {
    pub fn new(
        stager: StageManager,
        primary: RemoteStoreClient,
        replica: RemoteStoreClient,
        ledger: Arc<dyn Ledger>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            stager,
            primary,
            replica,
            ledger,
            options,
            filename_locks: KeyedMutex::new(),
        }
    }

    pub fn primary(&self) -> &RemoteStoreClient {
        &self.primary
    }

    pub fn replica(&self) -> &RemoteStoreClient {
        &self.replica
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Stages and processes one upload.
    pub async fn run<'a>(
        &self,
        filename: &str,
        reader: impl AsyncRead + Unpin + Send + 'a,
    ) -> Result<UploadOutcome, PipelineError> {
        let staged = self.stage(filename, reader).await?;
        self.process(staged).await
    }

    /// Step 1: persist the upload locally.
    pub async fn stage<'a>(
        &self,
        filename: &str,
        reader: impl AsyncRead + Unpin + Send + 'a,
    ) -> Result<StagedFile, PipelineError> {
        self.stager.stage(filename, reader).await.map_err(|e| {
            tracing::error!("Staging {} failed: {}", filename, e);
            PipelineError::at(PipelineStage::Staging, &[], e)
        })
    }

    /// Steps 2-6 for an already staged file.
    pub async fn process(&self, staged: StagedFile) -> Result<UploadOutcome, PipelineError> {
        let filename = staged.original_filename().to_string();
        let mut completed = vec![PipelineStage::Staging];

        let result = {
            let _guard = self.filename_locks.lock(&filename).await;
            self.transfer_and_record(&staged, &mut completed).await
        };
        self.filename_locks.cleanup();

        let size = staged.size();
        match staged.cleanup() {
            Ok(()) => completed.push(PipelineStage::Cleanup),
            // Leftovers are swept on the next start
            Err(e) => tracing::warn!("{}", e),
        }

        match result {
            Ok((remote_path, digest, receipt)) => {
                tracing::info!(
                    "Upload of {} complete: digest {} recorded in {}",
                    filename,
                    digest,
                    receipt.transaction_hash
                );
                Ok(UploadOutcome {
                    filename,
                    remote_path,
                    digest,
                    size,
                    receipt,
                    stages: completed,
                    completed_at: Utc::now(),
                })
            }
            Err(e) => {
                tracing::error!(
                    "Upload of {} failed at {} after {:?}: {}",
                    filename,
                    e.stage,
                    e.completed,
                    e.source
                );
                Err(e)
            }
        }
    }

    async fn transfer_and_record(
        &self,
        staged: &StagedFile,
        completed: &mut Vec<PipelineStage>,
    ) -> Result<(String, String, TransactionReceipt), PipelineError> {
        let filename = staged.original_filename();

        // 2. Primary
        let remote_path = self
            .primary
            .push(staged.path(), filename)
            .await
            .map_err(|e| PipelineError::at(PipelineStage::PrimaryTransfer, completed.as_slice(), e))?;
        completed.push(PipelineStage::PrimaryTransfer);

        // 3. Digest of the same staged bytes
        let digest = match hash_file(staged.path()).await {
            Ok(digest) => digest,
            Err(e) => {
                let err = PipelineError::at(PipelineStage::Hashing, completed.as_slice(), StageFailure::Hash(e));
                self.rollback_primary(filename).await;
                return Err(err);
            }
        };
        completed.push(PipelineStage::Hashing);

        // 4. Ledger
        let recorded = match tokio::time::timeout(
            self.options.ledger_timeout,
            self.ledger.record_file(filename, &digest),
        )
        .await
        {
            Ok(result) => result.map_err(StageFailure::from),
            Err(_) => Err(StageFailure::LedgerTimeout(self.options.ledger_timeout)),
        };
        let receipt = match recorded {
            Ok(receipt) => receipt,
            Err(e) => {
                if e.ledger_untouched() {
                    self.rollback_primary(filename).await;
                } else if self.options.rollback_primary_on_failure {
                    tracing::warn!(
                        "Keeping primary copy of {}: ledger outcome unknown ({})",
                        filename,
                        e
                    );
                }
                return Err(PipelineError::at(PipelineStage::LedgerRecord, completed.as_slice(), e));
            }
        };
        completed.push(PipelineStage::LedgerRecord);

        // 5. Replica. The ledger write cannot be undone, so nothing is rolled back past here.
        self.replica
            .push(staged.path(), filename)
            .await
            .map_err(|e| PipelineError::at(PipelineStage::ReplicaTransfer, completed.as_slice(), e))?;
        completed.push(PipelineStage::ReplicaTransfer);

        Ok((remote_path, digest, receipt))
    }

    async fn rollback_primary(&self, filename: &str) {
        if !self.options.rollback_primary_on_failure {
            return;
        }
        match self.primary.retract(filename).await {
            Ok(()) => tracing::info!("Removed unrecorded primary copy of {}", filename),
            Err(e) => tracing::warn!("Could not remove primary copy of {}: {}", filename, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tags() {
        assert_eq!(PipelineStage::PrimaryTransfer.to_string(), "primary_transfer");
        assert_eq!(
            serde_json::to_value(PipelineStage::LedgerRecord).unwrap(),
            serde_json::json!("ledger_record")
        );
    }

    #[test]
    fn test_error_display_names_stage() {
        let err = PipelineError::at(
            PipelineStage::ReplicaTransfer,
            &[PipelineStage::Staging],
            RemoteStoreError::Connection {
                endpoint: "localhost:2223".to_string(),
                reason: "refused".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "upload failed at replica_transfer: could not connect to localhost:2223: refused"
        );
    }

    #[test]
    fn test_ledger_untouched_only_when_nothing_was_submitted() {
        let rejected = StageFailure::Ledger(LedgerError::Transaction("nonce too low".to_string()));
        let unreachable = StageFailure::Ledger(LedgerError::Rpc("connection refused".to_string()));
        let unmined = StageFailure::Ledger(LedgerError::ConfirmationTimeout {
            tx_hash: "0xabc".to_string(),
            timeout_secs: 120,
        });
        let unconfirmed = StageFailure::Ledger(LedgerError::Unconfirmed {
            tx_hash: "0xabc".to_string(),
            reason: "HTTP 502".to_string(),
        });

        assert!(rejected.ledger_untouched());
        assert!(unreachable.ledger_untouched());
        assert!(!unmined.ledger_untouched());
        assert!(!unconfirmed.ledger_untouched());
        assert!(!StageFailure::LedgerTimeout(Duration::from_secs(180)).ledger_untouched());
    }
}
