#![allow(dead_code)]

use async_trait::async_trait;
use ledger_upload_backend::config::RemoteTarget;
use ledger_upload_backend::services::ledger::{
    Ledger, LedgerContext, LedgerError, LedgerRecord, TransactionReceipt,
};
use ledger_upload_backend::services::pipeline::{PipelineOptions, UploadPipeline};
use ledger_upload_backend::services::remote_store::{
    RemoteSession, RemoteStore, RemoteStoreClient, RemoteStoreError,
};
use ledger_upload_backend::services::staging::StageManager;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn target(name: &str, port: u16) -> RemoteTarget {
    RemoteTarget {
        name: name.to_string(),
        host: "localhost".to_string(),
        port,
        username: "foo".to_string(),
        password: "pass".to_string(),
        base_path: "/upload".to_string(),
        host_key_fingerprint: None,
    }
}

#[derive(Default)]
pub struct StoreBehavior {
    pub fail_connect: AtomicBool,
    pub fail_transfer: AtomicBool,
    pub hang_connect: AtomicBool,
    /// Deletes the local file after copying it, as a misbehaving stage would
    pub consume_local: AtomicBool,
}

/// Remote store that keeps files in memory.
pub struct MemoryStore {
    target: RemoteTarget,
    pub files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub local_paths: Arc<Mutex<Vec<PathBuf>>>,
    pub connects: AtomicUsize,
    pub behavior: StoreBehavior,
}

impl MemoryStore {
    pub fn new(name: &str, port: u16) -> Arc<Self> {
        Arc::new(Self {
            target: target(name, port),
            files: Arc::new(Mutex::new(HashMap::new())),
            local_paths: Arc::new(Mutex::new(Vec::new())),
            connects: AtomicUsize::new(0),
            behavior: StoreBehavior::default(),
        })
    }

    pub fn get(&self, remote_path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(remote_path).cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn target(&self) -> &RemoteTarget {
        &self.target
    }

    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteStoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.behavior.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.behavior.fail_connect.load(Ordering::SeqCst) {
            return Err(RemoteStoreError::Connection {
                endpoint: self.target.endpoint(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(MemorySession {
            files: self.files.clone(),
            local_paths: self.local_paths.clone(),
            fail_transfer: self.behavior.fail_transfer.load(Ordering::SeqCst),
            consume_local: self.behavior.consume_local.load(Ordering::SeqCst),
        }))
    }
}

struct MemorySession {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    local_paths: Arc<Mutex<Vec<PathBuf>>>,
    fail_transfer: bool,
    consume_local: bool,
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn transfer(&mut self, local: &Path, remote_path: &str) -> Result<u64, RemoteStoreError> {
        self.local_paths.lock().unwrap().push(local.to_path_buf());
        if self.fail_transfer {
            return Err(RemoteStoreError::Transfer {
                remote_path: remote_path.to_string(),
                reason: "no space left on device".to_string(),
            });
        }

        let data = tokio::fs::read(local)
            .await
            .map_err(|e| RemoteStoreError::Transfer {
                remote_path: remote_path.to_string(),
                reason: e.to_string(),
            })?;
        // Let concurrent uploads interleave here
        tokio::task::yield_now().await;

        let len = data.len() as u64;
        self.files
            .lock()
            .unwrap()
            .insert(remote_path.to_string(), data);

        if self.consume_local {
            let _ = tokio::fs::remove_file(local).await;
        }
        Ok(len)
    }

    async fn remove(&mut self, remote_path: &str) -> Result<(), RemoteStoreError> {
        self.files.lock().unwrap().remove(remote_path);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), RemoteStoreError> {
        Ok(())
    }
}

/// Ledger that keeps records in memory.
pub struct FakeLedger {
    pub records: Mutex<Vec<LedgerRecord>>,
    pub reject: AtomicBool,
    /// Records the transaction but never sees it confirmed
    pub unconfirmed: AtomicBool,
    /// Never answers
    pub hang: AtomicBool,
    context: LedgerContext,
}

impl FakeLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            reject: AtomicBool::new(false),
            unconfirmed: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            context: LedgerContext {
                rpc_url: "http://localhost:8545".to_string(),
                network_id: "5777".to_string(),
                contract_address: "0xCfEB869F69431e42cdB54A4F4f105C19C080A601".to_string(),
                account: "0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1".to_string(),
            },
        })
    }

    pub fn records(&self) -> Vec<LedgerRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn record_file(
        &self,
        filename: &str,
        digest_hex: &str,
    ) -> Result<TransactionReceipt, LedgerError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(LedgerError::Transaction(
                "insufficient funds for gas * price + value".to_string(),
            ));
        }

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let record = LedgerRecord {
            filename: filename.to_string(),
            digest: digest_hex.to_string(),
            from: self.context.account.clone(),
            gas_limit: 300_000,
            gas_price: 20_000_000_000,
        };
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        let tx_hash = format!("0x{:064x}", records.len());

        if self.unconfirmed.load(Ordering::SeqCst) {
            return Err(LedgerError::ConfirmationTimeout {
                tx_hash,
                timeout_secs: 120,
            });
        }

        Ok(TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(records.len() as u64),
            record,
        })
    }

    fn context(&self) -> &LedgerContext {
        &self.context
    }
}

pub struct Harness {
    pub pipeline: Arc<UploadPipeline>,
    pub primary: Arc<MemoryStore>,
    pub replica: Arc<MemoryStore>,
    pub ledger: Arc<FakeLedger>,
    pub staging: tempfile::TempDir,
}

impl Harness {
    pub fn new(options: PipelineOptions) -> Self {
        Self::with_timeout(options, Duration::from_secs(5))
    }

    pub fn with_timeout(options: PipelineOptions, transfer_timeout: Duration) -> Self {
        let staging = tempfile::tempdir().unwrap();
        let primary = MemoryStore::new("primary", 2222);
        let replica = MemoryStore::new("replica", 2223);
        let ledger = FakeLedger::new();

        let pipeline = UploadPipeline::new(
            StageManager::new(staging.path(), 1024 * 1024),
            RemoteStoreClient::new(primary.clone(), transfer_timeout),
            RemoteStoreClient::new(replica.clone(), transfer_timeout),
            ledger.clone(),
            options,
        );

        Self {
            pipeline: Arc::new(pipeline),
            primary,
            replica,
            ledger,
            staging,
        }
    }

    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging.path()).unwrap().count()
    }
}
