//! Append-only file registry on an EVM-compatible ledger.
//!
//! Uploads are attested by calling the registry contract's
//! `addFile(string fileName, string fileHash)` from the node's signer account.
//! The contract offers no update or delete, so a confirmed record is final.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub mod abi;
pub mod artifact;
pub mod rpc;

pub use artifact::ContractArtifact;
pub use rpc::JsonRpcLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// No usable deployment or signer. Fatal at startup.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Contract build artifact missing or malformed.
    #[error("contract artifact error: {0}")]
    Artifact(String),

    /// The node rejected the transaction or it reverted.
    #[error("ledger transaction rejected: {0}")]
    Transaction(String),

    /// Transport-level failure talking to the node.
    #[error("ledger RPC failed: {0}")]
    Rpc(String),

    #[error("transaction {tx_hash} not mined within {timeout_secs}s")]
    ConfirmationTimeout { tx_hash: String, timeout_secs: u64 },

    /// Submitted, but its receipt could not be fetched.
    #[error("transaction {tx_hash} submitted but unconfirmed: {reason}")]
    Unconfirmed { tx_hash: String, reason: String },
}

impl LedgerError {
    /// True when the failure is known to have left no record on the ledger:
    /// the node never accepted the transaction, or it was mined and reverted.
    pub fn leaves_no_record(&self) -> bool {
        match self {
            LedgerError::Unavailable(_)
            | LedgerError::Artifact(_)
            | LedgerError::Transaction(_)
            | LedgerError::Rpc(_) => true,
            LedgerError::ConfirmationTimeout { .. } | LedgerError::Unconfirmed { .. } => false,
        }
    }
}

/// The record submitted for one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LedgerRecord {
    pub filename: String,
    pub digest: String,
    pub from: String,
    pub gas_limit: u64,
    #[schema(value_type = String)]
    #[serde(with = "u128_as_string")]
    pub gas_price: u128,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub record: LedgerRecord,
}

/// Read-only identity of the ledger connection, as established at startup.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LedgerContext {
    pub rpc_url: String,
    pub network_id: String,
    pub contract_address: String,
    pub account: String,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submits `(filename, digest_hex)` and waits for the transaction to be mined.
    async fn record_file(
        &self,
        filename: &str,
        digest_hex: &str,
    ) -> Result<TransactionReceipt, LedgerError>;

    fn context(&self) -> &LedgerContext;
}

mod u128_as_string {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }
}
