use super::abi::{encode_string_call, function_selector, parse_quantity, to_quantity};
use super::artifact::{ContractArtifact, is_valid_address};
use super::{Ledger, LedgerContext, LedgerError, LedgerRecord, TransactionReceipt};
use crate::config::LedgerConfig;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Ledger client over Ethereum JSON-RPC.
///
/// Signing is delegated to the node (`eth_sendTransaction`), so the signer
/// account must be unlocked there. Everything here is fixed at construction
/// and only read afterwards.
#[derive(Debug)]
pub struct JsonRpcLedger {
    client: reqwest::Client,
    context: LedgerContext,
    selector: [u8; 4],
    gas_limit: u64,
    gas_price: u128,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    /// Resolves accounts, network id and the contract deployment.
    ///
    /// Fails with [`LedgerError::Unavailable`] if the node has no usable signer,
    /// the contract has no deployment on the node's network, or the ABI lacks
    /// the record method.
    pub async fn connect(
        config: &LedgerConfig,
        artifact: &ContractArtifact,
    ) -> Result<Self, LedgerError> {
        url::Url::parse(&config.rpc_url)
            .map_err(|e| LedgerError::Unavailable(format!("invalid RPC url: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.rpc_timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        let mut ledger = Self {
            client,
            context: LedgerContext {
                rpc_url: config.rpc_url.clone(),
                network_id: String::new(),
                contract_address: String::new(),
                account: String::new(),
            },
            selector: [0; 4],
            gas_limit: config.gas_limit,
            gas_price: config.gas_price,
            confirmation_timeout: config.confirmation_timeout,
            poll_interval: config.poll_interval,
            next_id: AtomicU64::new(1),
        };

        let signature = artifact.record_method_signature(&config.method)?;
        ledger.selector = function_selector(&signature);

        let accounts: Vec<String> = serde_json::from_value(
            ledger
                .rpc_call("eth_accounts", json!([]))
                .await
                .map_err(unavailable)?,
        )
        .map_err(|e| LedgerError::Unavailable(format!("eth_accounts: {}", e)))?;

        ledger.context.account = match &config.from_address {
            Some(from) => {
                if !is_valid_address(from) {
                    return Err(LedgerError::Unavailable(format!(
                        "invalid signer address: {}",
                        from
                    )));
                }
                if !accounts.iter().any(|a| a.eq_ignore_ascii_case(from)) {
                    tracing::warn!(
                        "Signer {} is not managed by the node; transactions may be rejected",
                        from
                    );
                }
                from.clone()
            }
            None => accounts.first().cloned().ok_or_else(|| {
                LedgerError::Unavailable("node reports no accounts to sign with".to_string())
            })?,
        };

        let network = ledger
            .rpc_call("net_version", json!([]))
            .await
            .map_err(unavailable)?;
        ledger.context.network_id = match network {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(LedgerError::Unavailable(format!(
                    "unexpected net_version result: {}",
                    other
                )));
            }
        };

        ledger.context.contract_address = artifact
            .deployment(&ledger.context.network_id)?
            .address
            .clone();

        tracing::debug!(
            "Ledger bound to {} on network {} via {}",
            signature,
            ledger.context.network_id,
            ledger.context.rpc_url
        );

        Ok(ledger)
    }

    /// Send a JSON-RPC request and return the result field.
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let resp = self
            .client
            .post(&self.context.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Rpc(format!("{}: request timed out", method))
                } else {
                    LedgerError::Rpc(format!("{}: {}", method, e))
                }
            })?;

        if !resp.status().is_success() {
            return Err(LedgerError::Rpc(format!("{}: HTTP {}", method, resp.status())));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| LedgerError::Rpc(format!("{}: invalid JSON response: {}", method, e)))?;

        if let Some(error) = json.get("error") {
            let msg = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error");
            let msg = format!("{}: {}", method, msg);
            return Err(if method == "eth_sendTransaction" {
                LedgerError::Transaction(msg)
            } else {
                LedgerError::Rpc(msg)
            });
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| LedgerError::Rpc(format!("{}: response missing 'result'", method)))
    }

    async fn send_record_tx(&self, record: &LedgerRecord) -> Result<String, LedgerError> {
        let data = encode_string_call(self.selector, &[
            record.filename.as_str(),
            record.digest.as_str(),
        ]);

        let tx = json!({
            "from": record.from,
            "to": self.context.contract_address,
            "data": data,
            "gas": to_quantity(record.gas_limit as u128),
            "gasPrice": to_quantity(record.gas_price),
        });

        let result = self.rpc_call("eth_sendTransaction", json!([tx])).await?;

        result.as_str().map(|s| s.to_string()).ok_or_else(|| {
            LedgerError::Transaction("eth_sendTransaction returned non-string result".to_string())
        })
    }

    /// Polls for the receipt until the transaction is mined.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Option<u64>, LedgerError> {
        let deadline = tokio::time::Instant::now() + self.confirmation_timeout;

        loop {
            let receipt = self
                .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            if !receipt.is_null() {
                let status = receipt
                    .get("status")
                    .and_then(|s| s.as_str())
                    .unwrap_or("0x1");
                if parse_quantity(status) == Some(0) {
                    return Err(LedgerError::Transaction(format!(
                        "transaction {} reverted",
                        tx_hash
                    )));
                }
                return Ok(receipt
                    .get("blockNumber")
                    .and_then(|b| b.as_str())
                    .and_then(parse_quantity));
            }

            if tokio::time::Instant::now() + self.poll_interval > deadline {
                return Err(LedgerError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                    timeout_secs: self.confirmation_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn unavailable(e: LedgerError) -> LedgerError {
    match e {
        LedgerError::Rpc(msg) | LedgerError::Transaction(msg) => LedgerError::Unavailable(msg),
        other => other,
    }
}

#[async_trait]
impl Ledger for JsonRpcLedger {
    async fn record_file(
        &self,
        filename: &str,
        digest_hex: &str,
    ) -> Result<TransactionReceipt, LedgerError> {
        let record = LedgerRecord {
            filename: filename.to_string(),
            digest: digest_hex.to_string(),
            from: self.context.account.clone(),
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
        };

        let tx_hash = self.send_record_tx(&record).await?;
        tracing::info!("Submitted ledger record for {} in {}", filename, tx_hash);

        let block_number = self
            .wait_for_receipt(&tx_hash)
            .await
            .map_err(|e| match e {
                LedgerError::Rpc(reason) => LedgerError::Unconfirmed {
                    tx_hash: tx_hash.clone(),
                    reason,
                },
                other => other,
            })?;

        Ok(TransactionReceipt {
            transaction_hash: tx_hash,
            block_number,
            record,
        })
    }

    fn context(&self) -> &LedgerContext {
        &self.context
    }
}
