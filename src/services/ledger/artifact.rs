use super::LedgerError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Contract build output: ABI plus per-network deployment addresses.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractArtifact {
    #[serde(rename = "contractName", default)]
    pub contract_name: Option<String>,
    pub abi: Vec<AbiEntry>,
    #[serde(default)]
    pub networks: HashMap<String, Deployment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiEntry {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    pub address: String,
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: Option<String>,
}

impl ContractArtifact {
    pub async fn load(path: &Path) -> Result<Self, LedgerError> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            LedgerError::Artifact(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_slice(&raw)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, LedgerError> {
        serde_json::from_slice(raw).map_err(|e| LedgerError::Artifact(e.to_string()))
    }

    pub fn name(&self) -> &str {
        self.contract_name.as_deref().unwrap_or("contract")
    }

    /// Deployment address for a network id, as reported by `net_version`.
    pub fn deployment(&self, network_id: &str) -> Result<&Deployment, LedgerError> {
        let deployment = self.networks.get(network_id).ok_or_else(|| {
            LedgerError::Unavailable(format!(
                "{} is not deployed on network {}; migrate the contract first",
                self.name(),
                network_id
            ))
        })?;

        if !is_valid_address(&deployment.address) {
            return Err(LedgerError::Unavailable(format!(
                "invalid contract address for network {}: {}",
                network_id, deployment.address
            )));
        }
        Ok(deployment)
    }

    /// Finds `method` in the ABI and checks it takes `(string, string)`.
    /// Returns the canonical signature.
    pub fn record_method_signature(&self, method: &str) -> Result<String, LedgerError> {
        let entry = self
            .abi
            .iter()
            .find(|e| {
                e.kind.as_deref().unwrap_or("function") == "function"
                    && e.name.as_deref() == Some(method)
            })
            .ok_or_else(|| {
                LedgerError::Unavailable(format!("{} has no method {}", self.name(), method))
            })?;

        let types: Vec<&str> = entry.inputs.iter().map(|p| p.kind.as_str()).collect();
        if types != ["string", "string"] {
            return Err(LedgerError::Unavailable(format!(
                "{} must take (string, string), found ({})",
                method,
                types.join(", ")
            )));
        }

        Ok(super::abi::function_signature(method, &types))
    }
}

/// 0x followed by 40 hex characters.
pub fn is_valid_address(addr: &str) -> bool {
    addr.len() == 42
        && addr.starts_with("0x")
        && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}
