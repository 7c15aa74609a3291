use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Connection settings for one remote file store.
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    /// Label used in logs and health output ("primary", "replica")
    pub name: String,

    pub host: String,

    pub port: u16,

    pub username: String,

    pub password: String,

    /// Remote directory uploads are written into (default: "/upload")
    pub base_path: String,

    /// SHA-256 host key fingerprint to pin. Any host key is accepted when unset.
    pub host_key_fingerprint: Option<String>,
}

impl RemoteTarget {
    fn defaults(name: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            host: "localhost".to_string(),
            port,
            username: "foo".to_string(),
            password: "pass".to_string(),
            base_path: "/upload".to_string(),
            host_key_fingerprint: None,
        }
    }

    /// Primary target, read from `PRIMARY_SFTP_*` (default: localhost:2222)
    pub fn primary_from_env() -> Self {
        Self::from_env_with_prefix("PRIMARY_SFTP", Self::defaults("primary", 2222))
    }

    /// Replica target, read from `REPLICA_SFTP_*` (default: localhost:2223)
    pub fn replica_from_env() -> Self {
        Self::from_env_with_prefix("REPLICA_SFTP", Self::defaults("replica", 2223))
    }

    fn from_env_with_prefix(prefix: &str, default: Self) -> Self {
        let var = |key: &str| env::var(format!("{}_{}", prefix, key)).ok();

        Self {
            host: var("HOST").unwrap_or(default.host),
            port: var("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),
            username: var("USERNAME").unwrap_or(default.username),
            password: var("PASSWORD").unwrap_or(default.password),
            base_path: var("BASE_PATH").unwrap_or(default.base_path),
            host_key_fingerprint: var("HOST_KEY").filter(|v| !v.is_empty()),
            name: default.name,
        }
    }

    /// Remote location for an uploaded file: `<base_path>/<filename>`
    pub fn remote_path(&self, filename: &str) -> String {
        format!("{}/{}", self.base_path.trim_end_matches('/'), filename)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Ledger node and contract settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the ledger node (default: "http://localhost:8545")
    pub rpc_url: String,

    /// Truffle-style build artifact with `abi` and `networks`
    pub artifact_path: PathBuf,

    /// Contract method taking `(string filename, string digest)` (default: "addFile")
    pub method: String,

    /// Signer account. Falls back to the node's first account when unset.
    pub from_address: Option<String>,

    /// Gas limit per record transaction (default: 300000)
    pub gas_limit: u64,

    /// Gas price in wei (default: 20 gwei)
    pub gas_price: u128,

    /// Per-request RPC timeout (default: 30s)
    pub rpc_timeout: Duration,

    /// How long to wait for a submitted transaction to be mined (default: 120s)
    pub confirmation_timeout: Duration,

    /// Delay between receipt polls (default: 1s)
    pub poll_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            artifact_path: PathBuf::from("build/contracts/FileRegistry.json"),
            method: "addFile".to_string(),
            from_address: None,
            gas_limit: 300_000,
            gas_price: 20_000_000_000,
            rpc_timeout: Duration::from_secs(30),
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            rpc_url: env::var("LEDGER_RPC_URL").unwrap_or(default.rpc_url),
            artifact_path: env::var("CONTRACT_ARTIFACT")
                .map(PathBuf::from)
                .unwrap_or(default.artifact_path),
            method: env::var("LEDGER_METHOD").unwrap_or(default.method),
            from_address: env::var("LEDGER_FROM_ADDRESS").ok().filter(|v| !v.is_empty()),
            gas_limit: env::var("LEDGER_GAS_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.gas_limit),
            gas_price: env::var("LEDGER_GAS_PRICE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.gas_price),
            rpc_timeout: env::var("LEDGER_RPC_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.rpc_timeout),
            confirmation_timeout: env::var("LEDGER_CONFIRMATION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.confirmation_timeout),
            poll_interval: env::var("LEDGER_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.poll_interval),
        }
    }
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port for the HTTP server (default: 3000)
    pub port: u16,

    /// Local directory for staged uploads (default: "uploads")
    pub staging_dir: PathBuf,

    /// Maximum upload size in bytes (default: 256 MB)
    pub max_file_size: usize,

    /// Upper bound on one connect/transfer/close cycle (default: 300s)
    pub transfer_timeout: Duration,

    /// Upper bound on the whole ledger stage, submission plus confirmation (default: 180s)
    pub ledger_timeout: Duration,

    /// Remove the primary copy when the pipeline fails before the ledger write (default: false)
    pub rollback_primary_on_failure: bool,

    pub primary: RemoteTarget,

    pub replica: RemoteTarget,

    pub ledger: LedgerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            staging_dir: PathBuf::from("uploads"),
            max_file_size: 256 * 1024 * 1024, // 256 MB
            transfer_timeout: Duration::from_secs(300),
            ledger_timeout: Duration::from_secs(180),
            rollback_primary_on_failure: false,
            primary: RemoteTarget::defaults("primary", 2222),
            replica: RemoteTarget::defaults("replica", 2223),
            ledger: LedgerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            transfer_timeout: env::var("TRANSFER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.transfer_timeout),

            ledger_timeout: env::var("LEDGER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.ledger_timeout),

            rollback_primary_on_failure: env::var("ROLLBACK_PRIMARY_ON_FAILURE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.rollback_primary_on_failure),

            primary: RemoteTarget::primary_from_env(),
            replica: RemoteTarget::replica_from_env(),
            ledger: LedgerConfig::from_env(),
        }
    }

    /// Create config for development and tests (small limits, short timeouts)
    pub fn development() -> Self {
        Self {
            max_file_size: 16 * 1024 * 1024,
            transfer_timeout: Duration::from_secs(10),
            ledger_timeout: Duration::from_secs(10),
            staging_dir: std::env::temp_dir().join("ledger-upload-staging"),
            ..Self::default()
        }
    }
}
