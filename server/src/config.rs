use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::ledger::bytecode::DEFAULT_LIBRARY_PLACEHOLDER;
use crate::reconcile::{ExpiryWindows, MAX_EXPIRY_SECS};

/// Marketplace content server
///
/// Only flags given on the command line are merged, so anything left unset
/// falls through to env vars, the TOML file and the built-in defaults.
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "marketplace-server", version, about = "Marketplace content server")]
pub struct Cli {
    /// Port to listen on [default: 7001]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./market.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys, objects) [default: ./data]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Effective server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,

    pub bind_address: String,

    #[serde(default)]
    pub json_logs: bool,

    #[serde(default)]
    pub generate_config: bool,

    pub data_dir: String,

    /// Ledger node configuration ([ledger] section in TOML)
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Reconciliation schedule ([reconcile] section in TOML)
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// File storage limits ([objects] section in TOML)
    #[serde(default)]
    pub objects: ObjectsConfig,
}

/// Configuration for the ledger JSON-RPC node and sale contract pinning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint (default: "http://127.0.0.1:8545")
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Timeout per ledger request in milliseconds (default: 1000)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Compiled sale contract artifact (JSON with a `bytecode` field).
    /// Without it sale registrations are never confirmed.
    #[serde(default)]
    pub contract_artifact: Option<String>,

    /// Deployed payment library linked into the sale contract
    #[serde(default)]
    pub library_address: Option<String>,

    /// Link placeholder for the library in the artifact bytecode
    #[serde(default = "default_library_placeholder")]
    pub library_placeholder: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            request_timeout_ms: default_request_timeout_ms(),
            contract_artifact: None,
            library_address: None,
            library_placeholder: default_library_placeholder(),
        }
    }
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_request_timeout_ms() -> u64 {
    1000
}

fn default_library_placeholder() -> String {
    DEFAULT_LIBRARY_PLACEHOLDER.to_string()
}

/// Configuration for the sale tracker and payment reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Seconds between reconciliation passes (default: 60)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Unconfirmed sale registrations are disabled after this many seconds (default: 3h)
    #[serde(default = "default_soft_expiry")]
    pub sale_soft_expiry_secs: u64,

    /// Unconfirmed sale registrations are deleted after this many seconds (default: 6h)
    #[serde(default = "default_hard_expiry")]
    pub sale_hard_expiry_secs: u64,

    /// Unconfirmed payments are disabled after this many seconds (default: 3h)
    #[serde(default = "default_soft_expiry")]
    pub payment_soft_expiry_secs: u64,

    /// Disabled payments are deleted after this many seconds (default: 6h)
    #[serde(default = "default_hard_expiry")]
    pub payment_hard_expiry_secs: u64,
}

impl ReconcileConfig {
    pub fn sale_windows(&self) -> ExpiryWindows {
        ExpiryWindows::from_secs(self.sale_soft_expiry_secs, self.sale_hard_expiry_secs)
    }

    pub fn payment_windows(&self) -> ExpiryWindows {
        ExpiryWindows::from_secs(self.payment_soft_expiry_secs, self.payment_hard_expiry_secs)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            sale_soft_expiry_secs: default_soft_expiry(),
            sale_hard_expiry_secs: default_hard_expiry(),
            payment_soft_expiry_secs: default_soft_expiry(),
            payment_hard_expiry_secs: default_hard_expiry(),
        }
    }
}

fn default_tick_interval() -> u64 {
    60
}

fn default_soft_expiry() -> u64 {
    3 * 3600
}

fn default_hard_expiry() -> u64 {
    6 * 3600
}

/// Configuration for uploaded file storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectsConfig {
    /// Maximum upload size in megabytes per file (default: 100)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

fn default_max_upload_size() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 7001,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            ledger: LedgerConfig::default(),
            reconcile: ReconcileConfig::default(),
            objects: ObjectsConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (MARKET_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_cli(&Cli::parse())
    }

    pub fn from_cli(cli: &Cli) -> Result<Self, figment::Error> {
        let config: Config = Self::figment(cli).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(cli: &Cli) -> Figment {
        // Section keys use a double underscore: MARKET_LEDGER__RPC_URL
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("MARKET_").split("__"))
            .merge(Serialized::defaults(cli))
    }

    /// Reject values the workers cannot run with.
    fn validate(&self) -> Result<(), figment::Error> {
        if self.reconcile.tick_interval_secs == 0 {
            return Err("reconcile.tick_interval_secs must be greater than zero".into());
        }
        if self.ledger.request_timeout_ms == 0 {
            return Err("ledger.request_timeout_ms must be greater than zero".into());
        }

        let windows = [
            ("sale_soft_expiry_secs", self.reconcile.sale_soft_expiry_secs),
            ("sale_hard_expiry_secs", self.reconcile.sale_hard_expiry_secs),
            ("payment_soft_expiry_secs", self.reconcile.payment_soft_expiry_secs),
            ("payment_hard_expiry_secs", self.reconcile.payment_hard_expiry_secs),
        ];
        for (key, secs) in windows {
            if secs > MAX_EXPIRY_SECS {
                return Err(format!(
                    "reconcile.{} must be at most {} seconds, got {}",
                    key, MAX_EXPIRY_SECS, secs
                )
                .into());
            }
        }
        Ok(())
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Marketplace Content Server Configuration
# Place this file at ./market.toml or specify with --config <path>
# All settings can be overridden via environment variables (MARKET_PORT,
# MARKET_LEDGER__RPC_URL, etc.) or CLI flags (--port, etc.)

# Server port (default: 7001)
# port = 7001

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database, JWT signing key and uploaded files
# data_dir = "./data"

# ---- Ledger ----
# [ledger]

# Ethereum JSON-RPC endpoint
# rpc_url = "http://127.0.0.1:8545"

# Timeout per ledger request in milliseconds
# request_timeout_ms = 1000

# Compiled sale contract artifact; registrations stay pending without it
# contract_artifact = "./contracts/PaperSale.json"

# Address of the deployed payment library linked into the sale contract
# library_address = "0x0000000000000000000000000000000000000000"

# Link placeholder in the artifact bytecode (40 characters)
# library_placeholder = "__LibPaperPaymentInterface______________"

# ---- Reconciliation ----
# [reconcile]

# Seconds between sale tracker / payment reconciler passes
# tick_interval_secs = 60

# Unmined sale registrations: disabled after 3h, deleted after 6h
# sale_soft_expiry_secs = 10800
# sale_hard_expiry_secs = 21600

# Unmined payments: disabled after 3h, deleted after 6h
# payment_soft_expiry_secs = 10800
# payment_hard_expiry_secs = 21600

# ---- File Storage ----
# [objects]

# Maximum upload size in megabytes per file (default: 100)
# max_upload_size_mb = 100
"#
    .to_string()
}
