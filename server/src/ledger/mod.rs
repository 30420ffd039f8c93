//! Read-only access to the public ledger.
//!
//! Everything the reconcilers and the purchase gate need from the chain goes
//! through the [`Ledger`] trait. Calls are blocking and are expected to run on
//! the blocking pool (`spawn_blocking`), each bounded by its own timeout.

pub mod abi;
pub mod bytecode;
pub mod mock;
pub mod rpc;

use std::sync::Arc;

use thiserror::Error;

/// Errors from a ledger query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger request timed out")]
    Timeout,

    #[error("Ledger transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error (e.g. a reverted call).
    #[error("Ledger RPC error: {0}")]
    Rpc(String),

    #[error("Malformed ledger response: {0}")]
    Malformed(String),
}

impl LedgerError {
    /// Whether the same query may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Timeout | LedgerError::Transport(_))
    }
}

/// An event emitted during a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract, EIP-55 checksummed.
    pub address: String,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

/// Confirmation record of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// 1 on success, 0 when the transaction reverted.
    pub status: u64,
    /// Address of the deployed contract for creation transactions.
    pub contract_address: Option<String>,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status != 0
    }
}

impl Default for Receipt {
    fn default() -> Self {
        Self {
            status: 1,
            contract_address: None,
            logs: Vec::new(),
        }
    }
}

/// Ledger queries consumed by this server.
pub trait Ledger: Send + Sync {
    /// Receipt of a mined transaction, `None` while it is not mined.
    fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, LedgerError>;

    /// Input data of a known transaction, `None` when the node has never seen it.
    fn transaction_input(&self, tx_hash: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    /// `seller()` view of a sale contract.
    fn seller(&self, contract: &str) -> Result<String, LedgerError>;

    /// Whether `buyer` has paid for the sale contract.
    fn purchased(&self, contract: &str, buyer: &str) -> Result<bool, LedgerError>;

    /// `soldOut()` view of a sale contract.
    fn sold_out(&self, contract: &str) -> Result<bool, LedgerError>;

    /// `forSale()` view of a sale contract.
    fn for_sale(&self, contract: &str) -> Result<bool, LedgerError>;
}

/// Ledger handle shared by workers and request handlers.
pub type SharedLedger = Arc<dyn Ledger>;
