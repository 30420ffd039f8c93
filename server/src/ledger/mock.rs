//! Scripted in-memory ledger for tests and local development.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::ledger::{Ledger, LedgerError, Receipt};

#[derive(Default)]
struct MockState {
    receipts: HashMap<String, Receipt>,
    inputs: HashMap<String, Vec<u8>>,
    sellers: HashMap<String, String>,
    purchases: HashSet<(String, String)>,
    sold_out: HashSet<String>,
    timeouts: HashSet<String>,
    receipt_queries: usize,
}

/// A ledger whose answers are set up by the caller.
///
/// Keys (tx hashes and addresses) are compared case-insensitively. Marking a
/// key with [`MockLedger::time_out`] makes every query that mentions it fail
/// with [`LedgerError::Timeout`].
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

fn key(value: &str) -> String {
    value.to_lowercase()
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mine `tx_hash` with the given receipt.
    pub fn set_receipt(&self, tx_hash: &str, receipt: Receipt) {
        self.state().receipts.insert(key(tx_hash), receipt);
    }

    /// Make `tx_hash` known to the node with the given input data.
    pub fn set_input(&self, tx_hash: &str, input: Vec<u8>) {
        self.state().inputs.insert(key(tx_hash), input);
    }

    pub fn set_seller(&self, contract: &str, seller: &str) {
        self.state().sellers.insert(key(contract), seller.to_string());
    }

    pub fn grant_purchase(&self, contract: &str, buyer: &str) {
        self.state().purchases.insert((key(contract), key(buyer)));
    }

    pub fn set_sold_out(&self, contract: &str) {
        self.state().sold_out.insert(key(contract));
    }

    pub fn time_out(&self, tx_hash_or_contract: &str) {
        self.state().timeouts.insert(key(tx_hash_or_contract));
    }

    pub fn clear_timeout(&self, tx_hash_or_contract: &str) {
        self.state().timeouts.remove(&key(tx_hash_or_contract));
    }

    /// Number of receipt lookups served so far.
    pub fn receipt_queries(&self) -> usize {
        self.state().receipt_queries
    }
}

impl MockState {
    fn check_timeout(&self, subject: &str) -> Result<(), LedgerError> {
        if self.timeouts.contains(&key(subject)) {
            Err(LedgerError::Timeout)
        } else {
            Ok(())
        }
    }
}

impl Ledger for MockLedger {
    fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, LedgerError> {
        let mut state = self.state();
        state.receipt_queries += 1;
        state.check_timeout(tx_hash)?;
        Ok(state.receipts.get(&key(tx_hash)).cloned())
    }

    fn transaction_input(&self, tx_hash: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        let state = self.state();
        state.check_timeout(tx_hash)?;
        Ok(state.inputs.get(&key(tx_hash)).cloned())
    }

    fn seller(&self, contract: &str) -> Result<String, LedgerError> {
        let state = self.state();
        state.check_timeout(contract)?;
        state
            .sellers
            .get(&key(contract))
            .cloned()
            .ok_or_else(|| LedgerError::Rpc("execution reverted".to_string()))
    }

    fn purchased(&self, contract: &str, buyer: &str) -> Result<bool, LedgerError> {
        let state = self.state();
        state.check_timeout(contract)?;
        Ok(state.purchases.contains(&(key(contract), key(buyer))))
    }

    fn sold_out(&self, contract: &str) -> Result<bool, LedgerError> {
        let state = self.state();
        state.check_timeout(contract)?;
        Ok(state.sold_out.contains(&key(contract)))
    }

    fn for_sale(&self, contract: &str) -> Result<bool, LedgerError> {
        let state = self.state();
        state.check_timeout(contract)?;
        Ok(state.sellers.contains_key(&key(contract)) && !state.sold_out.contains(&key(contract)))
    }
}
