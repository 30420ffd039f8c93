//! Bytecode pinning for sale contract deployments.
//!
//! A registration is only trusted when its creation transaction deploys the
//! sale contract this server was built against. The compiled artifact's
//! bytecode has a library placeholder that is linked at deploy time and ends
//! with compiler metadata that varies between builds; the comparison uses the
//! linked bytecode without that metadata as a prefix of the transaction input.

use std::path::Path;

use crate::ledger::abi;

/// Trailing compiler metadata excluded from the comparison, in hex digits.
pub const METADATA_HEX_LEN: usize = 68;

/// Default link placeholder for the payment library.
pub const DEFAULT_LIBRARY_PLACEHOLDER: &str = "__LibPaperPaymentInterface______________";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalBytecode {
    prefix: Vec<u8>,
}

impl CanonicalBytecode {
    /// Build from unlinked bytecode hex.
    ///
    /// Every occurrence of `placeholder` (40 characters, the width of a hex
    /// address) is replaced with `library_address`.
    pub fn from_template(
        bytecode_hex: &str,
        placeholder: &str,
        library_address: &str,
    ) -> Result<Self, String> {
        let digits = bytecode_hex.strip_prefix("0x").unwrap_or(bytecode_hex);
        if digits.len() <= METADATA_HEX_LEN {
            return Err(format!(
                "Contract bytecode too short: {} hex digits",
                digits.len()
            ));
        }
        if placeholder.len() != 40 {
            return Err(format!(
                "Library placeholder must be 40 characters, got {}",
                placeholder.len()
            ));
        }
        if !abi::is_valid_address(library_address) {
            return Err(format!("Invalid library address: {}", library_address));
        }

        let trimmed = &digits[..digits.len() - METADATA_HEX_LEN];
        let linked = trimmed.replace(placeholder, &library_address[2..].to_lowercase());
        let prefix = hex::decode(&linked)
            .map_err(|e| format!("Contract bytecode is not valid hex after linking: {}", e))?;

        Ok(Self { prefix })
    }

    /// Load the `bytecode` field of a compiled contract artifact (JSON).
    pub fn from_artifact(
        path: impl AsRef<Path>,
        placeholder: &str,
        library_address: &str,
    ) -> Result<Self, String> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read contract artifact {}: {}", path.display(), e))?;
        let artifact: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| format!("Failed to parse contract artifact {}: {}", path.display(), e))?;
        let bytecode = artifact
            .get("bytecode")
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("Contract artifact {} has no bytecode", path.display()))?;

        Self::from_template(bytecode, placeholder, library_address)
    }

    /// Whether a creation transaction's input deploys this contract.
    pub fn matches(&self, input: &[u8]) -> bool {
        input.starts_with(&self.prefix)
    }

    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }
}
