//! Request-time access control for purchased files.
//!
//! Proof of purchase is read live from the ledger on every request, never
//! from the payment table, so a buyer can download as soon as their payment
//! is mined.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use thiserror::Error;

use crate::db::models::FileRecord;
use crate::db::DbPool;
use crate::envelope::hybrid::{self, wrap_key};
use crate::envelope::{Block, EnvelopeError};
use crate::ledger::{abi, LedgerError, SharedLedger};
use crate::objects::SharedObjectStore;
use crate::sales;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),

    #[error("Caller has not purchased this item")]
    AuthenticationFailed,

    #[error("File does not exist")]
    NotExist,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

impl From<String> for GateError {
    fn from(e: String) -> Self {
        GateError::Storage(e)
    }
}

/// Parse a caller's RSA public key from PEM (SubjectPublicKeyInfo or PKCS#1).
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, GateError> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|_| GateError::InvalidRequestBody("public_key is not a valid RSA PEM".to_string()))
}

pub struct PurchaseGate {
    db: DbPool,
    ledger: SharedLedger,
    objects: SharedObjectStore,
}

impl PurchaseGate {
    pub fn new(db: DbPool, ledger: SharedLedger, objects: SharedObjectStore) -> Self {
        Self { db, ledger, objects }
    }

    /// Download body for `caller`: `wrapped_key || IV || ciphertext`.
    ///
    /// The stored object is always sealed in a fresh envelope. For uploads the
    /// seller encrypted beforehand, the envelope holds the seller's ciphertext
    /// and the seller key is released separately by [`Self::release_key`].
    pub fn download(&self, contract: &str, caller: &str, public_key_pem: &str) -> Result<Vec<u8>, GateError> {
        let recipient = parse_public_key(public_key_pem)?;
        let file = self.authorize(contract, caller)?;

        let data = self.objects.get(&file.file_id)?.ok_or(GateError::NotExist)?;

        let block = Block::with_hash(data, file.file_hash);
        Ok(hybrid::seal(&block, &recipient)?.to_wire()?)
    }

    /// The seller's symmetric key wrapped for `caller`, or `None` when the
    /// file was uploaded unencrypted.
    pub fn release_key(
        &self,
        contract: &str,
        caller: &str,
        public_key_pem: &str,
    ) -> Result<Option<Vec<u8>>, GateError> {
        let recipient = parse_public_key(public_key_pem)?;
        let file = self.authorize(contract, caller)?;

        match file.aes_key {
            Some(aes_key) => Ok(Some(wrap_key(&aes_key, &recipient)?)),
            None => Ok(None),
        }
    }

    /// Prove the purchase on the ledger, then resolve the file behind the contract.
    fn authorize(&self, contract: &str, caller: &str) -> Result<FileRecord, GateError> {
        if !abi::is_valid_address(contract) {
            return Err(GateError::InvalidRequestBody(format!(
                "Invalid contract address: {}",
                contract
            )));
        }
        if !abi::is_valid_address(caller) {
            return Err(GateError::AuthenticationFailed);
        }

        if !self.ledger.purchased(contract, caller)? {
            tracing::info!("Denied {} access to {}: no purchase on ledger", caller, contract);
            return Err(GateError::AuthenticationFailed);
        }

        sales::store::sale_file(&self.db, contract)?.ok_or(GateError::NotExist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use crate::db::models::ListingStatus;
    use crate::envelope::{decrypt, keccak_hex, Envelope};
    use crate::ledger::mock::MockLedger;
    use crate::objects::{store as files, FsObjectStore, ObjectStore};
    use crate::sales::store::Registration;
    use rsa::pkcs8::{EncodePublicKey, LineEnding};
    use rsa::rand_core::OsRng;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;
    use std::sync::{Arc, OnceLock};

    const CONTRACT: &str = "0x5555555555555555555555555555555555555555";
    const BUYER: &str = "0x2222222222222222222222222222222222222222";
    const SELLER: &str = "0x1111111111111111111111111111111111111111";
    const CONTENT: &[u8] = b"%PDF-1.7 sheet music for a nocturne";

    fn buyer_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 1024).unwrap())
    }

    fn buyer_pem() -> String {
        buyer_key()
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    struct Fixture {
        ledger: Arc<MockLedger>,
        gate: PurchaseGate,
        _dir: tempfile::TempDir,
    }

    fn fixture(aes_key: Option<Vec<u8>>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = init_memory_db();
        let ledger = Arc::new(MockLedger::new());
        let objects = Arc::new(FsObjectStore::new(dir.path().to_str().unwrap()).unwrap());

        objects.put("file-1", CONTENT).unwrap();
        files::insert_file(
            &db,
            &FileRecord {
                file_id: "file-1".to_string(),
                owner_id: "seller".to_string(),
                file_hash: keccak_hex(CONTENT),
                encrypted: aes_key.is_some(),
                aes_key,
                size: CONTENT.len() as i64,
                created_at: "2026-03-01T00:00:00Z".to_string(),
            },
        )
        .unwrap();

        let tx_hash = format!("0x{}", "aa".repeat(32));
        let Registration::Created(sale) = sales::store::register_sale(
            &db,
            "seller",
            SELLER,
            "Nocturne",
            &tx_hash,
            Some("file-1"),
            "2026-03-01T00:00:00Z",
        )
        .unwrap() else {
            panic!("sale registration failed");
        };
        sales::store::confirm_sale(&db, sale.contract_id, CONTRACT, SELLER, ListingStatus::Posted).unwrap();

        let gate = PurchaseGate::new(db, ledger.clone(), objects);
        Fixture { ledger, gate, _dir: dir }
    }

    #[test]
    fn test_unpurchased_caller_gets_nothing() {
        let f = fixture(None);
        let err = f.gate.download(CONTRACT, BUYER, &buyer_pem()).unwrap_err();
        assert!(matches!(err, GateError::AuthenticationFailed));
    }

    #[test]
    fn test_purchased_download_decrypts_to_original() {
        let f = fixture(None);
        f.ledger.grant_purchase(CONTRACT, BUYER);

        let body = f.gate.download(CONTRACT, BUYER, &buyer_pem()).unwrap();
        let key = buyer_key();
        let envelope = Envelope::from_wire(&body, key.size(), keccak_hex(CONTENT)).unwrap();
        let block = decrypt(&envelope, key).unwrap();
        assert_eq!(block.data(), CONTENT);
    }

    #[test]
    fn test_seller_encrypted_file_is_sealed_and_key_released_separately() {
        let seller_key = vec![0x42; 32];
        let f = fixture(Some(seller_key.clone()));
        f.ledger.grant_purchase(CONTRACT, BUYER);

        let body = f.gate.download(CONTRACT, BUYER, &buyer_pem()).unwrap();
        let key = buyer_key();

        // The wrapped key in the body is a fresh per-download key, not the seller's.
        let (wrapped, _) = body.split_at(key.size());
        let download_key = hybrid::unwrap_key(wrapped, key).unwrap();
        assert_eq!(download_key.len(), hybrid::AES_KEY_LEN);
        assert_ne!(download_key, seller_key);

        let envelope = Envelope::from_wire(&body, key.size(), keccak_hex(CONTENT)).unwrap();
        assert_eq!(decrypt(&envelope, key).unwrap().data(), CONTENT);

        let released = f.gate.release_key(CONTRACT, BUYER, &buyer_pem()).unwrap().unwrap();
        assert_eq!(hybrid::unwrap_key(&released, key).unwrap(), seller_key);
    }

    #[test]
    fn test_downloads_use_fresh_keys() {
        let f = fixture(None);
        f.ledger.grant_purchase(CONTRACT, BUYER);

        let first = f.gate.download(CONTRACT, BUYER, &buyer_pem()).unwrap();
        let second = f.gate.download(CONTRACT, BUYER, &buyer_pem()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_plain_upload_has_no_releasable_key() {
        let f = fixture(None);
        f.ledger.grant_purchase(CONTRACT, BUYER);
        assert!(f.gate.release_key(CONTRACT, BUYER, &buyer_pem()).unwrap().is_none());
    }

    #[test]
    fn test_malformed_pem_is_rejected_before_ledger() {
        let f = fixture(None);
        f.ledger.time_out(CONTRACT);
        let err = f.gate.download(CONTRACT, BUYER, "-----BEGIN PUBLIC KEY-----\nnope\n").unwrap_err();
        assert!(matches!(err, GateError::InvalidRequestBody(_)));
    }

    #[test]
    fn test_unknown_contract_is_not_exist() {
        let f = fixture(None);
        let other = "0x7777777777777777777777777777777777777777";
        f.ledger.grant_purchase(other, BUYER);
        let err = f.gate.download(other, BUYER, &buyer_pem()).unwrap_err();
        assert!(matches!(err, GateError::NotExist));
    }

    #[test]
    fn test_ledger_timeout_surfaces() {
        let f = fixture(None);
        f.ledger.time_out(CONTRACT);
        let err = f.gate.download(CONTRACT, BUYER, &buyer_pem()).unwrap_err();
        assert!(matches!(err, GateError::Ledger(LedgerError::Timeout)));
    }
}
