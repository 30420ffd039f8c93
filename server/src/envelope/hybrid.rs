//! Single-recipient hybrid envelope: AES-256-CBC over a padded block, with the
//! per-envelope AES key wrapped by RSA-OAEP for the recipient.
//!
//! Wire format: `wrapped_key (RSA modulus size) || IV (16 bytes) || ciphertext`
//!
//! There is no length prefix for the wrapped key. The recipient knows its own
//! modulus size and splits the body accordingly.
//!
//! Integrity is a Keccak-256 check over the recovered plaintext against the
//! hash the sender advertised. There is no MAC: a tampered ciphertext that
//! still unpads cleanly is only caught by that comparison.

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::Rng;
use rsa::rand_core::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use thiserror::Error;

use crate::envelope::padding::{self, Block, PaddingError, BLOCK_SIZE};

/// AES key length in bytes (256-bit).
pub const AES_KEY_LEN: usize = 32;

/// CBC initialization vector length in bytes.
pub const IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Errors from building or opening an envelope.
///
/// `KeyUnwrapFailed` and `CipherFailed` carry no detail on purpose: wrong key
/// and corrupted data must look the same to whoever triggered them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Envelope is already encrypted")]
    AlreadyEncrypted,

    #[error("Envelope is not encrypted")]
    NotEncrypted,

    #[error("Failed to wrap symmetric key")]
    KeyWrapFailed,

    #[error("Failed to unwrap symmetric key")]
    KeyUnwrapFailed,

    #[error("Unwrapped key length mismatch: expected {expected}, got {actual}")]
    KeyLengthMismatch { expected: usize, actual: usize },

    #[error("Symmetric decryption failed")]
    CipherFailed,

    #[error("Decrypted content hash does not match")]
    IntegrityMismatch,

    #[error("Envelope body is shorter than its wrapped key")]
    Truncated,

    #[error(transparent)]
    Padding(#[from] PaddingError),
}

/// A block plus, once encrypted, the symmetric key wrapped for one recipient.
///
/// `wrapped_key` is `None` exactly when the envelope holds plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    block: Block,
    wrapped_key: Option<Vec<u8>>,
}

impl Envelope {
    pub fn plaintext(block: Block) -> Self {
        Self {
            block,
            wrapped_key: None,
        }
    }

    /// Split a download body into wrapped key and `IV || ciphertext`.
    ///
    /// `wrapped_key_len` is the recipient's RSA modulus size in bytes and `hash`
    /// the advertised plaintext hash.
    pub fn from_wire(
        body: &[u8],
        wrapped_key_len: usize,
        hash: impl Into<String>,
    ) -> Result<Self, EnvelopeError> {
        if body.len() < wrapped_key_len {
            return Err(EnvelopeError::Truncated);
        }
        let (wrapped_key, data) = body.split_at(wrapped_key_len);
        Ok(Self {
            block: Block::padded_with_hash(data.to_vec(), hash),
            wrapped_key: Some(wrapped_key.to_vec()),
        })
    }

    /// Serialize as `wrapped_key || IV || ciphertext`.
    pub fn to_wire(&self) -> Result<Vec<u8>, EnvelopeError> {
        let wrapped_key = self
            .wrapped_key
            .as_deref()
            .ok_or(EnvelopeError::NotEncrypted)?;
        let mut body = Vec::with_capacity(wrapped_key.len() + self.block.data().len());
        body.extend_from_slice(wrapped_key);
        body.extend_from_slice(self.block.data());
        Ok(body)
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn wrapped_key(&self) -> Option<&[u8]> {
        self.wrapped_key.as_deref()
    }

    pub fn is_encrypted(&self) -> bool {
        self.wrapped_key.is_some()
    }
}

fn generate_key() -> [u8; AES_KEY_LEN] {
    rand::rng().random()
}

fn generate_iv() -> [u8; IV_LEN] {
    rand::rng().random()
}

/// RSA-OAEP (SHA-1 label hash and MGF1) wrap of a symmetric key.
pub fn wrap_key(key: &[u8], recipient: &RsaPublicKey) -> Result<Vec<u8>, EnvelopeError> {
    recipient
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), key)
        .map_err(|_| EnvelopeError::KeyWrapFailed)
}

/// Inverse of [`wrap_key`].
pub fn unwrap_key(wrapped: &[u8], recipient: &RsaPrivateKey) -> Result<Vec<u8>, EnvelopeError> {
    recipient
        .decrypt(Oaep::new::<Sha1>(), wrapped)
        .map_err(|_| EnvelopeError::KeyUnwrapFailed)
}

/// Encrypt a plaintext envelope for `recipient`.
///
/// The input is left untouched; a fresh key and IV are drawn on every call.
pub fn encrypt(envelope: &Envelope, recipient: &RsaPublicKey) -> Result<Envelope, EnvelopeError> {
    if envelope.is_encrypted() {
        return Err(EnvelopeError::AlreadyEncrypted);
    }

    let mut block = envelope.block.clone();
    if !block.is_padded() {
        block.pad()?;
    }

    let key = generate_key();
    let iv = generate_iv();

    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<NoPadding>(block.data());

    let mut data = Vec::with_capacity(IV_LEN + ciphertext.len());
    data.extend_from_slice(&iv);
    data.extend_from_slice(&ciphertext);
    block.replace_data(data);

    let wrapped_key = wrap_key(&key, recipient)?;

    Ok(Envelope {
        block,
        wrapped_key: Some(wrapped_key),
    })
}

/// Encrypt a plain block for `recipient`.
pub fn seal(block: &Block, recipient: &RsaPublicKey) -> Result<Envelope, EnvelopeError> {
    encrypt(&Envelope::plaintext(block.clone()), recipient)
}

/// Open an envelope with the recipient's private key and verify the
/// recovered plaintext against the hash the envelope carries.
pub fn decrypt(envelope: &Envelope, recipient: &RsaPrivateKey) -> Result<Block, EnvelopeError> {
    let wrapped_key = envelope
        .wrapped_key
        .as_deref()
        .ok_or(EnvelopeError::NotEncrypted)?;

    let key = unwrap_key(wrapped_key, recipient)?;
    if key.len() != AES_KEY_LEN {
        return Err(EnvelopeError::KeyLengthMismatch {
            expected: AES_KEY_LEN,
            actual: key.len(),
        });
    }

    let data = envelope.block.data();
    if data.len() < IV_LEN + BLOCK_SIZE || (data.len() - IV_LEN) % BLOCK_SIZE != 0 {
        return Err(EnvelopeError::CipherFailed);
    }
    let (iv, ciphertext) = data.split_at(IV_LEN);

    let padded = Aes256CbcDec::new_from_slices(&key, iv)
        .map_err(|_| EnvelopeError::CipherFailed)?
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| EnvelopeError::CipherFailed)?;

    let plaintext = padding::unpad(&padded).map_err(|_| EnvelopeError::CipherFailed)?;

    let block = Block::new(plaintext);
    if !block.hash().eq_ignore_ascii_case(envelope.block.hash()) {
        return Err(EnvelopeError::IntegrityMismatch);
    }
    Ok(block)
}
