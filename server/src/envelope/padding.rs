//! Reversible block padding with garbage camouflage.
//!
//! Plaintext is first padded PKCS#7-style to the cipher block size (always at
//! least one byte, at most a full block), then placed inside a fixed garbage
//! budget:
//!
//! `g (1 byte) || random (g bytes) || padded plaintext || random (255 - g bytes)`
//!
//! The emitted length is `GARBAGE_BUDGET + padded_len` regardless of `g`, so the
//! position of the padding inside the ciphertext is not observable.

use rand::Rng;
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Total random filler surrounding the padded plaintext, header byte included.
/// Must stay a multiple of `BLOCK_SIZE` so padded buffers remain block aligned.
pub const GARBAGE_BUDGET: usize = 256;

/// Errors produced by the padding codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaddingError {
    /// `pad` called on a block that is already padded.
    #[error("Block is already padded")]
    AlreadyPadded,

    /// `unpad` called on a block that is not padded.
    #[error("Block is not padded")]
    NotPadded,

    /// Hash requested over padded bytes.
    #[error("Hash is only defined over unpadded data")]
    InvalidState,

    /// Buffer does not have the shape `pad` produces.
    #[error("Malformed padded buffer: {0}")]
    Malformed(&'static str),
}

/// Pad `plaintext` to a block-aligned, camouflaged buffer.
pub fn pad(plaintext: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - plaintext.len() % BLOCK_SIZE;
    let mut rng = rand::rng();

    let front: u8 = rng.random();
    let back = GARBAGE_BUDGET - 1 - front as usize;

    let mut out = Vec::with_capacity(GARBAGE_BUDGET + plaintext.len() + pad_len);
    out.push(front);
    out.extend(random_bytes(&mut rng, front as usize));
    out.extend_from_slice(plaintext);
    out.resize(out.len() + pad_len, pad_len as u8);
    out.extend(random_bytes(&mut rng, back));
    out
}

/// Recover the plaintext from a buffer produced by [`pad`].
pub fn unpad(buffer: &[u8]) -> Result<Vec<u8>, PaddingError> {
    let front = *buffer
        .first()
        .ok_or(PaddingError::Malformed("empty buffer"))? as usize;
    let back = GARBAGE_BUDGET - 1 - front;

    let start = 1 + front;
    let end = buffer
        .len()
        .checked_sub(back)
        .filter(|&end| end >= start + BLOCK_SIZE)
        .ok_or(PaddingError::Malformed("buffer shorter than garbage budget"))?;

    let padded = &buffer[start..end];
    if padded.len() % BLOCK_SIZE != 0 {
        return Err(PaddingError::Malformed("padded data is not block aligned"));
    }

    let pad_len = padded[padded.len() - 1] as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE {
        return Err(PaddingError::Malformed("invalid trailing padding length"));
    }

    Ok(padded[..padded.len() - pad_len].to_vec())
}

/// Keccak-256 (the Ethereum variant, not NIST SHA3-256) as lowercase hex.
pub fn keccak_hex(data: &[u8]) -> String {
    hex::encode(Keccak256::digest(data))
}

fn random_bytes(rng: &mut impl Rng, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// In-memory unit of plaintext or ciphertext.
///
/// The hash always describes the unpadded plaintext. A padded block keeps the
/// hash it had before padding; it cannot be recomputed until the block is
/// unpadded again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    data: Vec<u8>,
    padded: bool,
    hash: String,
    front_garbage_size: Option<u8>,
}

impl Block {
    /// Wrap unpadded bytes, computing their hash.
    pub fn new(data: Vec<u8>) -> Self {
        let hash = keccak_hex(&data);
        Self {
            data,
            padded: false,
            hash,
            front_garbage_size: None,
        }
    }

    /// Wrap unpadded bytes whose hash is already known (e.g. from storage).
    pub fn with_hash(data: Vec<u8>, hash: impl Into<String>) -> Self {
        Self {
            data,
            padded: false,
            hash: hash.into().to_lowercase(),
            front_garbage_size: None,
        }
    }

    /// Wrap ciphertext received off the wire. The garbage header is hidden
    /// inside the ciphertext, so its size is unknown until decryption.
    pub(crate) fn padded_with_hash(data: Vec<u8>, hash: impl Into<String>) -> Self {
        Self {
            padded: true,
            ..Self::with_hash(data, hash)
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn is_padded(&self) -> bool {
        self.padded
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn front_garbage_size(&self) -> Option<u8> {
        self.front_garbage_size
    }

    pub(crate) fn replace_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Pad in place. Fails if the block is already padded.
    pub fn pad(&mut self) -> Result<(), PaddingError> {
        if self.padded {
            return Err(PaddingError::AlreadyPadded);
        }
        self.data = pad(&self.data);
        self.front_garbage_size = self.data.first().copied();
        self.padded = true;
        Ok(())
    }

    /// Strip padding in place. Fails if the block is not padded.
    pub fn unpad(&mut self) -> Result<(), PaddingError> {
        if !self.padded {
            return Err(PaddingError::NotPadded);
        }
        self.data = unpad(&self.data)?;
        self.front_garbage_size = None;
        self.padded = false;
        Ok(())
    }

    /// Hash of the current bytes. Only valid on unpadded blocks.
    pub fn compute_hash(&self) -> Result<String, PaddingError> {
        if self.padded {
            return Err(PaddingError::InvalidState);
        }
        Ok(keccak_hex(&self.data))
    }

    /// Recompute and store the hash of the current bytes.
    pub fn refresh_hash(&mut self) -> Result<(), PaddingError> {
        self.hash = self.compute_hash()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_overhead_is_garbage_plus_one_to_sixteen() {
        for len in [0usize, 1, 15, 16, 17, 31, 32, 100, 4096] {
            let data = vec![0xAB; len];
            let padded = pad(&data);
            let overhead = padded.len() - len - GARBAGE_BUDGET;
            assert!((1..=BLOCK_SIZE).contains(&overhead), "len {len}: overhead {overhead}");
            assert_eq!(padded.len() % BLOCK_SIZE, 0);
        }
    }

    #[test]
    fn test_unpad_recovers_plaintext() {
        for len in [0usize, 1, 15, 16, 17, 255, 256, 257, 1000] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            assert_eq!(unpad(&pad(&data)).unwrap(), data);
        }
    }

    #[test]
    fn test_aligned_input_gets_full_padding_block() {
        let data = [7u8; 32];
        let padded = pad(&data);
        assert_eq!(padded.len(), GARBAGE_BUDGET + 48);

        let front = padded[0] as usize;
        let tail = &padded[1 + front + 32..1 + front + 48];
        assert!(tail.iter().all(|&b| b == 16));
    }

    #[test]
    fn test_unpad_rejects_short_buffer() {
        assert_eq!(unpad(&[]), Err(PaddingError::Malformed("empty buffer")));
        assert!(unpad(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_unpad_rejects_zero_padding_value() {
        let mut padded = pad(b"hello");
        let front = padded[0] as usize;
        // Last byte of the padded plaintext region.
        padded[1 + front + 15] = 0;
        assert!(matches!(unpad(&padded), Err(PaddingError::Malformed(_))));
    }

    #[test]
    fn test_block_pad_twice_fails() {
        let mut block = Block::new(b"score".to_vec());
        block.pad().unwrap();
        assert!(block.front_garbage_size().is_some());
        assert_eq!(block.pad(), Err(PaddingError::AlreadyPadded));
    }

    #[test]
    fn test_block_unpad_requires_padding() {
        let mut block = Block::new(b"score".to_vec());
        assert_eq!(block.unpad(), Err(PaddingError::NotPadded));
    }

    #[test]
    fn test_hash_undefined_on_padded_block() {
        let mut block = Block::new(b"sheet music".to_vec());
        let original = block.hash().to_string();
        block.pad().unwrap();
        assert_eq!(block.compute_hash(), Err(PaddingError::InvalidState));
        assert_eq!(block.hash(), original);

        block.unpad().unwrap();
        assert_eq!(block.compute_hash().unwrap(), original);
        assert_eq!(block.data(), b"sheet music");
    }

    #[test]
    fn test_clone_does_not_alias() {
        let block = Block::new(b"abc".to_vec());
        let mut copy = block.clone();
        copy.pad().unwrap();
        assert!(!block.is_padded());
        assert_eq!(block.data(), b"abc");
    }

    #[test]
    fn test_keccak_is_not_sha3() {
        // Keccak-256 of the empty string, as used by Ethereum.
        assert_eq!(
            keccak_hex(b""),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
