//! Encrypted content envelopes.
//!
//! A seller's file is never sent in the clear. On each authorized download the
//! file is padded with garbage camouflage, encrypted under a fresh AES-256-CBC
//! key, and that key is wrapped with RSA-OAEP for the buyer's public key.

pub mod hybrid;
pub mod padding;

pub use hybrid::{decrypt, encrypt, seal, Envelope, EnvelopeError};
pub use padding::{keccak_hex, Block, PaddingError};
