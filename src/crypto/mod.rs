//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing and the leading-zero-bit difficulty check
//! - ECDSA key management (secp256k1)

pub mod hash;
pub mod keys;

pub use hash::{hex_meets_difficulty, meets_difficulty, sha256, sha256_hex};
pub use keys::{
    is_valid_address, public_key_from_address, verify_signature, KeyError, KeyPair,
    ADDRESS_LENGTH,
};
