//! Block implementation for the ledger
//!
//! A block carries its own hash, the hash of its predecessor, and the list
//! of transactions it confirms (coinbase first).

use crate::core::transaction::Transaction;
use crate::crypto::{hex_meets_difficulty, sha256_hex};
use serde::{Deserialize, Serialize};

/// Hash of the hard-coded genesis block
pub const GENESIS_HASH: &str = "f12fca6fc285e3d1a783057e5c11223026d3580b6320e23d047358df6bf0f94d";

/// Timestamp of the hard-coded genesis block
pub const GENESIS_TIMESTAMP: i64 = 1_537_852_555;

/// A block in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block index/height
    pub index: u64,
    /// Hash over every other field
    pub hash: String,
    /// Hash of the previous block (`None` only for genesis)
    pub previous_hash: Option<String>,
    /// Creation time in unix seconds
    pub timestamp: i64,
    /// Confirmed transactions, coinbase first
    pub data: Vec<Transaction>,
    /// Required number of leading zero bits in `hash`
    pub difficulty: u32,
    /// Nonce used for proof of work
    pub nonce: u64,
}

/// Serialize a transaction list the way it is fed into the block hash
pub fn serialize_data(data: &[Transaction]) -> String {
    // Plain structs of strings and integers always serialize
    serde_json::to_string(data).unwrap_or_default()
}

/// Hash block fields whose transaction list is already serialized
pub fn hash_fields(
    index: u64,
    previous_hash: Option<&str>,
    timestamp: i64,
    data_json: &str,
    difficulty: u32,
    nonce: u64,
) -> String {
    let preimage = format!(
        "{}{}{}{}{}{}",
        index,
        previous_hash.unwrap_or(""),
        timestamp,
        data_json,
        difficulty,
        nonce
    );
    sha256_hex(preimage.as_bytes())
}

/// Calculate the hash of a block from its fields
pub fn calculate_hash(
    index: u64,
    previous_hash: Option<&str>,
    timestamp: i64,
    data: &[Transaction],
    difficulty: u32,
    nonce: u64,
) -> String {
    hash_fields(
        index,
        previous_hash,
        timestamp,
        &serialize_data(data),
        difficulty,
        nonce,
    )
}

impl Block {
    /// The genesis block shared by every node
    pub fn genesis() -> Self {
        Self {
            index: 0,
            hash: GENESIS_HASH.to_string(),
            previous_hash: None,
            timestamp: GENESIS_TIMESTAMP,
            data: Vec::new(),
            difficulty: 0,
            nonce: 0,
        }
    }

    /// Recompute the hash from the stored fields
    pub fn compute_hash(&self) -> String {
        calculate_hash(
            self.index,
            self.previous_hash.as_deref(),
            self.timestamp,
            &self.data,
            self.difficulty,
            self.nonce,
        )
    }

    /// Verify the stored block hash
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Check if the proof of work is valid
    pub fn is_valid_pow(&self) -> bool {
        hex_meets_difficulty(&self.hash, self.difficulty)
    }

    /// Work represented by this block: 2^difficulty, saturating
    pub fn work(&self) -> u128 {
        1u128.checked_shl(self.difficulty).unwrap_or(u128::MAX)
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.data.len()
    }
}
