//! Mining engine for the ledger
//!
//! Proof-of-work search, candidate block assembly, and the difficulty
//! retarget schedule.

use crate::core::block::{hash_fields, serialize_data};
use crate::core::{Block, Transaction};
use crate::crypto::hex_meets_difficulty;
use log::{debug, info};
use std::time::Instant;

/// Expected seconds between blocks
pub const BLOCK_GENERATION_INTERVAL: i64 = 10;

/// Number of blocks between difficulty adjustments
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Mining statistics
#[derive(Debug, Clone)]
pub struct MiningStats {
    /// Number of hash attempts
    pub hash_attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

impl MiningStats {
    fn new(attempts: u64, start: Instant) -> Self {
        let elapsed = start.elapsed().as_millis();
        let hash_rate = if elapsed > 0 {
            (attempts as f64) / (elapsed as f64 / 1000.0)
        } else {
            attempts as f64
        };
        Self {
            hash_attempts: attempts,
            time_ms: elapsed,
            hash_rate,
        }
    }
}

/// Everything about a block except its nonce and hash
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: i64,
    pub data: Vec<Transaction>,
    pub difficulty: u32,
}

impl BlockTemplate {
    fn seal(self, hash: String, nonce: u64) -> Block {
        Block {
            index: self.index,
            hash,
            previous_hash: Some(self.previous_hash),
            timestamp: self.timestamp,
            data: self.data,
            difficulty: self.difficulty,
            nonce,
        }
    }

    fn hash_at(&self, data_json: &str, nonce: u64) -> String {
        hash_fields(
            self.index,
            Some(&self.previous_hash),
            self.timestamp,
            data_json,
            self.difficulty,
            nonce,
        )
    }

    /// Search nonces from 0 upward until the hash meets the difficulty.
    ///
    /// Unbounded: only returns once a qualifying nonce is found.
    pub fn mine(self) -> (Block, MiningStats) {
        let start = Instant::now();
        let data_json = serialize_data(&self.data);
        let mut nonce: u64 = 0;

        loop {
            let hash = self.hash_at(&data_json, nonce);
            if hex_meets_difficulty(&hash, self.difficulty) {
                let stats = MiningStats::new(nonce + 1, start);
                return (self.seal(hash, nonce), stats);
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Same search as [`BlockTemplate::mine`], but `should_abort` is polled
    /// before every hash attempt. Returns `None` once it reports `true`.
    pub fn mine_until<F>(self, mut should_abort: F) -> Option<(Block, MiningStats)>
    where
        F: FnMut() -> bool,
    {
        let start = Instant::now();
        let data_json = serialize_data(&self.data);
        let mut nonce: u64 = 0;

        loop {
            if should_abort() {
                debug!(
                    "Mining of block {} abandoned after {} attempts",
                    self.index, nonce
                );
                return None;
            }

            let hash = self.hash_at(&data_json, nonce);
            if hex_meets_difficulty(&hash, self.difficulty) {
                let stats = MiningStats::new(nonce + 1, start);
                return Some((self.seal(hash, nonce), stats));
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}

/// Mine a block from its fields
pub fn mine(
    index: u64,
    previous_hash: &str,
    timestamp: i64,
    data: Vec<Transaction>,
    difficulty: u32,
) -> Block {
    let template = BlockTemplate {
        index,
        previous_hash: previous_hash.to_string(),
        timestamp,
        data,
        difficulty,
    };
    template.mine().0
}

/// Coinbase for `miner_address` followed by the pending transactions, unmodified
pub fn build_candidate(
    mempool_snapshot: Vec<Transaction>,
    miner_address: &str,
    next_index: u64,
) -> Vec<Transaction> {
    let mut data = Vec::with_capacity(mempool_snapshot.len() + 1);
    data.push(Transaction::coinbase(miner_address, next_index));
    data.extend(mempool_snapshot);
    data
}

/// Difficulty required for the block after the newest block of `chain`
pub fn next_difficulty(chain: &[Block]) -> u32 {
    let Some(newest) = chain.last() else {
        return 0;
    };

    let interval = DIFFICULTY_ADJUSTMENT_INTERVAL as usize;
    let at_boundary = newest.index != 0 && newest.index % DIFFICULTY_ADJUSTMENT_INTERVAL == 0;

    if at_boundary && chain.len() > interval {
        let earlier = &chain[chain.len() - 1 - interval];
        adjusted_difficulty(newest, earlier)
    } else {
        newest.difficulty
    }
}

fn adjusted_difficulty(newest: &Block, earlier: &Block) -> u32 {
    let time_taken = newest.timestamp - earlier.timestamp;
    let expected_time = BLOCK_GENERATION_INTERVAL * DIFFICULTY_ADJUSTMENT_INTERVAL as i64;

    let difficulty = if time_taken < expected_time / 2 {
        earlier.difficulty.saturating_add(1)
    } else if time_taken > expected_time * 2 {
        earlier.difficulty.saturating_sub(1)
    } else {
        earlier.difficulty
    };

    if difficulty != earlier.difficulty {
        info!(
            "Difficulty adjusted from {} to {} (time taken: {}s, expected: {}s)",
            earlier.difficulty, difficulty, time_taken, expected_time
        );
    }

    difficulty
}

/// Miner for creating new blocks
pub struct Miner {
    /// Miner's address for receiving rewards
    pub address: String,
}

impl Miner {
    /// Create a new miner
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
        }
    }

    /// Template for the block extending `chain`, paying this miner
    pub fn template(&self, chain: &[Block], mempool_snapshot: Vec<Transaction>) -> BlockTemplate {
        let (index, previous_hash) = match chain.last() {
            Some(tip) => (tip.index + 1, tip.hash.clone()),
            None => (0, String::new()),
        };

        BlockTemplate {
            index,
            previous_hash,
            timestamp: chrono::Utc::now().timestamp(),
            data: build_candidate(mempool_snapshot, &self.address, index),
            difficulty: next_difficulty(chain),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GENESIS_HASH;
    use crate::crypto::{meets_difficulty, KeyPair};

    fn block_at(index: u64, timestamp: i64, difficulty: u32) -> Block {
        Block {
            index,
            hash: String::new(),
            previous_hash: None,
            timestamp,
            data: Vec::new(),
            difficulty,
            nonce: 0,
        }
    }

    fn chain_with_spacing(len: u64, seconds: i64, difficulty: u32) -> Vec<Block> {
        (0..len)
            .map(|i| block_at(i, 1_000 + i as i64 * seconds, difficulty))
            .collect()
    }

    #[test]
    fn test_mine_at_zero_difficulty_takes_first_nonce() {
        let kp = KeyPair::generate();
        let data = vec![Transaction::coinbase(&kp.address(), 1)];
        let block = mine(1, GENESIS_HASH, 1_700_000_000, data, 0);

        assert_eq!(block.nonce, 0);
        assert!(block.verify_hash());
    }

    #[test]
    fn test_mined_hash_has_leading_zero_bits() {
        let kp = KeyPair::generate();
        let data = vec![Transaction::coinbase(&kp.address(), 1)];
        let block = mine(1, GENESIS_HASH, 1_700_000_000, data, 8);

        let bytes = hex::decode(&block.hash).unwrap();
        assert!(meets_difficulty(&bytes, 8));
        assert_eq!(bytes[0], 0);
        assert!(block.verify_hash());
        assert!(block.is_valid_pow());
    }

    #[test]
    fn test_mine_until_aborts_immediately() {
        let template = BlockTemplate {
            index: 1,
            previous_hash: GENESIS_HASH.to_string(),
            timestamp: 1_700_000_000,
            data: Vec::new(),
            difficulty: 200,
        };
        assert!(template.mine_until(|| true).is_none());
    }

    #[test]
    fn test_mine_until_polls_between_attempts() {
        let template = BlockTemplate {
            index: 1,
            previous_hash: GENESIS_HASH.to_string(),
            timestamp: 1_700_000_000,
            data: Vec::new(),
            difficulty: 200,
        };
        let mut polls = 0;
        let result = template.mine_until(|| {
            polls += 1;
            polls > 50
        });
        assert!(result.is_none());
        assert_eq!(polls, 51);
    }

    #[test]
    fn test_build_candidate() {
        let miner = KeyPair::generate().address();
        let other = KeyPair::generate().address();
        let pending = vec![Transaction::coinbase(&other, 9)];

        let data = build_candidate(pending.clone(), &miner, 4);
        assert_eq!(data.len(), 2);
        assert_eq!(data[0], Transaction::coinbase(&miner, 4));
        assert_eq!(data[1], pending[0]);
    }

    #[test]
    fn test_template_extends_tip() {
        let miner = Miner::new(&KeyPair::generate().address());
        let chain = vec![Block::genesis()];

        let template = miner.template(&chain, Vec::new());
        assert_eq!(template.index, 1);
        assert_eq!(template.previous_hash, GENESIS_HASH);
        assert_eq!(template.difficulty, 0);
        assert_eq!(template.data.len(), 1);
    }

    #[test]
    fn test_difficulty_inherited_between_boundaries() {
        let chain = chain_with_spacing(6, 1, 5);
        assert_eq!(next_difficulty(&chain), 5);
        assert_eq!(next_difficulty(&[Block::genesis()]), 0);
    }

    #[test]
    fn test_difficulty_increases_when_blocks_are_fast() {
        // 11 blocks, index 10 at the boundary, 1s apart
        let chain = chain_with_spacing(11, 1, 3);
        assert_eq!(next_difficulty(&chain), 4);
    }

    #[test]
    fn test_difficulty_decreases_when_blocks_are_slow() {
        let chain = chain_with_spacing(11, 30, 3);
        assert_eq!(next_difficulty(&chain), 2);
    }

    #[test]
    fn test_difficulty_kept_when_on_schedule() {
        let chain = chain_with_spacing(11, BLOCK_GENERATION_INTERVAL, 3);
        assert_eq!(next_difficulty(&chain), 3);
    }

    #[test]
    fn test_difficulty_uses_earlier_block_as_base() {
        let mut chain = chain_with_spacing(11, 1, 3);
        chain[10].difficulty = 7;
        assert_eq!(next_difficulty(&chain), 4);
    }

    #[test]
    fn test_difficulty_never_underflows() {
        let chain = chain_with_spacing(11, 100, 0);
        assert_eq!(next_difficulty(&chain), 0);
    }
}
