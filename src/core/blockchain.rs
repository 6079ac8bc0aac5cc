//! Blockchain implementation
//!
//! The ledger aggregate: the chain of blocks together with the UTXO set it
//! produces and the pool of transactions waiting on it. Every mutation goes
//! through this type so the tip, the UTXO set and the mempool never disagree.

use crate::core::block::Block;
use crate::core::transaction::{process_block_transactions, Transaction, TransactionError};
use crate::core::utxo::{UnspentTxOut, UtxoSet};
use crate::mining::{next_difficulty, Mempool, MempoolError};
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

/// Allowed clock disagreement between a block and its predecessor, or a
/// block and the local clock, in seconds
pub const MAX_TIMESTAMP_DRIFT: i64 = 60;

/// Blockchain-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockchainError {
    #[error("Invalid block linkage: {0}")]
    LinkageInvalid(String),
    #[error("Invalid transactions: {0}")]
    InvalidTransactions(#[from] TransactionError),
    #[error("Chain rejected: {0}")]
    ChainRejected(String),
    #[error(transparent)]
    Mempool(#[from] MempoolError),
}

/// Check `candidate` against its `predecessor` using the local clock
pub fn validate_block_linkage(candidate: &Block, predecessor: &Block) -> Result<(), BlockchainError> {
    validate_block_linkage_at(candidate, predecessor, chrono::Utc::now().timestamp())
}

/// Check `candidate` against its `predecessor` as seen at time `now`
pub fn validate_block_linkage_at(
    candidate: &Block,
    predecessor: &Block,
    now: i64,
) -> Result<(), BlockchainError> {
    if candidate.index != predecessor.index + 1 {
        return Err(BlockchainError::LinkageInvalid(format!(
            "Invalid index: expected {}, got {}",
            predecessor.index + 1,
            candidate.index
        )));
    }

    if candidate.previous_hash.as_deref() != Some(predecessor.hash.as_str()) {
        return Err(BlockchainError::LinkageInvalid(format!(
            "Block {} does not point at {}",
            candidate.index, predecessor.hash
        )));
    }

    if !candidate.verify_hash() {
        return Err(BlockchainError::LinkageInvalid(format!(
            "Invalid hash for block {}",
            candidate.index
        )));
    }

    if !candidate.is_valid_pow() {
        return Err(BlockchainError::LinkageInvalid(format!(
            "Block {} does not meet difficulty {}",
            candidate.index, candidate.difficulty
        )));
    }

    if predecessor.timestamp - MAX_TIMESTAMP_DRIFT >= candidate.timestamp {
        return Err(BlockchainError::LinkageInvalid(format!(
            "Block {} is dated too far before its predecessor",
            candidate.index
        )));
    }

    if candidate.timestamp - MAX_TIMESTAMP_DRIFT >= now {
        return Err(BlockchainError::LinkageInvalid(format!(
            "Block {} is dated in the future",
            candidate.index
        )));
    }

    Ok(())
}

/// Check that `chain` starts at genesis and every block links to the one before
pub fn validate_chain(chain: &[Block]) -> Result<(), BlockchainError> {
    let Some(first) = chain.first() else {
        return Err(BlockchainError::ChainRejected("chain is empty".to_string()));
    };

    if *first != Block::genesis() {
        return Err(BlockchainError::ChainRejected(
            "chain does not start at genesis".to_string(),
        ));
    }

    let now = chrono::Utc::now().timestamp();
    for pair in chain.windows(2) {
        validate_block_linkage_at(&pair[1], &pair[0], now)?;
    }

    Ok(())
}

/// Sum of per-block work, saturating
pub fn cumulative_work(chain: &[Block]) -> u128 {
    chain
        .iter()
        .fold(0u128, |total, block| total.saturating_add(block.work()))
}

/// Rebuild the UTXO set by applying every block after genesis to an empty set
pub fn replay(chain: &[Block]) -> Result<UtxoSet, BlockchainError> {
    let mut utxos = UtxoSet::new();
    for block in chain.iter().skip(1) {
        utxos = process_block_transactions(&block.data, &utxos, block.index)?;
    }
    Ok(utxos)
}

/// The main blockchain structure
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    utxos: UtxoSet,
    mempool: Mempool,
}

impl Blockchain {
    /// Create a new blockchain holding only the genesis block
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::genesis()],
            utxos: UtxoSet::new(),
            mempool: Mempool::new(),
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Get the latest block
    pub fn latest_block(&self) -> &Block {
        self.blocks
            .last()
            .expect("Blockchain should have at least genesis block")
    }

    /// Get a block by index
    pub fn get_block(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    /// Get blockchain height
    pub fn height(&self) -> u64 {
        self.latest_block().index
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    /// Owned copy of the UTXO set
    pub fn utxo_snapshot(&self) -> Vec<UnspentTxOut> {
        self.utxos.to_vec()
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Owned copy of the pending transactions
    pub fn mempool_snapshot(&self) -> Vec<Transaction> {
        self.mempool.snapshot()
    }

    /// Confirmed balance of `address`
    pub fn balance(&self, address: &str) -> u64 {
        self.utxos.balance(address)
    }

    /// Confirmed outputs spendable by `address`
    pub fn utxos_for(&self, address: &str) -> Vec<UnspentTxOut> {
        self.utxos.owned_by(address)
    }

    /// Difficulty required for the next block
    pub fn next_difficulty(&self) -> u32 {
        next_difficulty(&self.blocks)
    }

    /// Work accumulated by the current chain
    pub fn cumulative_work(&self) -> u128 {
        cumulative_work(&self.blocks)
    }

    /// Admit a transaction to the mempool against the current UTXO set
    pub fn admit_transaction(&mut self, tx: Transaction) -> Result<(), BlockchainError> {
        self.mempool.admit(tx, &self.utxos)?;
        Ok(())
    }

    /// Append a block on top of the current tip
    pub fn append(&mut self, block: Block) -> Result<(), BlockchainError> {
        validate_block_linkage(&block, self.latest_block())?;
        let utxos = process_block_transactions(&block.data, &self.utxos, block.index)?;

        info!(
            "Appended block {} ({} transaction(s), difficulty {})",
            block.index,
            block.tx_count(),
            block.difficulty
        );

        self.blocks.push(block);
        self.utxos = utxos;
        self.mempool.reconcile(&self.utxos);
        Ok(())
    }

    /// Switch to `candidate` if it is valid and carries strictly more work.
    ///
    /// Ties keep the current chain. The UTXO set is rebuilt from the
    /// candidate's own blocks.
    pub fn try_replace(&mut self, candidate: Vec<Block>) -> Result<(), BlockchainError> {
        validate_chain(&candidate).map_err(|e| match e {
            rejected @ BlockchainError::ChainRejected(_) => rejected,
            other => BlockchainError::ChainRejected(other.to_string()),
        })?;

        let candidate_work = cumulative_work(&candidate);
        let current_work = self.cumulative_work();
        if candidate_work <= current_work {
            return Err(BlockchainError::ChainRejected(format!(
                "candidate work {} does not exceed current work {}",
                candidate_work, current_work
            )));
        }

        let utxos = replay(&candidate).map_err(|e| {
            warn!("Candidate chain failed replay: {}", e);
            BlockchainError::ChainRejected(e.to_string())
        })?;

        info!(
            "Replacing chain at height {} with chain at height {} (work {} -> {})",
            self.height(),
            candidate.len() - 1,
            current_work,
            candidate_work
        );

        self.blocks = candidate;
        self.utxos = utxos;
        self.mempool.reconcile(&self.utxos);
        Ok(())
    }

    /// Get chain statistics
    pub fn stats(&self) -> ChainStats {
        let total_transactions: usize = self.blocks.iter().map(Block::tx_count).sum();

        ChainStats {
            height: self.height(),
            total_blocks: self.blocks.len() as u64,
            total_transactions: total_transactions as u64,
            total_coins: self.utxos.total_value(),
            difficulty: self.next_difficulty(),
            cumulative_work: self.cumulative_work(),
            latest_hash: self.latest_block().hash.clone(),
            mempool_size: self.mempool.len(),
        }
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    pub height: u64,
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub total_coins: u128,
    pub difficulty: u32,
    pub cumulative_work: u128,
    pub latest_hash: String,
    pub mempool_size: usize,
}
