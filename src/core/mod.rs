//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (UTXO model, signed inputs, coinbase rewards)
//! - The UTXO set
//! - Blocks (with proof of work)
//! - Blockchain (linkage validation and heaviest-chain selection)

pub mod block;
pub mod blockchain;
pub mod transaction;
pub mod utxo;

pub use block::{calculate_hash, Block, GENESIS_HASH, GENESIS_TIMESTAMP};
pub use blockchain::{
    cumulative_work, replay, validate_block_linkage, validate_block_linkage_at, validate_chain,
    Blockchain, BlockchainError, ChainStats, MAX_TIMESTAMP_DRIFT,
};
pub use transaction::{
    is_valid_transaction, process_block_transactions, sign_tx_in, validate_block_transactions,
    validate_coinbase, validate_transaction, Transaction, TransactionBuilder, TransactionError,
    TxIn, TxOut, COINBASE_AMOUNT,
};
pub use utxo::{OutPoint, UnspentTxOut, UtxoSet};
