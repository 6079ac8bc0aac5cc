//! Nomadcoin: a minimal proof-of-work cryptocurrency node
//!
//! This crate provides:
//! - A UTXO transaction model with ECDSA (secp256k1) signed inputs
//! - A mempool guarding against double spends
//! - Proof-of-work mining with periodic difficulty retargeting
//! - A ledger that follows the chain with the most cumulative work
//! - A wallet, a P2P relay and an HTTP API around the ledger
//!
//! # Example
//!
//! ```rust
//! use nomadcoin::core::Blockchain;
//! use nomadcoin::mining::Miner;
//! use nomadcoin::wallet::Wallet;
//!
//! // Create a new blockchain
//! let mut blockchain = Blockchain::new();
//!
//! // Create a wallet
//! let wallet = Wallet::generate();
//! println!("Address: {}", wallet.address());
//!
//! // Mine a block
//! let miner = Miner::new(&wallet.address());
//! let template = miner.template(blockchain.blocks(), blockchain.mempool_snapshot());
//! let (block, stats) = template.mine();
//! println!("Mined block {} in {}ms", block.index, stats.time_ms);
//! blockchain.append(block).unwrap();
//!
//! // Check balance
//! let balance = wallet.balance(blockchain.utxos());
//! println!("Balance: {} coins", balance);
//! ```

pub mod api;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod service;
pub mod wallet;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use core::{Block, Blockchain, Transaction, UtxoSet, COINBASE_AMOUNT};
pub use crypto::KeyPair;
pub use mining::{Mempool, Miner};
pub use network::{Node, NodeConfig};
pub use service::{NodeError, NodeEvent, NodeService};
pub use wallet::Wallet;
