//! Node service
//!
//! Shared handle over the ledger used by the HTTP API and the P2P layer.
//! The chain, its UTXO set and the mempool sit behind one lock; everything
//! handed out is an owned copy.

use crate::core::{Block, Blockchain, BlockchainError, ChainStats, Transaction, UnspentTxOut};
use crate::mining::Miner;
use crate::wallet::{Wallet, WalletError};
use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch, RwLock};

/// Maximum number of events buffered per subscriber
const EVENT_CAPACITY: usize = 100;

/// Service-level errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("Mining task failed: {0}")]
    Mining(String),
}

/// Ledger changes other components react to
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// The chain has a new tip, either appended or reached by a replacement
    NewBlock(Block),
    /// The mempool gained transactions; carries the full pool
    MempoolChanged(Vec<Transaction>),
}

/// Outcome of processing blocks received from a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// The single received block extended our tip
    Appended,
    /// The received block is ahead but does not link to our tip
    RequestFullChain,
    /// Our chain was replaced by the received one
    Replaced,
    /// Nothing to do
    Ignored,
}

/// Cloneable handle to the node's ledger and wallet
#[derive(Clone)]
pub struct NodeService {
    blockchain: Arc<RwLock<Blockchain>>,
    wallet: Arc<Wallet>,
    tip: Arc<watch::Sender<String>>,
    events: broadcast::Sender<NodeEvent>,
}

impl NodeService {
    /// Create a service over a fresh chain holding only genesis
    pub fn new(wallet: Wallet) -> Self {
        let blockchain = Blockchain::new();
        let (tip, _) = watch::channel(blockchain.latest_block().hash.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            blockchain: Arc::new(RwLock::new(blockchain)),
            wallet: Arc::new(wallet),
            tip: Arc::new(tip),
            events,
        }
    }

    /// Subscribe to ledger events
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    pub fn address(&self) -> String {
        self.wallet.address()
    }

    /// Owned copy of the whole chain
    pub async fn get_chain(&self) -> Vec<Block> {
        self.blockchain.read().await.blocks().to_vec()
    }

    pub async fn latest_block(&self) -> Block {
        self.blockchain.read().await.latest_block().clone()
    }

    /// Block at height `index`, if the chain is that long
    pub async fn get_block(&self, index: u64) -> Option<Block> {
        self.blockchain.read().await.get_block(index).cloned()
    }

    pub async fn stats(&self) -> ChainStats {
        self.blockchain.read().await.stats()
    }

    /// Confirmed balance of `address`
    pub async fn get_balance(&self, address: &str) -> u64 {
        self.blockchain.read().await.balance(address)
    }

    /// Confirmed balance of this node's wallet
    pub async fn my_balance(&self) -> u64 {
        self.get_balance(&self.address()).await
    }

    /// Owned copy of the UTXO set
    pub async fn utxos(&self) -> Vec<UnspentTxOut> {
        self.blockchain.read().await.utxo_snapshot()
    }

    /// Confirmed outputs owned by this node's wallet
    pub async fn my_utxos(&self) -> Vec<UnspentTxOut> {
        self.blockchain.read().await.utxos_for(&self.address())
    }

    /// Owned copy of the pending transactions
    pub async fn mempool_snapshot(&self) -> Vec<Transaction> {
        self.blockchain.read().await.mempool_snapshot()
    }

    /// Mine a block paying this node's wallet and append it.
    ///
    /// The nonce search runs on a blocking worker without holding the lock.
    /// If another block becomes the tip meanwhile, the search is dropped and
    /// restarted on top of the new tip.
    pub async fn append_mined_block(&self) -> Result<Block, NodeError> {
        let miner = Miner::new(&self.address());

        loop {
            // A fresh receiver treats the current tip as seen
            let tip_rx = self.tip.subscribe();
            let template = {
                let chain = self.blockchain.read().await;
                miner.template(chain.blocks(), chain.mempool_snapshot())
            };
            let parent = template.previous_hash.clone();

            let found = tokio::task::spawn_blocking(move || {
                template.mine_until(|| tip_rx.has_changed().unwrap_or(true))
            })
            .await
            .map_err(|e| NodeError::Mining(e.to_string()))?;

            let Some((block, stats)) = found else {
                info!("Tip moved while mining on {}, restarting", parent);
                continue;
            };

            let mut chain = self.blockchain.write().await;
            if chain.latest_block().hash != parent {
                debug!("Mined block {} is stale, restarting", block.index);
                continue;
            }

            chain.append(block.clone())?;
            self.announce_tip(&block);
            drop(chain);

            info!(
                "Mined block {} with {} attempts in {}ms ({:.0} H/s)",
                block.index, stats.hash_attempts, stats.time_ms, stats.hash_rate
            );
            return Ok(block);
        }
    }

    /// Pay `amount` to `to` from this node's wallet and pool the transaction
    pub async fn submit_payment(&self, to: &str, amount: u64) -> Result<Transaction, NodeError> {
        let mut chain = self.blockchain.write().await;
        let tx = self.wallet.create_transaction(
            to,
            amount,
            chain.utxos(),
            &chain.mempool_snapshot(),
        )?;
        chain.admit_transaction(tx.clone())?;
        let pool = chain.mempool_snapshot();
        drop(chain);

        info!("Submitted payment {} of {} to {}", tx.id, amount, to);
        let _ = self.events.send(NodeEvent::MempoolChanged(pool));
        Ok(tx)
    }

    /// Pool a transaction received from outside
    pub async fn receive_transaction(&self, tx: Transaction) -> Result<(), NodeError> {
        let mut chain = self.blockchain.write().await;
        chain.admit_transaction(tx)?;
        let pool = chain.mempool_snapshot();
        drop(chain);

        let _ = self.events.send(NodeEvent::MempoolChanged(pool));
        Ok(())
    }

    /// Pool every acceptable transaction of a peer's mempool.
    ///
    /// Returns how many were admitted.
    pub async fn receive_transactions(&self, txs: Vec<Transaction>) -> usize {
        let mut chain = self.blockchain.write().await;
        let mut admitted = 0;

        for tx in txs {
            if chain.mempool().contains(&tx.id) {
                continue;
            }
            let id = tx.id.clone();
            match chain.admit_transaction(tx) {
                Ok(()) => admitted += 1,
                Err(e) => debug!("Not pooling transaction {}: {}", id, e),
            }
        }

        if admitted > 0 {
            let pool = chain.mempool_snapshot();
            drop(chain);
            let _ = self.events.send(NodeEvent::MempoolChanged(pool));
        }
        admitted
    }

    /// Append a block received from outside on top of the current tip
    pub async fn receive_block(&self, block: Block) -> Result<(), NodeError> {
        let mut chain = self.blockchain.write().await;
        chain.append(block.clone())?;
        self.announce_tip(&block);
        Ok(())
    }

    /// Replace the chain with `blocks` if it carries more work
    pub async fn receive_chain(&self, blocks: Vec<Block>) -> Result<(), NodeError> {
        let mut chain = self.blockchain.write().await;
        chain.try_replace(blocks)?;
        let tip = chain.latest_block().clone();
        self.announce_tip(&tip);
        Ok(())
    }

    /// Decide what to do with blocks a peer sent us
    pub async fn handle_blocks_response(
        &self,
        blocks: Vec<Block>,
    ) -> Result<SyncAction, NodeError> {
        let Some(latest_received) = blocks.last() else {
            return Ok(SyncAction::Ignored);
        };
        let latest_held = self.latest_block().await;

        if latest_received.index <= latest_held.index {
            if blocks.len() == 1 {
                debug!(
                    "Received block {} is not ahead of ours ({})",
                    latest_received.index, latest_held.index
                );
                return Ok(SyncAction::Ignored);
            }
            // Same height or shorter can still be heavier
            return match self.receive_chain(blocks).await {
                Ok(()) => Ok(SyncAction::Replaced),
                Err(NodeError::Blockchain(BlockchainError::ChainRejected(reason))) => {
                    debug!("Kept current chain: {}", reason);
                    Ok(SyncAction::Ignored)
                }
                Err(e) => Err(e),
            };
        }

        info!(
            "Peer is ahead: we have {}, peer has {}",
            latest_held.index, latest_received.index
        );

        if latest_received.previous_hash.as_deref() == Some(latest_held.hash.as_str()) {
            let block = latest_received.clone();
            self.receive_block(block).await?;
            Ok(SyncAction::Appended)
        } else if blocks.len() == 1 {
            Ok(SyncAction::RequestFullChain)
        } else {
            match self.receive_chain(blocks).await {
                Ok(()) => Ok(SyncAction::Replaced),
                Err(e) => {
                    warn!("Rejected longer chain from peer: {}", e);
                    Err(e)
                }
            }
        }
    }

    /// Publish a new tip. Callers hold the write guard so that tips are
    /// published in the order they were committed.
    fn announce_tip(&self, block: &Block) {
        self.tip.send_replace(block.hash.clone());
        let _ = self.events.send(NodeEvent::NewBlock(block.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::COINBASE_AMOUNT;
    use crate::mining::BlockTemplate;
    use std::time::Duration;

    fn service() -> NodeService {
        NodeService::new(Wallet::generate())
    }

    #[tokio::test]
    async fn test_mined_block_pays_wallet() {
        let node = service();
        let mut events = node.subscribe();

        let block = node.append_mined_block().await.unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(node.my_balance().await, COINBASE_AMOUNT);
        assert_eq!(node.get_chain().await.len(), 2);
        match events.recv().await.unwrap() {
            NodeEvent::NewBlock(announced) => assert_eq!(announced, block),
            other => panic!("unexpected event {:?}", other),
        }
    }

    fn mined_on(parent: &Block, miner: &str, difficulty: u32) -> Block {
        BlockTemplate {
            index: parent.index + 1,
            previous_hash: parent.hash.clone(),
            timestamp: chrono::Utc::now().timestamp(),
            data: vec![Transaction::coinbase(miner, parent.index + 1)],
            difficulty,
        }
        .mine()
        .0
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mining_restarts_on_competing_tip() {
        let node = service();
        let rival = Wallet::generate().address();

        // A tip at difficulty 16 keeps the next search busy for a while
        let block1 = mined_on(&node.latest_block().await, &rival, 16);
        node.receive_block(block1.clone()).await.unwrap();

        let miner = node.clone();
        let mining = tokio::spawn(async move { miner.append_mined_block().await });

        // Wait for the search to subscribe to the tip, then let it start hashing
        while node.tip.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        let competitor = mined_on(&block1, &rival, 0);
        node.receive_block(competitor.clone()).await.unwrap();

        let mined = mining.await.unwrap().unwrap();
        assert_eq!(mined.index, 3);
        assert_eq!(mined.previous_hash.as_deref(), Some(competitor.hash.as_str()));
        assert_eq!(node.latest_block().await, mined);
        assert_eq!(node.my_balance().await, COINBASE_AMOUNT);
    }

    #[tokio::test]
    async fn test_tip_events_follow_commit_order() {
        let node = service();
        let mut events = node.subscribe();

        let first = node.append_mined_block().await.unwrap();
        let second = node.append_mined_block().await.unwrap();

        for expected in [first, second.clone()] {
            match events.recv().await.unwrap() {
                NodeEvent::NewBlock(block) => assert_eq!(block, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(*node.tip.borrow(), second.hash);
    }

    #[tokio::test]
    async fn test_payment_flow() {
        let node = service();
        let recipient = Wallet::generate().address();

        node.append_mined_block().await.unwrap();
        let tx = node.submit_payment(&recipient, 20).await.unwrap();
        assert_eq!(node.mempool_snapshot().await, vec![tx]);

        node.append_mined_block().await.unwrap();
        assert_eq!(node.get_balance(&recipient).await, 20);
        assert_eq!(node.my_balance().await, 30 + COINBASE_AMOUNT);
        assert!(node.mempool_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_payment_without_funds_fails() {
        let node = service();
        let recipient = Wallet::generate().address();

        let result = node.submit_payment(&recipient, 1).await;
        assert!(matches!(
            result,
            Err(NodeError::Wallet(WalletError::InsufficientFunds { .. }))
        ));
        assert!(node.mempool_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_payment_uses_remaining_outputs() {
        let node = service();
        let recipient = Wallet::generate().address();

        node.append_mined_block().await.unwrap();
        node.append_mined_block().await.unwrap();
        node.submit_payment(&recipient, 50).await.unwrap();
        node.submit_payment(&recipient, 50).await.unwrap();

        assert_eq!(node.mempool_snapshot().await.len(), 2);
        assert!(node.submit_payment(&recipient, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_block_from_peer_is_appended() {
        let ours = service();
        let theirs = service();

        let block = theirs.append_mined_block().await.unwrap();
        let action = ours.handle_blocks_response(vec![block.clone()]).await.unwrap();

        assert_eq!(action, SyncAction::Appended);
        assert_eq!(ours.latest_block().await, block);
    }

    #[tokio::test]
    async fn test_unlinked_block_requests_full_chain() {
        let ours = service();
        let theirs = service();

        theirs.append_mined_block().await.unwrap();
        let tip = theirs.append_mined_block().await.unwrap();

        let action = ours.handle_blocks_response(vec![tip]).await.unwrap();
        assert_eq!(action, SyncAction::RequestFullChain);

        let action = ours
            .handle_blocks_response(theirs.get_chain().await)
            .await
            .unwrap();
        assert_eq!(action, SyncAction::Replaced);
        assert_eq!(ours.get_chain().await, theirs.get_chain().await);
    }

    #[tokio::test]
    async fn test_shorter_chain_is_ignored() {
        let ours = service();
        let theirs = service();

        ours.append_mined_block().await.unwrap();
        ours.append_mined_block().await.unwrap();
        theirs.append_mined_block().await.unwrap();

        let action = ours
            .handle_blocks_response(theirs.get_chain().await)
            .await
            .unwrap();
        assert_eq!(action, SyncAction::Ignored);

        let stale = theirs.latest_block().await;
        let action = ours.handle_blocks_response(vec![stale]).await.unwrap();
        assert_eq!(action, SyncAction::Ignored);
        assert_eq!(ours.get_chain().await.len(), 3);
    }

    #[tokio::test]
    async fn test_peer_mempool_is_pooled_once() {
        let sender = service();
        let receiver = service();
        let recipient = Wallet::generate().address();

        let block = sender.append_mined_block().await.unwrap();
        receiver.receive_block(block).await.unwrap();
        sender.submit_payment(&recipient, 10).await.unwrap();

        let pool = sender.mempool_snapshot().await;
        assert_eq!(receiver.receive_transactions(pool.clone()).await, 1);
        assert_eq!(receiver.receive_transactions(pool).await, 0);
        assert_eq!(receiver.mempool_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_transaction_rejected() {
        let node = service();
        let other = service();
        let recipient = Wallet::generate().address();

        // Spends an output that only exists on the other node's chain
        other.append_mined_block().await.unwrap();
        let tx = other.submit_payment(&recipient, 10).await.unwrap();

        let result = node.receive_transaction(tx).await;
        assert!(matches!(result, Err(NodeError::Blockchain(_))));
    }
}
