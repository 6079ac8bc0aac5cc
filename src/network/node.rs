//! P2P Node implementation
//!
//! Wires the TCP server, the peer manager and the node service together:
//! inbound messages are applied to the ledger, and ledger events are relayed
//! to every connected peer.

use crate::network::message::Message;
use crate::network::peer::{PeerError, PeerManager};
use crate::network::server::{connect_to_peer, handle_connection, Server};
use crate::service::{NodeEvent, NodeService, SyncAction};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

/// P2P Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port to listen on (0 picks a free port)
    pub port: u16,
    /// Initial peers to connect to
    pub bootstrap_peers: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: 6001,
            bootstrap_peers: Vec::new(),
        }
    }
}

/// Handle to a running P2P node
#[derive(Clone)]
pub struct Node {
    service: NodeService,
    peer_manager: Arc<PeerManager>,
    message_tx: mpsc::Sender<(SocketAddr, Message)>,
    local_addr: SocketAddr,
}

impl Node {
    /// Bind the listener, spawn the background tasks and dial the bootstrap peers
    pub async fn start(config: NodeConfig, service: NodeService) -> Result<Self, std::io::Error> {
        let server = Server::bind(config.port).await?;
        let local_addr = server.local_addr()?;
        let (message_tx, message_rx) = mpsc::channel::<(SocketAddr, Message)>(1000);
        let events = service.subscribe();

        let node = Self {
            service,
            peer_manager: Arc::new(PeerManager::new()),
            message_tx,
            local_addr,
        };

        tokio::spawn(node.clone().accept_loop(server));
        tokio::spawn(node.clone().message_loop(message_rx));
        tokio::spawn(node.clone().relay_loop(events));

        for peer_addr in &config.bootstrap_peers {
            if let Err(e) = node.connect_to(peer_addr).await {
                log::warn!("Could not connect to bootstrap peer {}: {}", peer_addr, e);
            }
        }

        Ok(node)
    }

    /// Address the P2P listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get all connected peer addresses
    pub async fn peers(&self) -> Vec<SocketAddr> {
        self.peer_manager.get_peers().await
    }

    /// Connect to a peer
    pub async fn connect_to(&self, addr: &str) -> Result<SocketAddr, PeerError> {
        log::info!("Connecting to peer: {}", addr);

        let (stream, peer_addr) = connect_to_peer(addr).await?;
        let pm = self.peer_manager.clone();
        let message_tx = self.message_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, pm, message_tx, true).await {
                log::warn!("Connection error with {}: {}", peer_addr, e);
            }
        });

        Ok(peer_addr)
    }

    async fn accept_loop(self, server: Server) {
        loop {
            match server.accept().await {
                Ok((stream, addr)) => {
                    log::info!("Incoming connection from {}", addr);

                    let pm = self.peer_manager.clone();
                    let tx = self.message_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, pm, tx, false).await {
                            log::warn!("Connection error with {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Accept error: {}", e);
                }
            }
        }
    }

    async fn message_loop(self, mut message_rx: mpsc::Receiver<(SocketAddr, Message)>) {
        while let Some((from, msg)) = message_rx.recv().await {
            self.handle_message(from, msg).await;
        }
    }

    /// Forward ledger events to every peer
    async fn relay_loop(self, mut events: broadcast::Receiver<NodeEvent>) {
        loop {
            match events.recv().await {
                Ok(NodeEvent::NewBlock(block)) => {
                    self.peer_manager
                        .broadcast(Message::ResponseBlockchain(vec![block]))
                        .await;
                }
                Ok(NodeEvent::MempoolChanged(transactions)) => {
                    self.peer_manager
                        .broadcast(Message::ResponseMempool(transactions))
                        .await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Relay fell behind, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Handle incoming messages
    async fn handle_message(&self, from: SocketAddr, msg: Message) {
        log::debug!("Received {} from {}", msg.type_name(), from);

        match msg {
            Message::QueryLatest => {
                let latest = self.service.latest_block().await;
                self.reply(from, Message::ResponseBlockchain(vec![latest]))
                    .await;
            }

            Message::QueryAll => {
                let chain = self.service.get_chain().await;
                self.reply(from, Message::ResponseBlockchain(chain)).await;
            }

            Message::ResponseBlockchain(blocks) => {
                match self.service.handle_blocks_response(blocks).await {
                    Ok(SyncAction::RequestFullChain) => {
                        self.peer_manager.broadcast(Message::QueryAll).await;
                    }
                    Ok(action) => {
                        log::debug!("Blocks from {}: {:?}", from, action);
                    }
                    Err(e) => {
                        log::warn!("Rejected blocks from {}: {}", from, e);
                    }
                }
            }

            Message::QueryMempool => {
                let pool = self.service.mempool_snapshot().await;
                self.reply(from, Message::ResponseMempool(pool)).await;
            }

            Message::ResponseMempool(transactions) => {
                let received = transactions.len();
                let admitted = self.service.receive_transactions(transactions).await;
                log::debug!(
                    "Pooled {} of {} transaction(s) from {}",
                    admitted,
                    received,
                    from
                );
            }
        }
    }

    async fn reply(&self, to: SocketAddr, msg: Message) {
        let kind = msg.type_name();
        if let Err(e) = self.peer_manager.send_to(&to, msg).await {
            log::warn!("Failed to send {} to {}: {}", kind, to, e);
        }
    }
}
