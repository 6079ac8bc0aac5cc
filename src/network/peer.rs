//! Peer management for P2P networking
//!
//! Tracks live connections and routes outgoing messages to them.

use crate::network::message::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

/// Maximum number of connected peers
pub const MAX_PEERS: usize = 8;

/// Peer connection errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Peer disconnected")]
    Disconnected,
    #[error("Peer send queue is full")]
    QueueFull,
    #[error("Max peers reached")]
    MaxPeersReached,
}

/// Handle for sending messages to a peer
#[derive(Clone)]
pub struct PeerHandle {
    pub addr: SocketAddr,
    pub tx: mpsc::Sender<Message>,
}

impl PeerHandle {
    /// Queue a message without waiting for the peer to drain its queue
    pub fn send(&self, msg: Message) -> Result<(), PeerError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => PeerError::QueueFull,
            TrySendError::Closed(_) => PeerError::Disconnected,
        })
    }
}

/// Manages all peer connections
#[derive(Default)]
pub struct PeerManager {
    handles: RwLock<HashMap<SocketAddr, PeerHandle>>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new peer
    pub async fn add_peer(&self, handle: PeerHandle, outbound: bool) -> Result<(), PeerError> {
        let mut handles = self.handles.write().await;

        if handles.len() >= MAX_PEERS {
            return Err(PeerError::MaxPeersReached);
        }

        log::info!("Added peer: {} (outbound: {})", handle.addr, outbound);
        handles.insert(handle.addr, handle);
        Ok(())
    }

    /// Remove a peer
    pub async fn remove_peer(&self, addr: &SocketAddr) {
        let mut handles = self.handles.write().await;
        if handles.remove(addr).is_some() {
            log::info!("Removed peer: {}", addr);
        }
    }

    /// Get all connected peer addresses
    pub async fn get_peers(&self) -> Vec<SocketAddr> {
        let handles = self.handles.read().await;
        handles.keys().cloned().collect()
    }

    /// Broadcast a message to all peers
    pub async fn broadcast(&self, msg: Message) {
        let handles: Vec<PeerHandle> = self.handles.read().await.values().cloned().collect();
        for handle in handles {
            if let Err(e) = handle.send(msg.clone()) {
                log::warn!("Failed to send to {}: {}", handle.addr, e);
                self.drop_if_stalled(&handle.addr, &e).await;
            }
        }
    }

    /// Send a message to a specific peer
    pub async fn send_to(&self, addr: &SocketAddr, msg: Message) -> Result<(), PeerError> {
        let handle = self.handles.read().await.get(addr).cloned();
        let Some(handle) = handle else {
            return Err(PeerError::Disconnected);
        };

        let result = handle.send(msg);
        if let Err(e) = &result {
            self.drop_if_stalled(addr, e).await;
        }
        result
    }

    /// A peer that stopped reading is removed; dropping its handle closes the
    /// connection.
    async fn drop_if_stalled(&self, addr: &SocketAddr, error: &PeerError) {
        if matches!(error, PeerError::QueueFull) {
            log::warn!("Peer {} is not reading, disconnecting", addr);
            self.remove_peer(addr).await;
        }
    }
}
