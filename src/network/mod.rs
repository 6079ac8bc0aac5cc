//! P2P Networking module
//!
//! Keeps nodes on the same chain and the same pending transactions.
//!
//! # Features
//! - TCP connections with length-prefixed JSON framing
//! - Tip and full-chain exchange
//! - Mempool exchange
//! - Relay of new tips and pool changes to every peer

pub mod message;
pub mod node;
pub mod peer;
pub mod server;

pub use message::{Message, MAGIC};
pub use node::{Node, NodeConfig};
pub use peer::{PeerError, PeerHandle, PeerManager, MAX_PEERS};
pub use server::{connect_to_peer, MessageCodec, Server, MAX_MESSAGE_SIZE};
