//! Network message types for P2P communication
//!
//! Defines the messages nodes exchange to converge on one chain and one pool.

use crate::core::{Block, Transaction};
use serde::{Deserialize, Serialize};

/// Magic bytes for message framing
pub const MAGIC: [u8; 4] = [0x4E, 0x4F, 0x4D, 0x44]; // "NOMD"

/// Network message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    /// Ask for the peer's latest block
    QueryLatest,

    /// Ask for the peer's whole chain
    QueryAll,

    /// Blocks in chain order: a single tip, or a full chain
    ResponseBlockchain(Vec<Block>),

    /// Ask for the peer's pending transactions
    QueryMempool,

    /// The sender's pending transactions
    ResponseMempool(Vec<Transaction>),
}

impl Message {
    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::QueryLatest => "QueryLatest",
            Message::QueryAll => "QueryAll",
            Message::ResponseBlockchain(_) => "ResponseBlockchain",
            Message::QueryMempool => "QueryMempool",
            Message::ResponseMempool(_) => "ResponseMempool",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = Message::ResponseBlockchain(vec![Block::genesis()]);
        let bytes = msg.to_bytes().unwrap();
        let decoded = Message::from_bytes(&bytes).unwrap();

        if let Message::ResponseBlockchain(blocks) = decoded {
            assert_eq!(blocks, vec![Block::genesis()]);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_wire_shape() {
        let json: serde_json::Value =
            serde_json::from_slice(&Message::QueryLatest.to_bytes().unwrap()).unwrap();
        assert_eq!(json["type"], "QueryLatest");

        let json: serde_json::Value =
            serde_json::from_slice(&Message::ResponseMempool(Vec::new()).to_bytes().unwrap())
                .unwrap();
        assert_eq!(json["type"], "ResponseMempool");
        assert!(json["data"].as_array().unwrap().is_empty());
    }
}
