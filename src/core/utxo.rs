//! Unspent transaction output set
//!
//! The set is a value: applying transactions returns a new set and leaves
//! the original untouched, so a candidate block can be checked and thrown
//! away without side effects.

use crate::core::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reference to a transaction output: `(txOutId, txOutIndex)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutPoint {
    pub tx_out_id: String,
    pub tx_out_index: u64,
}

impl OutPoint {
    pub fn new(tx_out_id: &str, tx_out_index: u64) -> Self {
        Self {
            tx_out_id: tx_out_id.to_string(),
            tx_out_index,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_out_id, self.tx_out_index)
    }
}

/// Unspent Transaction Output (UTXO)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentTxOut {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    pub address: String,
    pub amount: u64,
}

impl UnspentTxOut {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(&self.tx_out_id, self.tx_out_index)
    }
}

/// The set of spendable outputs, ordered by outpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UtxoSet {
    entries: BTreeMap<OutPoint, UnspentTxOut>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UnspentTxOut> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnspentTxOut> {
        self.entries.values()
    }

    /// Outputs spendable by `address`
    pub fn owned_by(&self, address: &str) -> Vec<UnspentTxOut> {
        self.iter()
            .filter(|utxo| utxo.address == address)
            .cloned()
            .collect()
    }

    /// Sum of the outputs spendable by `address`
    pub fn balance(&self, address: &str) -> u64 {
        self.iter()
            .filter(|utxo| utxo.address == address)
            .map(|utxo| utxo.amount)
            .sum()
    }

    /// Total value held across all outputs
    pub fn total_value(&self) -> u128 {
        self.iter().map(|utxo| utxo.amount as u128).sum()
    }

    /// Owned copy of every entry
    pub fn to_vec(&self) -> Vec<UnspentTxOut> {
        self.iter().cloned().collect()
    }

    /// Return the set obtained by spending every input of `txs` and adding
    /// every output they create. Does not validate.
    pub fn apply_transactions(&self, txs: &[Transaction]) -> UtxoSet {
        let mut next = self.clone();

        for outpoint in txs.iter().flat_map(Transaction::outpoints) {
            next.entries.remove(&outpoint);
        }

        for tx in txs {
            for (index, tx_out) in tx.tx_outs.iter().enumerate() {
                let utxo = UnspentTxOut {
                    tx_out_id: tx.id.clone(),
                    tx_out_index: index as u64,
                    address: tx_out.address.clone(),
                    amount: tx_out.amount,
                };
                next.entries.insert(utxo.outpoint(), utxo);
            }
        }

        next
    }
}
