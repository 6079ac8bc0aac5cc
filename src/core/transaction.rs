//! Transaction handling for the ledger
//!
//! Implements a UTXO-based transaction model with digital signatures:
//! - Content-addressed transaction ids
//! - Per-input ECDSA signatures over the id
//! - Value conservation (inputs == outputs, no fees)
//! - Coinbase (mining reward) transactions
//!
//! Validation lives here as free functions taking the UTXO set they are
//! checked against, so a block can be validated without touching ledger state.

use crate::core::utxo::{OutPoint, UnspentTxOut, UtxoSet};
use crate::crypto::{is_valid_address, sha256_hex, verify_signature, KeyError, KeyPair};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Reward paid by the coinbase transaction of every mined block
pub const COINBASE_AMOUNT: u64 = 50;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Malformed transaction: {0}")]
    StructureInvalid(String),
    #[error("Transaction id {0} does not match its contents")]
    IdMismatch(String),
    #[error("Invalid signature for input spending {0}")]
    SignatureInvalid(OutPoint),
    #[error("Inputs ({inputs}) do not balance outputs ({outputs})")]
    BalanceMismatch { inputs: u128, outputs: u128 },
    #[error("Output {0} is spent more than once")]
    DuplicateInput(OutPoint),
    #[error("Referenced output {0} not found")]
    UtxoNotFound(OutPoint),
    #[error("Invalid coinbase transaction: {0}")]
    InvalidCoinbase(String),
    #[error("Signing key does not own output {0}")]
    KeyMismatch(OutPoint),
    #[error("Crypto error: {0}")]
    CryptoError(String),
}

impl From<KeyError> for TransactionError {
    fn from(e: KeyError) -> Self {
        TransactionError::CryptoError(e.to_string())
    }
}

// =============================================================================
// Transaction Input / Output
// =============================================================================

/// Transaction input (reference to a previous output)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxIn {
    /// Id of the transaction that created the spent output
    pub tx_out_id: String,
    /// Index of the output in that transaction (block index for coinbase)
    pub tx_out_index: u64,
    /// Hex-encoded DER signature over the spending transaction's id
    pub signature: String,
}

impl TxIn {
    /// Unsigned input spending the given output
    pub fn spending(utxo: &UnspentTxOut) -> Self {
        Self {
            tx_out_id: utxo.tx_out_id.clone(),
            tx_out_index: utxo.tx_out_index,
            signature: String::new(),
        }
    }

    /// The output this input consumes
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(&self.tx_out_id, self.tx_out_index)
    }
}

/// Transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxOut {
    /// Recipient's address (uncompressed public key hex)
    pub address: String,
    /// Amount of coins
    pub amount: u64,
}

impl TxOut {
    pub fn new(address: &str, amount: u64) -> Self {
        Self {
            address: address.to_string(),
            amount,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A ledger transaction. Never mutated once its inputs are signed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Content hash of inputs and outputs
    pub id: String,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

impl Transaction {
    /// Create a new (unsigned) transaction with its id assigned
    pub fn new(tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>) -> Self {
        let mut tx = Self {
            id: String::new(),
            tx_ins,
            tx_outs,
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Create the coinbase (mining reward) transaction for a block
    pub fn coinbase(address: &str, block_index: u64) -> Self {
        let tx_in = TxIn {
            tx_out_id: String::new(),
            tx_out_index: block_index,
            signature: String::new(),
        };
        Self::new(vec![tx_in], vec![TxOut::new(address, COINBASE_AMOUNT)])
    }

    /// Compute the transaction id from inputs and outputs.
    ///
    /// Signatures are not part of the id; they sign it.
    pub fn compute_id(&self) -> String {
        let mut data = String::new();
        for tx_in in &self.tx_ins {
            data.push_str(&tx_in.tx_out_id);
            data.push_str(&tx_in.tx_out_index.to_string());
        }
        for tx_out in &self.tx_outs {
            data.push_str(&tx_out.address);
            data.push_str(&tx_out.amount.to_string());
        }
        sha256_hex(data.as_bytes())
    }

    /// Shape checks the type system cannot express
    pub fn validate_structure(&self) -> Result<(), TransactionError> {
        for (index, tx_out) in self.tx_outs.iter().enumerate() {
            if !is_valid_address(&tx_out.address) {
                return Err(TransactionError::StructureInvalid(format!(
                    "output {} has an invalid address",
                    index
                )));
            }
            if tx_out.amount == 0 {
                return Err(TransactionError::StructureInvalid(format!(
                    "output {} has a zero amount",
                    index
                )));
            }
        }
        Ok(())
    }

    /// Get total output amount
    pub fn total_output(&self) -> u128 {
        self.tx_outs.iter().map(|o| o.amount as u128).sum()
    }

    /// Outputs consumed by this transaction
    pub fn outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.tx_ins.iter().map(TxIn::outpoint)
    }
}

// =============================================================================
// Signing
// =============================================================================

/// Sign input `input_index` of `tx` with `key`.
///
/// Fails with `UtxoNotFound` when the referenced output is unknown and with
/// `KeyMismatch` when the key does not own it.
pub fn sign_tx_in(
    tx: &Transaction,
    input_index: usize,
    key: &KeyPair,
    utxos: &UtxoSet,
) -> Result<String, TransactionError> {
    let tx_in = tx.tx_ins.get(input_index).ok_or_else(|| {
        TransactionError::StructureInvalid(format!("no input at index {}", input_index))
    })?;
    let outpoint = tx_in.outpoint();

    let referenced = utxos
        .get(&outpoint)
        .ok_or_else(|| TransactionError::UtxoNotFound(outpoint.clone()))?;

    if key.address() != referenced.address {
        return Err(TransactionError::KeyMismatch(outpoint));
    }

    let digest = hex::decode(&tx.id)
        .map_err(|_| TransactionError::StructureInvalid("id is not hex".to_string()))?;
    let signature = key.sign(&digest)?;
    Ok(hex::encode(signature))
}

// =============================================================================
// Transaction Builder
// =============================================================================

/// Builder for payments spending known UTXOs
#[derive(Default)]
pub struct TransactionBuilder {
    spent: Vec<UnspentTxOut>,
    outputs: Vec<TxOut>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input from a UTXO
    pub fn add_input(mut self, utxo: &UnspentTxOut) -> Self {
        self.spent.push(utxo.clone());
        self
    }

    /// Add an output
    pub fn add_output(mut self, address: &str, amount: u64) -> Self {
        self.outputs.push(TxOut::new(address, amount));
        self
    }

    /// Build without signing
    pub fn build(self) -> Transaction {
        let tx_ins = self.spent.iter().map(TxIn::spending).collect();
        Transaction::new(tx_ins, self.outputs)
    }

    /// Build and sign every input with `key`
    pub fn build_and_sign(
        self,
        key: &KeyPair,
        utxos: &UtxoSet,
    ) -> Result<Transaction, TransactionError> {
        let mut tx = self.build();
        let signatures = (0..tx.tx_ins.len())
            .map(|index| sign_tx_in(&tx, index, key, utxos))
            .collect::<Result<Vec<_>, _>>()?;
        for (tx_in, signature) in tx.tx_ins.iter_mut().zip(signatures) {
            tx_in.signature = signature;
        }
        Ok(tx)
    }
}

// =============================================================================
// Validation
// =============================================================================

fn verify_tx_in(
    tx: &Transaction,
    tx_in: &TxIn,
    referenced: &UnspentTxOut,
) -> Result<(), TransactionError> {
    let outpoint = tx_in.outpoint();
    let digest =
        hex::decode(&tx.id).map_err(|_| TransactionError::SignatureInvalid(outpoint.clone()))?;
    let signature = hex::decode(&tx_in.signature)
        .map_err(|_| TransactionError::SignatureInvalid(outpoint.clone()))?;

    match verify_signature(&referenced.address, &digest, &signature) {
        Ok(true) => Ok(()),
        _ => Err(TransactionError::SignatureInvalid(outpoint)),
    }
}

/// Validate a regular (non-coinbase) transaction against a UTXO set
pub fn validate_transaction(tx: &Transaction, utxos: &UtxoSet) -> Result<(), TransactionError> {
    tx.validate_structure()?;

    if tx.compute_id() != tx.id {
        return Err(TransactionError::IdMismatch(tx.id.clone()));
    }

    if tx.tx_ins.is_empty() || tx.tx_outs.is_empty() {
        return Err(TransactionError::StructureInvalid(
            "transaction needs at least one input and one output".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut inputs: u128 = 0;

    for tx_in in &tx.tx_ins {
        let outpoint = tx_in.outpoint();
        if !seen.insert(outpoint.clone()) {
            return Err(TransactionError::DuplicateInput(outpoint));
        }

        let referenced = utxos
            .get(&outpoint)
            .ok_or_else(|| TransactionError::UtxoNotFound(outpoint.clone()))?;

        verify_tx_in(tx, tx_in, referenced)?;
        inputs += referenced.amount as u128;
    }

    let outputs = tx.total_output();
    if inputs != outputs {
        return Err(TransactionError::BalanceMismatch { inputs, outputs });
    }

    Ok(())
}

/// Boolean form of [`validate_transaction`]
pub fn is_valid_transaction(tx: &Transaction, utxos: &UtxoSet) -> bool {
    validate_transaction(tx, utxos).is_ok()
}

/// Validate the coinbase transaction of the block at `block_index`
pub fn validate_coinbase(tx: &Transaction, block_index: u64) -> Result<(), TransactionError> {
    tx.validate_structure()
        .map_err(|e| TransactionError::InvalidCoinbase(e.to_string()))?;

    if tx.compute_id() != tx.id {
        return Err(TransactionError::IdMismatch(tx.id.clone()));
    }

    let [tx_in] = tx.tx_ins.as_slice() else {
        return Err(TransactionError::InvalidCoinbase(format!(
            "expected exactly one input, found {}",
            tx.tx_ins.len()
        )));
    };
    if tx_in.tx_out_index != block_index {
        return Err(TransactionError::InvalidCoinbase(format!(
            "input index {} does not match block index {}",
            tx_in.tx_out_index, block_index
        )));
    }
    // A coinbase input must not point at a real output
    if !tx_in.tx_out_id.is_empty() || !tx_in.signature.is_empty() {
        return Err(TransactionError::InvalidCoinbase(
            "input must not reference an output".to_string(),
        ));
    }

    let [tx_out] = tx.tx_outs.as_slice() else {
        return Err(TransactionError::InvalidCoinbase(format!(
            "expected exactly one output, found {}",
            tx.tx_outs.len()
        )));
    };
    if tx_out.amount != COINBASE_AMOUNT {
        return Err(TransactionError::InvalidCoinbase(format!(
            "reward {} differs from {}",
            tx_out.amount, COINBASE_AMOUNT
        )));
    }

    Ok(())
}

/// Validate the full transaction list of the block at `block_index`
pub fn validate_block_transactions(
    txs: &[Transaction],
    utxos: &UtxoSet,
    block_index: u64,
) -> Result<(), TransactionError> {
    let (coinbase, rest) = txs.split_first().ok_or_else(|| {
        TransactionError::InvalidCoinbase("block has no transactions".to_string())
    })?;
    validate_coinbase(coinbase, block_index)?;

    let mut seen = HashSet::new();
    for outpoint in txs.iter().flat_map(Transaction::outpoints) {
        if !seen.insert(outpoint.clone()) {
            return Err(TransactionError::DuplicateInput(outpoint));
        }
    }

    for tx in rest {
        validate_transaction(tx, utxos)?;
    }

    Ok(())
}

/// Validate a block's transactions and return the UTXO set after applying them
pub fn process_block_transactions(
    txs: &[Transaction],
    utxos: &UtxoSet,
    block_index: u64,
) -> Result<UtxoSet, TransactionError> {
    validate_block_transactions(txs, utxos, block_index)?;
    Ok(utxos.apply_transactions(txs))
}

// =============================================================================
// Tests
// =============================================================================
