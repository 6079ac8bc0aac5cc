//! Transaction pool (mempool) for pending transactions
//!
//! Holds unconfirmed transactions waiting to be included in blocks, in
//! arrival order. Two guards keep it consistent:
//! - a transaction must validate against the confirmed UTXO set
//! - no two pooled transactions may spend the same output

use crate::core::{validate_transaction, OutPoint, Transaction, TransactionError, UtxoSet};
use std::collections::HashSet;
use thiserror::Error;

/// Mempool errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MempoolError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),
    #[error("Output {0} is already spent by a pending transaction")]
    ConflictsWithPool(OutPoint),
}

/// Memory pool for pending transactions
#[derive(Debug, Default, Clone)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    /// Create an empty mempool
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a transaction if it is valid and spends nothing already pending
    pub fn admit(&mut self, tx: Transaction, utxos: &UtxoSet) -> Result<(), MempoolError> {
        validate_transaction(&tx, utxos)?;

        let pending = self.spent_outpoints();
        if let Some(conflict) = tx.outpoints().find(|outpoint| pending.contains(outpoint)) {
            return Err(MempoolError::ConflictsWithPool(conflict));
        }

        log::debug!("Admitted transaction {} to mempool", tx.id);
        self.transactions.push(tx);
        Ok(())
    }

    /// Evict every transaction that spends an output missing from `utxos`.
    ///
    /// A transaction with any such input is dropped as a whole.
    pub fn reconcile(&mut self, utxos: &UtxoSet) {
        let before = self.transactions.len();
        self.transactions
            .retain(|tx| tx.outpoints().all(|outpoint| utxos.contains(&outpoint)));

        let evicted = before - self.transactions.len();
        if evicted > 0 {
            log::info!("Evicted {} stale transaction(s) from mempool", evicted);
        }
    }

    /// Owned copy of the pending transactions in arrival order
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    /// Whether a transaction with this id is pending
    pub fn contains(&self, tx_id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id == tx_id)
    }

    /// Every output spent by a pending transaction
    pub fn spent_outpoints(&self) -> HashSet<OutPoint> {
        self.transactions
            .iter()
            .flat_map(Transaction::outpoints)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TransactionBuilder, UnspentTxOut};
    use crate::crypto::KeyPair;

    fn funded(owner: &KeyPair, blocks: u64) -> (UtxoSet, Vec<UnspentTxOut>) {
        let coinbases: Vec<_> = (1..=blocks)
            .map(|index| Transaction::coinbase(&owner.address(), index))
            .collect();
        let utxos = UtxoSet::new().apply_transactions(&coinbases);
        let owned = utxos.owned_by(&owner.address());
        (utxos, owned)
    }

    fn pay(from: &KeyPair, utxo: &UnspentTxOut, to: &str, utxos: &UtxoSet) -> Transaction {
        TransactionBuilder::new()
            .add_input(utxo)
            .add_output(to, utxo.amount)
            .build_and_sign(from, utxos)
            .unwrap()
    }

    #[test]
    fn test_admit_valid_transaction() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let (utxos, owned) = funded(&alice, 1);

        let mut mempool = Mempool::new();
        mempool
            .admit(pay(&alice, &owned[0], &bob.address(), &utxos), &utxos)
            .unwrap();

        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_second_spend_conflicts_with_pool() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let carol = KeyPair::generate();
        let (utxos, owned) = funded(&alice, 1);

        let mut mempool = Mempool::new();
        mempool
            .admit(pay(&alice, &owned[0], &bob.address(), &utxos), &utxos)
            .unwrap();

        let result = mempool.admit(pay(&alice, &owned[0], &carol.address(), &utxos), &utxos);
        assert_eq!(
            result,
            Err(MempoolError::ConflictsWithPool(owned[0].outpoint()))
        );
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_invalid_transaction_rejected() {
        let alice = KeyPair::generate();
        let (utxos, owned) = funded(&alice, 1);
        let tx = pay(&alice, &owned[0], &alice.address(), &utxos);

        let mut mempool = Mempool::new();
        let result = mempool.admit(tx, &UtxoSet::new());
        assert!(matches!(
            result,
            Err(MempoolError::InvalidTransaction(TransactionError::UtxoNotFound(_)))
        ));
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_reconcile_drops_spent_transactions_whole() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let (utxos, owned) = funded(&alice, 2);

        // One transaction spending both outputs, one spending only the second
        let both = TransactionBuilder::new()
            .add_input(&owned[0])
            .add_input(&owned[1])
            .add_output(&bob.address(), 100)
            .build_and_sign(&alice, &utxos)
            .unwrap();

        let mut mempool = Mempool::new();
        mempool.admit(both, &utxos).unwrap();

        // The first output gets confirmed elsewhere
        let confirmed = pay(&alice, &owned[0], &alice.address(), &utxos);
        let after = utxos.apply_transactions(&[confirmed]);

        mempool.reconcile(&after);
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_reconcile_keeps_still_valid_transactions() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let (utxos, owned) = funded(&alice, 1);

        let mut mempool = Mempool::new();
        mempool
            .admit(pay(&alice, &owned[0], &bob.address(), &utxos), &utxos)
            .unwrap();

        mempool.reconcile(&utxos);
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let (utxos, owned) = funded(&alice, 1);

        let mut mempool = Mempool::new();
        mempool
            .admit(pay(&alice, &owned[0], &bob.address(), &utxos), &utxos)
            .unwrap();

        let mut snapshot = mempool.snapshot();
        snapshot.clear();
        assert_eq!(mempool.len(), 1);
    }
}
