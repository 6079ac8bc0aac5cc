//! Wallet implementation for the node
//!
//! Holds the node's signing key and turns "pay X coins to Y" into a signed
//! transaction spending the node's own outputs.

use crate::core::{Transaction, TransactionBuilder, TransactionError, UnspentTxOut, UtxoSet};
use crate::crypto::{is_valid_address, KeyError, KeyPair};
use log::info;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Amount must be greater than zero")]
    InvalidAmount,
    #[error("Invalid recipient address: {0}")]
    InvalidAddress(String),
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

/// The node's wallet: a single key pair
#[derive(Clone)]
pub struct Wallet {
    key_pair: KeyPair,
}

impl Wallet {
    /// Create a new wallet with a fresh key pair
    pub fn generate() -> Self {
        Self {
            key_pair: KeyPair::generate(),
        }
    }

    /// Import a wallet from a private key
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        let key_pair = KeyPair::from_private_key_hex(private_key_hex)?;
        Ok(Self { key_pair })
    }

    /// Load the key stored at `path`, generating and storing one if the file
    /// does not exist yet
    pub fn load_or_create(path: &Path) -> Result<Self, WalletError> {
        if path.exists() {
            return Self::load(path);
        }

        let wallet = Self::generate();
        wallet.save(path)?;
        info!("Created new wallet key at {}", path.display());
        Ok(wallet)
    }

    /// Save the private key as hex
    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.private_key())?;
        Ok(())
    }

    /// Load a private key saved by [`Wallet::save`]
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let hex_key = fs::read_to_string(path)?;
        Self::from_private_key(&hex_key)
    }

    /// Get the wallet's address
    pub fn address(&self) -> String {
        self.key_pair.address()
    }

    /// Get the wallet's private key (hex)
    /// WARNING: Keep this secret!
    pub fn private_key(&self) -> String {
        self.key_pair.private_key_hex()
    }

    /// Confirmed balance held by this wallet
    pub fn balance(&self, utxos: &UtxoSet) -> u64 {
        utxos.balance(&self.address())
    }

    /// Own outputs that no pending transaction already spends
    pub fn spendable_utxos(&self, utxos: &UtxoSet, pool: &[Transaction]) -> Vec<UnspentTxOut> {
        let pending: HashSet<_> = pool.iter().flat_map(Transaction::outpoints).collect();
        utxos
            .owned_by(&self.address())
            .into_iter()
            .filter(|utxo| !pending.contains(&utxo.outpoint()))
            .collect()
    }

    /// Create a transaction to send funds
    pub fn create_transaction(
        &self,
        recipient: &str,
        amount: u64,
        utxos: &UtxoSet,
        pool: &[Transaction],
    ) -> Result<Transaction, WalletError> {
        if amount == 0 {
            return Err(WalletError::InvalidAmount);
        }
        if !is_valid_address(recipient) {
            return Err(WalletError::InvalidAddress(recipient.to_string()));
        }

        // Select UTXOs to cover the amount
        let mut selected_utxos = Vec::new();
        let mut selected_amount = 0u64;

        for utxo in self.spendable_utxos(utxos, pool) {
            selected_amount = selected_amount.saturating_add(utxo.amount);
            selected_utxos.push(utxo);

            if selected_amount >= amount {
                break;
            }
        }

        if selected_amount < amount {
            return Err(WalletError::InsufficientFunds {
                have: selected_amount,
                need: amount,
            });
        }

        // Build transaction
        let mut builder = TransactionBuilder::new();

        for utxo in &selected_utxos {
            builder = builder.add_input(utxo);
        }

        // Output to recipient
        builder = builder.add_output(recipient, amount);

        // Change back to self
        let change = selected_amount - amount;
        if change > 0 {
            builder = builder.add_output(&self.address(), change);
        }

        // Build and sign
        let tx = builder.build_and_sign(&self.key_pair, utxos)?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{validate_transaction, COINBASE_AMOUNT};

    fn funded(wallet: &Wallet, blocks: u64) -> UtxoSet {
        let coinbases: Vec<_> = (1..=blocks)
            .map(|index| Transaction::coinbase(&wallet.address(), index))
            .collect();
        UtxoSet::new().apply_transactions(&coinbases)
    }

    #[test]
    fn test_wallet_creation() {
        let wallet = Wallet::generate();
        assert!(is_valid_address(&wallet.address()));
        assert_eq!(wallet.private_key().len(), 64);
    }

    #[test]
    fn test_wallet_import() {
        let wallet1 = Wallet::generate();
        let private_key = wallet1.private_key();

        let wallet2 = Wallet::from_private_key(&private_key).unwrap();
        assert_eq!(wallet1.address(), wallet2.address());
    }

    #[test]
    fn test_load_or_create_persists_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("wallet").join("privateKey");

        let wallet1 = Wallet::load_or_create(&path).unwrap();
        assert!(path.exists());

        let wallet2 = Wallet::load_or_create(&path).unwrap();
        assert_eq!(wallet1.address(), wallet2.address());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("privateKey");
        fs::write(&path, "not a key").unwrap();

        assert!(matches!(
            Wallet::load(&path),
            Err(WalletError::CryptoError(_))
        ));
    }

    #[test]
    fn test_transaction_with_change() {
        let wallet = Wallet::generate();
        let recipient = Wallet::generate().address();
        let utxos = funded(&wallet, 2);
        assert_eq!(wallet.balance(&utxos), 2 * COINBASE_AMOUNT);

        let tx = wallet
            .create_transaction(&recipient, 70, &utxos, &[])
            .unwrap();

        assert_eq!(tx.tx_ins.len(), 2);
        assert_eq!(tx.tx_outs.len(), 2);
        assert_eq!(tx.tx_outs[0].address, recipient);
        assert_eq!(tx.tx_outs[0].amount, 70);
        assert_eq!(tx.tx_outs[1].address, wallet.address());
        assert_eq!(tx.tx_outs[1].amount, 30);
        assert!(validate_transaction(&tx, &utxos).is_ok());
    }

    #[test]
    fn test_exact_amount_has_no_change() {
        let wallet = Wallet::generate();
        let recipient = Wallet::generate().address();
        let utxos = funded(&wallet, 1);

        let tx = wallet
            .create_transaction(&recipient, COINBASE_AMOUNT, &utxos, &[])
            .unwrap();
        assert_eq!(tx.tx_outs.len(), 1);
    }

    #[test]
    fn test_insufficient_funds() {
        let wallet = Wallet::generate();
        let recipient = Wallet::generate().address();
        let utxos = funded(&wallet, 1);

        let result = wallet.create_transaction(&recipient, 51, &utxos, &[]);
        assert!(matches!(
            result,
            Err(WalletError::InsufficientFunds { have: 50, need: 51 })
        ));
    }

    #[test]
    fn test_pending_spends_are_skipped() {
        let wallet = Wallet::generate();
        let recipient = Wallet::generate().address();
        let utxos = funded(&wallet, 2);

        let first = wallet
            .create_transaction(&recipient, 40, &utxos, &[])
            .unwrap();
        let second = wallet
            .create_transaction(&recipient, 40, &utxos, &[first.clone()])
            .unwrap();
        assert_ne!(first.tx_ins[0].outpoint(), second.tx_ins[0].outpoint());

        let third = wallet.create_transaction(&recipient, 40, &utxos, &[first, second]);
        assert!(matches!(
            third,
            Err(WalletError::InsufficientFunds { have: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_zero_amount_and_bad_address() {
        let wallet = Wallet::generate();
        let utxos = funded(&wallet, 1);

        assert!(matches!(
            wallet.create_transaction(&wallet.address(), 0, &utxos, &[]),
            Err(WalletError::InvalidAmount)
        ));
        assert!(matches!(
            wallet.create_transaction("nobody", 10, &utxos, &[]),
            Err(WalletError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_rejects_uppercase_recipient() {
        let wallet = Wallet::generate();
        let recipient = Wallet::generate().address().to_uppercase();
        let utxos = funded(&wallet, 1);

        assert!(matches!(
            wallet.create_transaction(&recipient, 20, &utxos, &[]),
            Err(WalletError::InvalidAddress(_))
        ));
    }
}
