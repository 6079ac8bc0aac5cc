//! ECDSA key management for the ledger
//!
//! Provides key pair generation, signing, and verification using
//! the secp256k1 elliptic curve. An address is the hex encoding of the
//! uncompressed public key (65 bytes, `04` prefix, 130 hex characters).

use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

/// Length of a hex-encoded uncompressed public key
pub const ADDRESS_LENGTH: usize = 130;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Message must be a 32-byte digest")]
    InvalidDigest,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key.trim()).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// The ledger address owned by this key
    pub fn address(&self) -> String {
        hex::encode(self.public_key.serialize_uncompressed())
    }

    /// Sign a 32-byte digest, returning the DER-encoded signature
    pub fn sign(&self, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        let secp = Secp256k1::new();
        let message = digest_message(digest)?;
        let signature = secp.sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_der().to_vec())
    }
}

fn digest_message(digest: &[u8]) -> Result<Message, KeyError> {
    if digest.len() != 32 {
        return Err(KeyError::InvalidDigest);
    }
    Ok(Message::from_digest_slice(digest)?)
}

/// Check the textual shape of an address: 130 lowercase hex characters
/// starting with `04`.
///
/// Ownership is decided by comparing address strings, so only the form
/// produced by [`KeyPair::address`] is accepted.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LENGTH
        && address.starts_with("04")
        && address
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Parse a public key from an address
pub fn public_key_from_address(address: &str) -> Result<PublicKey, KeyError> {
    if !is_valid_address(address) {
        return Err(KeyError::InvalidPublicKey);
    }
    let bytes = hex::decode(address).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Verify a DER signature over a 32-byte digest against an address.
///
/// High-S signatures are normalized first so that signatures produced by
/// other secp256k1 implementations verify as well.
pub fn verify_signature(
    address: &str,
    digest: &[u8],
    signature_der: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::verification_only();
    let public_key = public_key_from_address(address)?;
    let message = digest_message(digest)?;
    let mut signature =
        Signature::from_der(signature_der).map_err(|_| KeyError::InvalidSignature)?;
    signature.normalize_s();

    Ok(secp.verify_ecdsa(&message, &signature, &public_key).is_ok())
}
