//! Cryptographic hashing utilities for the ledger
//!
//! Block hashes and transaction ids are single SHA-256 digests rendered as
//! lowercase hex.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Checks if a hash has at least `difficulty` leading zero bits
pub fn meets_difficulty(hash: &[u8], difficulty: u32) -> bool {
    let required_zeros = difficulty as usize / 8;
    let remaining_bits = difficulty as usize % 8;

    // A target longer than the digest can never be met
    if required_zeros + usize::from(remaining_bits > 0) > hash.len() {
        return false;
    }

    // Check full zero bytes
    for byte in hash.iter().take(required_zeros) {
        if *byte != 0 {
            return false;
        }
    }

    // Check remaining bits
    if remaining_bits > 0 {
        let mask = 0xFFu8 << (8 - remaining_bits);
        if hash[required_zeros] & mask != 0 {
            return false;
        }
    }

    true
}

/// Same check against a hex-encoded digest. Malformed hex never qualifies.
pub fn hex_meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    match hex::decode(hash_hex) {
        Ok(bytes) => meets_difficulty(&bytes, difficulty),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(
            sha256_hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_meets_difficulty() {
        let hash = vec![0x00, 0x00, 0x0F, 0xFF, 0xFF, 0xFF];
        assert!(meets_difficulty(&hash, 16));
        assert!(meets_difficulty(&hash, 20));
        assert!(!meets_difficulty(&hash, 21));
        assert!(!meets_difficulty(&hash, 24));
    }

    #[test]
    fn test_difficulty_is_bit_granular() {
        // 0x1f = 0001_1111: three leading zero bits, not a whole zero nibble
        let hash = vec![0x1F, 0xFF];
        assert!(meets_difficulty(&hash, 3));
        assert!(!meets_difficulty(&hash, 4));
    }

    #[test]
    fn test_zero_difficulty_accepts_anything() {
        assert!(meets_difficulty(&[0xFF; 32], 0));
        assert!(hex_meets_difficulty(&"f".repeat(64), 0));
    }

    #[test]
    fn test_difficulty_beyond_digest_length() {
        assert!(!meets_difficulty(&[0u8; 32], 257));
        assert!(meets_difficulty(&[0u8; 32], 256));
    }

    #[test]
    fn test_hex_meets_difficulty_rejects_garbage() {
        assert!(!hex_meets_difficulty("not hex", 0));
        assert!(hex_meets_difficulty("00ff", 8));
    }
}
