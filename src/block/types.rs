//! Block types consumed by the indexers.

use crate::types::{Hash256, Transaction};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub version: u32,
    pub previous_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Build a block at `height` on top of `previous_hash`, filling in the merkle root.
    pub fn new(height: u32, previous_hash: Hash256, transactions: Vec<Transaction>) -> Self {
        let merkle_root = calculate_merkle_root(&transactions);
        Self {
            header: BlockHeader {
                version: 0,
                previous_hash,
                merkle_root,
                timestamp: 0,
                height,
            },
            transactions,
        }
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn hash(&self) -> Hash256 {
        let bytes =
            bincode::serialize(&self.header).expect("BlockHeader serialization must not fail");
        Sha256::digest(Sha256::digest(bytes)).into()
    }
}

/// Merkle root over transaction hashes in block order.
pub fn calculate_merkle_root(transactions: &[Transaction]) -> Hash256 {
    if transactions.is_empty() {
        return [0u8; 32];
    }

    let mut hashes: Vec<Hash256> = transactions.iter().map(Transaction::hash).collect();

    while hashes.len() > 1 {
        let mut next_level = Vec::with_capacity(hashes.len().div_ceil(2));
        for chunk in hashes.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(chunk[0]);
            // Odd level: pair the last hash with itself
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next_level.push(Sha256::digest(hasher.finalize()).into());
        }
        hashes = next_level;
    }

    hashes[0]
}
