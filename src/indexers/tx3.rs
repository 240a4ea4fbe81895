//! Side-chain transaction hashes already withdrawn to the main chain.

use super::presence::{add_hashes, contains_hash, remove_hashes};
use super::Indexer;
use crate::block::Block;
use crate::constants::buckets::TX3_INDEX;
use crate::error::LedgerResult;
use crate::storage::DbTransaction;
use crate::types::{Hash256, WithdrawFromSideChain};

pub fn fetch_tx3_index_entry(db_tx: &DbTransaction, hash: &Hash256) -> LedgerResult<bool> {
    contains_hash(db_tx, TX3_INDEX, hash)
}

fn withdrawals(block: &Block) -> impl Iterator<Item = &WithdrawFromSideChain> {
    block
        .transactions
        .iter()
        .filter_map(|tx| tx.withdraw_payload())
}

#[derive(Debug, Default)]
pub struct Tx3Index;

impl Tx3Index {
    pub fn new() -> Self {
        Self
    }
}

impl Indexer for Tx3Index {
    fn key(&self) -> &'static [u8] {
        TX3_INDEX
    }

    fn name(&self) -> &'static str {
        "tx3 index"
    }

    fn connect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        let hashes = withdrawals(block).flat_map(|w| w.side_chain_transaction_hashes.iter());
        let added = add_hashes(db_tx, TX3_INDEX, hashes)?;
        if added > 0 {
            tracing::debug!(height = block.height(), added, "tx3 index connected block");
        }
        Ok(())
    }

    fn disconnect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        let hashes = withdrawals(block).flat_map(|w| w.side_chain_transaction_hashes.iter());
        let removed = remove_hashes(db_tx, TX3_INDEX, hashes)?;
        if removed > 0 {
            tracing::debug!(height = block.height(), removed, "tx3 index disconnected block");
        }
        Ok(())
    }
}
