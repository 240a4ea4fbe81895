//! Deposit transactions whose coins were returned from a side chain.

use super::presence::{add_hashes, contains_hash, remove_hashes};
use super::Indexer;
use crate::block::Block;
use crate::constants::buckets::RETURN_DEPOSIT_INDEX;
use crate::error::LedgerResult;
use crate::storage::DbTransaction;
use crate::types::{Hash256, TxType};

pub fn fetch_return_deposit_index_entry(
    db_tx: &DbTransaction,
    hash: &Hash256,
) -> LedgerResult<bool> {
    contains_hash(db_tx, RETURN_DEPOSIT_INDEX, hash)
}

fn deposit_hashes(block: &Block) -> impl Iterator<Item = &Hash256> {
    block
        .transactions
        .iter()
        .filter(|tx| tx.tx_type == TxType::ReturnSideChainDepositCoin)
        .flat_map(|tx| tx.outputs.iter())
        .filter_map(|output| output.deposit_transaction_hash())
}

#[derive(Debug, Default)]
pub struct ReturnDepositIndex;

impl ReturnDepositIndex {
    pub fn new() -> Self {
        Self
    }
}

impl Indexer for ReturnDepositIndex {
    fn key(&self) -> &'static [u8] {
        RETURN_DEPOSIT_INDEX
    }

    fn name(&self) -> &'static str {
        "return deposit index"
    }

    fn connect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        let added = add_hashes(db_tx, RETURN_DEPOSIT_INDEX, deposit_hashes(block))?;
        if added > 0 {
            tracing::debug!(height = block.height(), added, "return deposit index connected block");
        }
        Ok(())
    }

    fn disconnect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        let removed = remove_hashes(db_tx, RETURN_DEPOSIT_INDEX, deposit_hashes(block))?;
        if removed > 0 {
            tracing::debug!(
                height = block.height(),
                removed,
                "return deposit index disconnected block"
            );
        }
        Ok(())
    }
}
