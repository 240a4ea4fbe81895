//! Transaction index for hash lookups.
//! Maps transaction hash -> (block height, position in block, transaction).

use serde::{Deserialize, Serialize};

use super::Indexer;
use crate::block::Block;
use crate::constants::buckets::TX_INDEX;
use crate::error::{LedgerError, LedgerResult};
use crate::storage::DbTransaction;
use crate::types::{Hash256, Transaction};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxIndexEntry {
    pub block_height: u32,
    pub position: u32,
    pub tx: Transaction,
}

/// Fetch the stored entry for `hash`, if any.
pub fn fetch_tx_entry(db_tx: &DbTransaction, hash: &Hash256) -> LedgerResult<Option<TxIndexEntry>> {
    db_tx.get_value(TX_INDEX, hash)
}

/// Fetch a transaction and its height, failing with `NotFound` when unknown.
pub fn fetch_transaction(db_tx: &DbTransaction, hash: &Hash256) -> LedgerResult<(Transaction, u32)> {
    fetch_tx_entry(db_tx, hash)?
        .map(|entry| (entry.tx, entry.block_height))
        .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", hex::encode(hash))))
}

#[derive(Debug, Default)]
pub struct TxIndex;

impl TxIndex {
    pub fn new() -> Self {
        Self
    }
}

impl Indexer for TxIndex {
    fn key(&self) -> &'static [u8] {
        TX_INDEX
    }

    fn name(&self) -> &'static str {
        "transaction index"
    }

    fn connect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        for (position, tx) in block.transactions.iter().enumerate() {
            let hash = tx.hash();
            if db_tx.contains(TX_INDEX, &hash)? {
                return Err(LedgerError::Inconsistent(format!(
                    "transaction {} already indexed",
                    hex::encode(hash)
                )));
            }
            let entry = TxIndexEntry {
                block_height: block.height(),
                position: position as u32,
                tx: tx.clone(),
            };
            db_tx.put_value(TX_INDEX, &hash, &entry)?;
        }
        tracing::debug!(
            height = block.height(),
            txs = block.transactions.len(),
            "tx index connected block"
        );
        Ok(())
    }

    fn disconnect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        for tx in block.transactions.iter().rev() {
            let hash = tx.hash();
            if !db_tx.contains(TX_INDEX, &hash)? {
                return Err(LedgerError::NotFound(format!(
                    "transaction {} not in tx index",
                    hex::encode(hash)
                )));
            }
            db_tx.delete(TX_INDEX, &hash)?;
        }
        tracing::debug!(height = block.height(), "tx index disconnected block");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexers::test_helpers::*;
    use crate::storage::Database;

    #[test]
    fn test_connect_records_height_and_position() {
        let db = Database::in_memory();
        let index = TxIndex::new();
        db.update(|tx| index.create(tx)).unwrap();

        let cb = coinbase(3, &[(50, addr(1))]);
        let transfer = transfer_tx(&[(cb.hash(), 0)], &[(20, addr(2))]);
        let block = block_at(3, vec![cb.clone(), transfer.clone()]);
        db.update(|tx| index.connect_block(tx, &block)).unwrap();

        let entry = db
            .view(|tx| fetch_tx_entry(tx, &transfer.hash()))
            .unwrap()
            .unwrap();
        assert_eq!(entry.block_height, 3);
        assert_eq!(entry.position, 1);
        assert_eq!(entry.tx, transfer);
    }

    #[test]
    fn test_disconnect_removes_entries() {
        let db = Database::in_memory();
        let index = TxIndex::new();
        db.update(|tx| index.create(tx)).unwrap();

        let cb = coinbase(1, &[(50, addr(1))]);
        let block = block_at(1, vec![cb.clone()]);
        db.update(|tx| index.connect_block(tx, &block)).unwrap();
        db.update(|tx| index.disconnect_block(tx, &block)).unwrap();

        let err = db.view(|tx| fetch_transaction(tx, &cb.hash())).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_duplicate_transaction_rejected() {
        let db = Database::in_memory();
        let index = TxIndex::new();
        db.update(|tx| index.create(tx)).unwrap();

        let block = block_at(1, vec![coinbase(1, &[(50, addr(1))])]);
        db.update(|tx| index.connect_block(tx, &block)).unwrap();
        let err = db
            .update(|tx| index.connect_block(tx, &block))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Inconsistent(_)));
    }
}
