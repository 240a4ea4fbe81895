//! Index manager.
//!
//! Owns the indexes in their fixed connect order and keeps, per index, the
//! block it was last brought up to. A block is only connected on top of the
//! tip it extends and only disconnected when it is the tip.
//!
//! Transaction cache changes made while a block is applied are staged. The
//! `*_atomic` methods apply them once the storage transaction has committed.
//! Callers driving their own [`DbTransaction`] call
//! [`Manager::apply_cache_changes`] after a successful commit.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{
    fetch_return_deposit_index_entry, fetch_transaction, fetch_tx3_index_entry, fetch_unspents,
    fetch_utxo_index_entry, fetch_utxo_index_entry_by_height, is_unspent, Indexer,
    ReturnDepositIndex, Tx3Index, TxCache, TxIndex, UnspentIndex, UtxoIndex, UtxoRecord,
};
use crate::block::Block;
use crate::config::CacheConfig;
use crate::constants::buckets::INDEX_TIPS;
use crate::error::{LedgerError, LedgerResult};
use crate::lookup::TransactionLookup;
use crate::storage::{Database, DbTransaction};
use crate::types::{Hash256, OutPoint, ProgramHash, Transaction};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexTip {
    pub hash: Hash256,
    pub height: u32,
}

pub struct Manager {
    db: Database,
    indexes: Vec<Box<dyn Indexer>>,
    tx_cache: Arc<TxCache>,
}

impl Manager {
    pub fn new(db: Database, config: &CacheConfig) -> Self {
        let tx_cache = Arc::new(TxCache::new(config.tx_cache_volume));
        let indexes: Vec<Box<dyn Indexer>> = vec![
            Box::new(TxIndex::new()),
            Box::new(UnspentIndex::new(Arc::clone(&tx_cache))),
            Box::new(UtxoIndex::new()),
            Box::new(Tx3Index::new()),
            Box::new(ReturnDepositIndex::new()),
        ];
        Self {
            db,
            indexes,
            tx_cache,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn tx_cache(&self) -> &Arc<TxCache> {
        &self.tx_cache
    }

    /// Index names in connect order.
    pub fn index_names(&self) -> Vec<&'static str> {
        self.indexes.iter().map(|index| index.name()).collect()
    }

    /// Initialise every index and create any bucket that does not exist yet.
    /// Safe to call on every start.
    pub fn init(&self) -> LedgerResult<()> {
        for index in &self.indexes {
            index.init()?;
        }

        let created = self.db.update(|db_tx| {
            let mut created = Vec::new();
            if !db_tx.bucket_exists(INDEX_TIPS)? {
                db_tx.create_bucket(INDEX_TIPS)?;
            }
            for index in &self.indexes {
                if !db_tx.bucket_exists(index.key())? {
                    index.create(db_tx)?;
                    created.push(index.name());
                }
            }
            Ok(created)
        })?;

        for name in &created {
            tracing::info!(index = name, "created index bucket");
        }
        tracing::info!(indexes = self.indexes.len(), "index manager initialised");
        Ok(())
    }

    pub fn index_tip(&self, key: &[u8]) -> LedgerResult<Option<IndexTip>> {
        self.db.view(|db_tx| db_tx.get_value(INDEX_TIPS, key))
    }

    /// Connect `block` on every index, in order, inside the caller's transaction.
    /// On error the staged cache changes are dropped and the caller must drop
    /// the transaction.
    pub fn connect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        let result = self.connect_indexes(db_tx, block);
        if result.is_err() {
            self.tx_cache.discard_staged();
        }
        result
    }

    /// Disconnect `block` from every index, in reverse order.
    pub fn disconnect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        let result = self.disconnect_indexes(db_tx, block);
        if result.is_err() {
            self.tx_cache.discard_staged();
        }
        result
    }

    fn connect_indexes(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        let hash = block.hash();
        for index in &self.indexes {
            let tip: Option<IndexTip> = db_tx.get_value(INDEX_TIPS, index.key())?;
            if let Some(tip) = tip {
                if tip.hash != block.header.previous_hash {
                    tracing::warn!(
                        index = index.name(),
                        tip_height = tip.height,
                        height = block.height(),
                        "block does not extend index tip"
                    );
                    return Err(LedgerError::Inconsistent(format!(
                        "{} tip {} is not the parent of block {}",
                        index.name(),
                        hex::encode(tip.hash),
                        hex::encode(hash)
                    )));
                }
            }

            index.connect_block(db_tx, block)?;
            let tip = IndexTip {
                hash,
                height: block.height(),
            };
            db_tx.put_value(INDEX_TIPS, index.key(), &tip)?;
        }
        tracing::debug!(height = block.height(), "connected block to indexes");
        Ok(())
    }

    fn disconnect_indexes(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        let hash = block.hash();
        for index in self.indexes.iter().rev() {
            let tip: Option<IndexTip> = db_tx.get_value(INDEX_TIPS, index.key())?;
            match tip {
                Some(tip) if tip.hash == hash => {}
                _ => {
                    return Err(LedgerError::Inconsistent(format!(
                        "block {} is not the {} tip",
                        hex::encode(hash),
                        index.name()
                    )));
                }
            }

            index.disconnect_block(db_tx, block)?;
            if block.height() == 0 {
                db_tx.delete(INDEX_TIPS, index.key())?;
            } else {
                let tip = IndexTip {
                    hash: block.header.previous_hash,
                    height: block.height() - 1,
                };
                db_tx.put_value(INDEX_TIPS, index.key(), &tip)?;
            }
        }
        tracing::debug!(height = block.height(), "disconnected block from indexes");
        Ok(())
    }

    /// Connect `block` in its own transaction; nothing is written or cached on error.
    pub fn connect_block_atomic(&self, block: &Block) -> LedgerResult<()> {
        let result = self.db.update(|db_tx| self.connect_block(db_tx, block));
        self.finish_cache_changes(result)
    }

    pub fn disconnect_block_atomic(&self, block: &Block) -> LedgerResult<()> {
        let result = self.db.update(|db_tx| self.disconnect_block(db_tx, block));
        self.finish_cache_changes(result)
    }

    /// Make the cache changes of a committed block visible.
    pub fn apply_cache_changes(&self) {
        let applied = self.tx_cache.apply_staged();
        tracing::trace!(applied, "applied tx cache changes");
    }

    /// Drop the cache changes of a block whose transaction was not committed.
    pub fn discard_cache_changes(&self) {
        let discarded = self.tx_cache.discard_staged();
        if discarded > 0 {
            tracing::debug!(discarded, "discarded tx cache changes");
        }
    }

    fn finish_cache_changes(&self, result: LedgerResult<()>) -> LedgerResult<()> {
        match result {
            Ok(()) => {
                self.apply_cache_changes();
                Ok(())
            }
            Err(e) => {
                self.discard_cache_changes();
                Err(e)
            }
        }
    }

    pub fn fetch_unspents(&self, hash: &Hash256) -> LedgerResult<Vec<u16>> {
        self.db.view(|db_tx| fetch_unspents(db_tx, hash))
    }

    pub fn is_unspent(&self, outpoint: &OutPoint) -> LedgerResult<bool> {
        self.db.view(|db_tx| is_unspent(db_tx, outpoint))
    }

    pub fn fetch_utxo_index_entry(&self, address: &ProgramHash) -> LedgerResult<Vec<UtxoRecord>> {
        self.db.view(|db_tx| fetch_utxo_index_entry(db_tx, address))
    }

    pub fn fetch_utxo_index_entry_by_height(
        &self,
        address: &ProgramHash,
        height: u32,
    ) -> LedgerResult<Vec<UtxoRecord>> {
        self.db
            .view(|db_tx| fetch_utxo_index_entry_by_height(db_tx, address, height))
    }

    pub fn fetch_tx3_index_entry(&self, hash: &Hash256) -> LedgerResult<bool> {
        self.db.view(|db_tx| fetch_tx3_index_entry(db_tx, hash))
    }

    pub fn fetch_return_deposit_index_entry(&self, hash: &Hash256) -> LedgerResult<bool> {
        self.db
            .view(|db_tx| fetch_return_deposit_index_entry(db_tx, hash))
    }
}

impl TransactionLookup for Manager {
    fn get_transaction(&self, hash: &Hash256) -> LedgerResult<(Arc<Transaction>, u32)> {
        if let Some(entry) = self.tx_cache.get(hash) {
            return Ok((entry.tx, entry.height));
        }
        let (tx, height) = self.db.view(|db_tx| fetch_transaction(db_tx, hash))?;
        Ok((Arc::new(tx), height))
    }
}
