//! Unspent output tracker.
//!
//! Stores, per transaction hash, the ascending list of output indices that no
//! connected block has spent yet. An entry whose list becomes empty is
//! deleted; disconnecting the spending block re-creates it.
//!
//! Transaction cache changes are staged on the shared [`TxCache`]; the owner
//! of the storage transaction applies them after commit.

use std::sync::Arc;

use super::{Indexer, TxCache};
use crate::block::Block;
use crate::constants::buckets::UNSPENT_INDEX;
use crate::error::{LedgerError, LedgerResult};
use crate::storage::DbTransaction;
use crate::types::{Hash256, OutPoint};

/// Unspent output indices of `hash`; empty when nothing is tracked.
pub fn fetch_unspents(db_tx: &DbTransaction, hash: &Hash256) -> LedgerResult<Vec<u16>> {
    Ok(db_tx
        .get_value::<Vec<u16>>(UNSPENT_INDEX, hash)?
        .unwrap_or_default())
}

pub fn is_unspent(db_tx: &DbTransaction, outpoint: &OutPoint) -> LedgerResult<bool> {
    Ok(fetch_unspents(db_tx, &outpoint.txid)?
        .binary_search(&outpoint.index)
        .is_ok())
}

pub struct UnspentIndex {
    tx_cache: Arc<TxCache>,
}

impl UnspentIndex {
    pub fn new(tx_cache: Arc<TxCache>) -> Self {
        Self { tx_cache }
    }

    pub fn tx_cache(&self) -> &Arc<TxCache> {
        &self.tx_cache
    }

    fn spend(&self, db_tx: &mut DbTransaction, outpoint: &OutPoint) -> LedgerResult<()> {
        let mut indices: Vec<u16> = db_tx
            .get_value(UNSPENT_INDEX, &outpoint.txid)?
            .ok_or_else(|| {
                LedgerError::NotFound(format!(
                    "unspent entry for {}",
                    hex::encode(outpoint.txid)
                ))
            })?;
        let position = indices
            .binary_search(&outpoint.index)
            .map_err(|_| LedgerError::NotFound(format!("unspent output {}", outpoint)))?;
        indices.remove(position);

        if indices.is_empty() {
            db_tx.delete(UNSPENT_INDEX, &outpoint.txid)?;
            self.tx_cache.stage_remove(outpoint.txid);
        } else {
            db_tx.put_value(UNSPENT_INDEX, &outpoint.txid, &indices)?;
        }
        Ok(())
    }

    fn unspend(&self, db_tx: &mut DbTransaction, outpoint: &OutPoint) -> LedgerResult<()> {
        let mut indices = fetch_unspents(db_tx, &outpoint.txid)?;
        match indices.binary_search(&outpoint.index) {
            Ok(_) => {
                return Err(LedgerError::Inconsistent(format!(
                    "output {} is already unspent",
                    outpoint
                )))
            }
            Err(position) => indices.insert(position, outpoint.index),
        }
        db_tx.put_value(UNSPENT_INDEX, &outpoint.txid, &indices)
    }
}

impl Indexer for UnspentIndex {
    fn key(&self) -> &'static [u8] {
        UNSPENT_INDEX
    }

    fn name(&self) -> &'static str {
        "unspent index"
    }

    fn connect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        // Inputs then outputs per transaction, so a later transaction can
        // spend an earlier one from the same block.
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    self.spend(db_tx, &input.previous)?;
                }
            }

            let hash = tx.hash();
            if !tx.outputs.is_empty() {
                if db_tx.contains(UNSPENT_INDEX, &hash)? {
                    return Err(LedgerError::Inconsistent(format!(
                        "unspent entry for {} already exists",
                        hex::encode(hash)
                    )));
                }
                db_tx.put_value(UNSPENT_INDEX, &hash, &tx.output_indices())?;
                self.tx_cache
                    .stage_insert(hash, Arc::new(tx.clone()), block.height());
            }
        }
        tracing::debug!(height = block.height(), "unspent index connected block");
        Ok(())
    }

    fn disconnect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        for tx in block.transactions.iter().rev() {
            let hash = tx.hash();
            if !tx.outputs.is_empty() {
                let indices: Vec<u16> =
                    db_tx.get_value(UNSPENT_INDEX, &hash)?.ok_or_else(|| {
                        LedgerError::NotFound(format!("unspent entry for {}", hex::encode(hash)))
                    })?;
                if indices != tx.output_indices() {
                    tracing::warn!(
                        tx = %hex::encode(hash),
                        "disconnecting transaction whose outputs are still spent"
                    );
                    return Err(LedgerError::Inconsistent(format!(
                        "outputs of {} are spent by a connected block",
                        hex::encode(hash)
                    )));
                }
                db_tx.delete(UNSPENT_INDEX, &hash)?;
            }
            self.tx_cache.stage_remove(hash);

            if !tx.is_coinbase() {
                for input in tx.inputs.iter().rev() {
                    self.unspend(db_tx, &input.previous)?;
                    self.tx_cache.stage_remove(input.previous.txid);
                }
            }
        }
        tracing::debug!(height = block.height(), "unspent index disconnected block");
        Ok(())
    }
}
