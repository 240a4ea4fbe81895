//! Reversible block indexes.
//!
//! Every index derives its state from connected blocks and must be able to
//! undo a block exactly: for any state `S` and block `B`,
//! `disconnect(connect(S, B), B) == S`. All writes go through the caller's
//! [`DbTransaction`] so the whole set of indexes commits or rolls back
//! together.

use crate::block::Block;
use crate::error::LedgerResult;
use crate::storage::DbTransaction;

mod manager;
mod presence;
mod return_deposit;
mod tx3;
mod tx_cache;
mod tx_index;
mod unspent;
mod utxo;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use manager::{IndexTip, Manager};
pub use return_deposit::{fetch_return_deposit_index_entry, ReturnDepositIndex};
pub use tx3::{fetch_tx3_index_entry, Tx3Index};
pub use tx_cache::{TxCache, TxCacheEntry};
pub use tx_index::{fetch_tx_entry, fetch_transaction, TxIndex, TxIndexEntry};
pub use unspent::{fetch_unspents, is_unspent, UnspentIndex};
pub use utxo::{
    fetch_utxo_index_entry, fetch_utxo_index_entry_by_height, utxo_index_key, UtxoIndex,
    UtxoRecord,
};

pub trait Indexer: Send + Sync {
    /// Bucket the index stores its entries under.
    fn key(&self) -> &'static [u8];

    fn name(&self) -> &'static str;

    /// Process-level setup. Must be idempotent and must not touch storage.
    fn init(&self) -> LedgerResult<()> {
        Ok(())
    }

    /// Create the index bucket. Fails with `AlreadyExists` on a second call.
    fn create(&self, db_tx: &mut DbTransaction) -> LedgerResult<()> {
        db_tx.create_bucket(self.key())
    }

    fn connect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()>;

    fn disconnect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()>;
}
