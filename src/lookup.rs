//! Transaction lookup collaborator used to resolve previous outputs.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{Hash256, Transaction};

pub trait TransactionLookup: Send + Sync {
    /// The transaction and the height it was recorded at, or `NotFound`.
    fn get_transaction(&self, hash: &Hash256) -> LedgerResult<(Arc<Transaction>, u32)>;
}

impl<T: TransactionLookup + ?Sized> TransactionLookup for Arc<T> {
    fn get_transaction(&self, hash: &Hash256) -> LedgerResult<(Arc<Transaction>, u32)> {
        self.as_ref().get_transaction(hash)
    }
}

/// Map-backed lookup, for tests and for callers that stage transactions themselves.
#[derive(Default)]
pub struct MemoryTxLookup {
    transactions: RwLock<HashMap<Hash256, (Arc<Transaction>, u32)>>,
}

impl MemoryTxLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tx: Transaction, height: u32) -> Hash256 {
        let hash = tx.hash();
        self.transactions
            .write()
            .insert(hash, (Arc::new(tx), height));
        hash
    }

    pub fn remove(&self, hash: &Hash256) -> Option<(Arc<Transaction>, u32)> {
        self.transactions.write().remove(hash)
    }

    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }
}

impl TransactionLookup for MemoryTxLookup {
    fn get_transaction(&self, hash: &Hash256) -> LedgerResult<(Arc<Transaction>, u32)> {
        self.transactions
            .read()
            .get(hash)
            .map(|(tx, height)| (Arc::clone(tx), *height))
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", hex::encode(hash))))
    }
}
