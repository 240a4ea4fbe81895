//! Short-lived cache of transactions that still have unspent outputs.
//!
//! Bounded by a volume; once full, the entries recorded at the lowest height
//! are trimmed first (hash order breaks ties).
//!
//! Indexes running inside a storage transaction only stage their changes.
//! Staged changes become visible through [`TxCache::apply_staged`] once the
//! transaction has committed, or are dropped with [`TxCache::discard_staged`].

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::types::{Hash256, Transaction};

#[derive(Debug, Clone)]
pub struct TxCacheEntry {
    pub tx: Arc<Transaction>,
    pub height: u32,
}

enum StagedChange {
    Insert(Hash256, TxCacheEntry),
    Remove(Hash256),
}

struct TxCacheInner {
    entries: HashMap<Hash256, TxCacheEntry>,
    by_height: BTreeSet<(u32, Hash256)>,
    staged: Vec<StagedChange>,
}

impl TxCacheInner {
    fn insert(&mut self, hash: Hash256, entry: TxCacheEntry, volume: usize) {
        let height = entry.height;
        if let Some(previous) = self.entries.insert(hash, entry) {
            self.by_height.remove(&(previous.height, hash));
        }
        self.by_height.insert((height, hash));

        while self.entries.len() > volume {
            let Some(oldest) = self.by_height.pop_first() else {
                break;
            };
            self.entries.remove(&oldest.1);
        }
    }

    fn remove(&mut self, hash: &Hash256) -> Option<TxCacheEntry> {
        let entry = self.entries.remove(hash)?;
        self.by_height.remove(&(entry.height, *hash));
        Some(entry)
    }
}

pub struct TxCache {
    inner: Mutex<TxCacheInner>,
    volume: usize,
}

impl TxCache {
    pub fn new(volume: usize) -> Self {
        Self {
            inner: Mutex::new(TxCacheInner {
                entries: HashMap::new(),
                by_height: BTreeSet::new(),
                staged: Vec::new(),
            }),
            volume: volume.max(1),
        }
    }

    pub fn get(&self, hash: &Hash256) -> Option<TxCacheEntry> {
        self.inner.lock().entries.get(hash).cloned()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.inner.lock().entries.contains_key(hash)
    }

    pub fn insert(&self, hash: Hash256, tx: Arc<Transaction>, height: u32) {
        self.inner
            .lock()
            .insert(hash, TxCacheEntry { tx, height }, self.volume);
    }

    pub fn remove(&self, hash: &Hash256) -> Option<TxCacheEntry> {
        self.inner.lock().remove(hash)
    }

    pub fn stage_insert(&self, hash: Hash256, tx: Arc<Transaction>, height: u32) {
        self.inner
            .lock()
            .staged
            .push(StagedChange::Insert(hash, TxCacheEntry { tx, height }));
    }

    pub fn stage_remove(&self, hash: Hash256) {
        self.inner.lock().staged.push(StagedChange::Remove(hash));
    }

    /// Apply staged changes in the order they were staged.
    pub fn apply_staged(&self) -> usize {
        let mut inner = self.inner.lock();
        let staged = std::mem::take(&mut inner.staged);
        let applied = staged.len();
        for change in staged {
            match change {
                StagedChange::Insert(hash, entry) => inner.insert(hash, entry, self.volume),
                StagedChange::Remove(hash) => {
                    inner.remove(&hash);
                }
            }
        }
        applied
    }

    pub fn discard_staged(&self) -> usize {
        let mut inner = self.inner.lock();
        let discarded = inner.staged.len();
        inner.staged.clear();
        discarded
    }

    pub fn staged_len(&self) -> usize {
        self.inner.lock().staged.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.by_height.clear();
        inner.staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexers::test_helpers::*;

    #[test]
    fn test_insert_and_remove() {
        let cache = TxCache::new(10);
        let tx = coinbase(1, &[(5, addr(1))]);
        let hash = tx.hash();

        cache.insert(hash, Arc::new(tx), 1);
        assert_eq!(cache.get(&hash).unwrap().height, 1);
        assert!(cache.remove(&hash).is_some());
        assert!(cache.is_empty());
        assert!(cache.remove(&hash).is_none());
    }

    #[test]
    fn test_trims_lowest_height_first() {
        let cache = TxCache::new(2);
        let txs: Vec<Transaction> = (0..3).map(|h| coinbase(h, &[(5, addr(1))])).collect();

        cache.insert(txs[2].hash(), Arc::new(txs[2].clone()), 7);
        cache.insert(txs[0].hash(), Arc::new(txs[0].clone()), 3);
        cache.insert(txs[1].hash(), Arc::new(txs[1].clone()), 5);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&txs[0].hash()));
        assert!(cache.contains(&txs[1].hash()));
        assert!(cache.contains(&txs[2].hash()));
    }

    #[test]
    fn test_reinsert_updates_height() {
        let cache = TxCache::new(2);
        let a = coinbase(1, &[(5, addr(1))]);
        let b = coinbase(2, &[(5, addr(1))]);
        let c = coinbase(3, &[(5, addr(1))]);

        cache.insert(a.hash(), Arc::new(a.clone()), 1);
        cache.insert(b.hash(), Arc::new(b.clone()), 2);
        cache.insert(a.hash(), Arc::new(a.clone()), 9);
        cache.insert(c.hash(), Arc::new(c.clone()), 3);

        assert!(cache.contains(&a.hash()));
        assert!(!cache.contains(&b.hash()));
        assert!(cache.contains(&c.hash()));
    }

    #[test]
    fn test_staged_changes_hidden_until_applied() {
        let cache = TxCache::new(10);
        let a = coinbase(1, &[(5, addr(1))]);
        let b = coinbase(2, &[(5, addr(1))]);
        cache.insert(a.hash(), Arc::new(a.clone()), 1);

        cache.stage_insert(b.hash(), Arc::new(b.clone()), 2);
        cache.stage_remove(a.hash());
        assert!(cache.contains(&a.hash()));
        assert!(!cache.contains(&b.hash()));

        assert_eq!(cache.apply_staged(), 2);
        assert!(!cache.contains(&a.hash()));
        assert!(cache.contains(&b.hash()));
        assert_eq!(cache.staged_len(), 0);
    }

    #[test]
    fn test_discarded_changes_never_apply() {
        let cache = TxCache::new(10);
        let a = coinbase(1, &[(5, addr(1))]);
        cache.stage_insert(a.hash(), Arc::new(a.clone()), 1);

        assert_eq!(cache.discard_staged(), 1);
        assert_eq!(cache.apply_staged(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_staged_order_is_kept() {
        let cache = TxCache::new(10);
        let a = coinbase(1, &[(5, addr(1))]);
        cache.stage_insert(a.hash(), Arc::new(a.clone()), 1);
        cache.stage_remove(a.hash());
        cache.apply_staged();
        assert!(!cache.contains(&a.hash()));
    }
}
