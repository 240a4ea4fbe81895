//! Input reference cache used during transaction validation.
//!
//! Resolves every input of a transaction to the output it spends. Resolved
//! references are kept in a bounded map with first-in-first-out eviction:
//! reads only peek, so the LRU order of the underlying cache is insertion
//! order. Transactions fetched from the lookup along the way are kept in a
//! companion map until [`UtxoCache::clean_tx_cache`].

use lru::LruCache;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::CacheConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::lookup::TransactionLookup;
use crate::types::{Hash256, OutPoint, Transaction, TxInput, TxOutput};

struct CacheState {
    references: LruCache<OutPoint, TxOutput>,
    transactions: HashMap<Hash256, (Arc<Transaction>, u32)>,
}

pub struct UtxoCache {
    lookup: Arc<dyn TransactionLookup>,
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl UtxoCache {
    pub fn new(lookup: Arc<dyn TransactionLookup>, max_reference_size: NonZeroUsize) -> Self {
        tracing::debug!(
            max_reference_size = max_reference_size.get(),
            "utxo reference cache initialized"
        );
        Self {
            lookup,
            state: RwLock::new(CacheState {
                references: LruCache::new(max_reference_size),
                transactions: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn with_config(
        lookup: Arc<dyn TransactionLookup>,
        config: &CacheConfig,
    ) -> LedgerResult<Self> {
        let size = NonZeroUsize::new(config.max_reference_size).ok_or_else(|| {
            LedgerError::Config("cache.max_reference_size must be greater than zero".to_string())
        })?;
        Ok(Self::new(lookup, size))
    }

    /// Record the output `input` spends. An existing reference is overwritten
    /// in place and keeps its eviction position.
    pub fn insert_reference(&self, input: &TxInput, output: TxOutput) {
        let mut state = self.state.write();
        self.insert_locked(&mut state, input.previous, output);
    }

    fn insert_locked(&self, state: &mut CacheState, key: OutPoint, output: TxOutput) {
        if let Some(existing) = state.references.peek_mut(&key) {
            *existing = output;
            return;
        }
        if let Some((evicted, _)) = state.references.push(key, output) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(reference = %evicted, "evicted oldest reference");
        }
    }

    /// Map every input of `tx` to the output it spends.
    pub fn get_tx_reference(&self, tx: &Transaction) -> LedgerResult<HashMap<TxInput, TxOutput>> {
        let mut resolved = HashMap::with_capacity(tx.inputs.len());
        let mut missing = Vec::new();
        {
            let state = self.state.read();
            for input in &tx.inputs {
                match state.references.peek(&input.previous) {
                    Some(output) => {
                        resolved.insert(*input, output.clone());
                    }
                    None => missing.push(*input),
                }
            }
        }
        self.hits
            .fetch_add(resolved.len() as u64, Ordering::Relaxed);
        if missing.is_empty() {
            return Ok(resolved);
        }
        self.misses
            .fetch_add(missing.len() as u64, Ordering::Relaxed);

        let mut fetched: HashMap<Hash256, (Arc<Transaction>, u32)> = HashMap::new();
        let mut found = Vec::with_capacity(missing.len());
        for input in missing {
            let previous = input.previous;
            if !fetched.contains_key(&previous.txid) {
                let entry = self.previous_transaction(&previous)?;
                fetched.insert(previous.txid, entry);
            }
            let (prev_tx, _) = &fetched[&previous.txid];
            let output = prev_tx
                .output(previous.index)
                .ok_or_else(|| LedgerError::MissingOutput {
                    tx: hex::encode(previous.txid),
                    index: previous.index,
                })?
                .clone();
            found.push((input, output));
        }

        let mut state = self.state.write();
        for (input, output) in found {
            self.insert_locked(&mut state, input.previous, output.clone());
            resolved.insert(input, output);
        }
        for (hash, entry) in fetched {
            state.transactions.entry(hash).or_insert(entry);
        }
        Ok(resolved)
    }

    fn previous_transaction(&self, previous: &OutPoint) -> LedgerResult<(Arc<Transaction>, u32)> {
        if let Some((tx, height)) = self.state.read().transactions.get(&previous.txid) {
            return Ok((Arc::clone(tx), *height));
        }
        self.lookup
            .get_transaction(&previous.txid)
            .map_err(|e| match e {
                LedgerError::NotFound(_) => LedgerError::NotFound(format!(
                    "reference {}: transaction not found",
                    previous
                )),
                other => other,
            })
    }

    /// A transaction retained while resolving references. Never consults the lookup.
    pub fn get_transaction(&self, hash: &Hash256) -> LedgerResult<(Arc<Transaction>, u32)> {
        self.state
            .read()
            .transactions
            .get(hash)
            .map(|(tx, height)| (Arc::clone(tx), *height))
            .ok_or_else(|| {
                LedgerError::NotFound(format!("cached transaction {}", hex::encode(hash)))
            })
    }

    /// Drop retained transactions; references stay.
    pub fn clean_tx_cache(&self) {
        self.state.write().transactions.clear();
    }

    /// Drop references and retained transactions.
    pub fn clean_cache(&self) {
        let mut state = self.state.write();
        state.references.clear();
        state.transactions.clear();
    }

    pub fn reference_count(&self) -> usize {
        self.state.read().references.len()
    }

    pub fn tx_count(&self) -> usize {
        self.state.read().transactions.len()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let state = self.state.read();
        CacheStats {
            references: state.references.len(),
            capacity: state.references.cap().get(),
            transactions: state.transactions.len(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub references: usize,
    pub capacity: usize,
    pub transactions: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "References: {}/{}, Txs: {}, Hits: {}, Misses: {}, Evictions: {}, Hit rate: {:.1}%",
            self.references,
            self.capacity,
            self.transactions,
            self.hits,
            self.misses,
            self.evictions,
            self.hit_rate
        )
    }
}
