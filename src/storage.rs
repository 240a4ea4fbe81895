//! Transactional bucket store.
//!
//! A [`KvBackend`] is a flat ordered key space that can apply a set of writes
//! atomically. [`Database`] layers buckets and transactions on top: every
//! [`DbTransaction`] buffers its writes in an overlay, serves reads from the
//! overlay before the backend, and only touches the backend on
//! [`DbTransaction::commit`]. Dropping a transaction discards it.
//!
//! Keys inside a bucket are stored as `[len(bucket)] ++ bucket ++ key`. The
//! bucket registry lives under the zero length byte, so bucket names must be
//! 1..=255 bytes long.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{LedgerError, LedgerResult};

/// Pending writes keyed by full store key; `None` marks a delete.
pub type WriteSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

pub trait KvBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> LedgerResult<Option<Vec<u8>>>;
    fn scan_prefix(&self, prefix: &[u8]) -> LedgerResult<ScanResult>;
    /// Apply every write or none of them.
    fn apply(&self, writes: &WriteSet) -> LedgerResult<()>;
    fn flush(&self) -> LedgerResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBackend {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of the whole key space, for state comparisons in tests.
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.entries.read().clone()
    }
}

impl KvBackend for InMemoryBackend {
    fn get(&self, key: &[u8]) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> LedgerResult<ScanResult> {
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn apply(&self, writes: &WriteSet) -> LedgerResult<()> {
        let mut entries = self.entries.write();
        for (key, value) in writes {
            match value {
                Some(value) => {
                    entries.insert(key.clone(), value.clone());
                }
                None => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }
}

pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Database removed from disk when dropped.
    pub fn temporary() -> LedgerResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl KvBackend for SledBackend {
    fn get(&self, key: &[u8]) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|value| value.to_vec()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> LedgerResult<ScanResult> {
        self.db
            .scan_prefix(prefix)
            .map(|item| -> LedgerResult<(Vec<u8>, Vec<u8>)> {
                let (key, value) = item?;
                Ok((key.to_vec(), value.to_vec()))
            })
            .collect()
    }

    fn apply(&self, writes: &WriteSet) -> LedgerResult<()> {
        let mut batch = sled::Batch::default();
        for (key, value) in writes {
            match value {
                Some(value) => batch.insert(key.as_slice(), value.as_slice()),
                None => batch.remove(key.as_slice()),
            }
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn flush(&self) -> LedgerResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn KvBackend>,
}

impl Database {
    pub fn open(config: &StorageConfig) -> LedgerResult<Self> {
        let backend: Arc<dyn KvBackend> = match config.backend {
            StorageBackend::Memory => Arc::new(InMemoryBackend::new()),
            StorageBackend::Sled if config.temporary => Arc::new(SledBackend::temporary()?),
            StorageBackend::Sled => Arc::new(SledBackend::open(&config.path)?),
        };
        tracing::info!(backend = ?config.backend, "ledger database opened");
        Ok(Self { backend })
    }

    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(InMemoryBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub fn begin(&self) -> DbTransaction {
        DbTransaction {
            backend: Arc::clone(&self.backend),
            pending: WriteSet::new(),
        }
    }

    /// Run `f` in a read-write transaction, committing only if it returns `Ok`.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&mut DbTransaction) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut tx = self.begin();
        let out = f(&mut tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` against a transaction that is never committed.
    pub fn view<T>(&self, f: impl FnOnce(&DbTransaction) -> LedgerResult<T>) -> LedgerResult<T> {
        let tx = self.begin();
        f(&tx)
    }

    pub fn flush(&self) -> LedgerResult<()> {
        self.backend.flush()
    }
}

fn bucket_prefix(bucket: &[u8]) -> Vec<u8> {
    debug_assert!(!bucket.is_empty() && bucket.len() <= u8::MAX as usize);
    let mut prefix = Vec::with_capacity(1 + bucket.len());
    prefix.push(bucket.len() as u8);
    prefix.extend_from_slice(bucket);
    prefix
}

fn entry_key(bucket: &[u8], key: &[u8]) -> Vec<u8> {
    let mut full = bucket_prefix(bucket);
    full.extend_from_slice(key);
    full
}

fn registry_key(bucket: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + bucket.len());
    key.push(0);
    key.extend_from_slice(bucket);
    key
}

fn bucket_name(bucket: &[u8]) -> String {
    String::from_utf8_lossy(bucket).into_owned()
}

pub struct DbTransaction {
    backend: Arc<dyn KvBackend>,
    pending: WriteSet,
}

impl DbTransaction {
    fn raw_get(&self, key: &[u8]) -> LedgerResult<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.backend.get(key),
        }
    }

    fn raw_scan(&self, prefix: &[u8]) -> LedgerResult<BTreeMap<Vec<u8>, Vec<u8>>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.backend.scan_prefix(prefix)?.into_iter().collect();
        for (key, value) in self
            .pending
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged)
    }

    fn ensure_bucket(&self, bucket: &[u8]) -> LedgerResult<()> {
        if self.bucket_exists(bucket)? {
            Ok(())
        } else {
            Err(LedgerError::BucketNotFound(bucket_name(bucket)))
        }
    }

    pub fn bucket_exists(&self, bucket: &[u8]) -> LedgerResult<bool> {
        Ok(self.raw_get(&registry_key(bucket))?.is_some())
    }

    pub fn create_bucket(&mut self, bucket: &[u8]) -> LedgerResult<()> {
        if self.bucket_exists(bucket)? {
            return Err(LedgerError::AlreadyExists(format!(
                "bucket {}",
                bucket_name(bucket)
            )));
        }
        self.pending.insert(registry_key(bucket), Some(Vec::new()));
        Ok(())
    }

    /// Remove a bucket and every entry in it.
    pub fn delete_bucket(&mut self, bucket: &[u8]) -> LedgerResult<()> {
        self.ensure_bucket(bucket)?;
        let keys: Vec<Vec<u8>> = self
            .raw_scan(&bucket_prefix(bucket))?
            .into_keys()
            .collect();
        for key in keys {
            self.pending.insert(key, None);
        }
        self.pending.insert(registry_key(bucket), None);
        Ok(())
    }

    pub fn get(&self, bucket: &[u8], key: &[u8]) -> LedgerResult<Option<Vec<u8>>> {
        self.ensure_bucket(bucket)?;
        self.raw_get(&entry_key(bucket, key))
    }

    pub fn put(&mut self, bucket: &[u8], key: &[u8], value: Vec<u8>) -> LedgerResult<()> {
        self.ensure_bucket(bucket)?;
        self.pending.insert(entry_key(bucket, key), Some(value));
        Ok(())
    }

    pub fn delete(&mut self, bucket: &[u8], key: &[u8]) -> LedgerResult<()> {
        self.ensure_bucket(bucket)?;
        self.pending.insert(entry_key(bucket, key), None);
        Ok(())
    }

    pub fn contains(&self, bucket: &[u8], key: &[u8]) -> LedgerResult<bool> {
        Ok(self.get(bucket, key)?.is_some())
    }

    /// Entries of `bucket` whose key starts with `prefix`, ascending by key.
    /// Returned keys have the bucket namespace stripped.
    pub fn scan_prefix(&self, bucket: &[u8], prefix: &[u8]) -> LedgerResult<ScanResult> {
        self.ensure_bucket(bucket)?;
        let namespace = bucket_prefix(bucket);
        let full_prefix = entry_key(bucket, prefix);
        Ok(self
            .raw_scan(&full_prefix)?
            .into_iter()
            .map(|(key, value)| (key[namespace.len()..].to_vec(), value))
            .collect())
    }

    pub fn get_value<T: DeserializeOwned>(
        &self,
        bucket: &[u8],
        key: &[u8],
    ) -> LedgerResult<Option<T>> {
        match self.get(bucket, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_value<T: Serialize>(
        &mut self,
        bucket: &[u8],
        key: &[u8],
        value: &T,
    ) -> LedgerResult<()> {
        let bytes = bincode::serialize(value)?;
        self.put(bucket, key, bytes)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn commit(self) -> LedgerResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        tracing::trace!(writes = self.pending.len(), "committing ledger transaction");
        self.backend.apply(&self.pending)
    }

    pub fn rollback(self) {
        tracing::trace!(writes = self.pending.len(), "discarding ledger transaction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUCKET: &[u8] = b"bucket";

    #[test]
    fn test_create_bucket_twice_fails() {
        let db = Database::in_memory();
        let mut tx = db.begin();
        tx.create_bucket(BUCKET).unwrap();
        let err = tx.create_bucket(BUCKET).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists(_)));
        tx.commit().unwrap();

        let err = db.update(|tx| tx.create_bucket(BUCKET)).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists(_)));
    }

    #[test]
    fn test_missing_bucket_rejected() {
        let db = Database::in_memory();
        let err = db.view(|tx| tx.get(BUCKET, b"k")).unwrap_err();
        assert!(matches!(err, LedgerError::BucketNotFound(_)));
    }

    #[test]
    fn test_reads_see_own_writes() {
        let db = Database::in_memory();
        let mut tx = db.begin();
        tx.create_bucket(BUCKET).unwrap();
        tx.put(BUCKET, b"a", vec![1]).unwrap();
        assert_eq!(tx.get(BUCKET, b"a").unwrap(), Some(vec![1]));
        tx.delete(BUCKET, b"a").unwrap();
        assert_eq!(tx.get(BUCKET, b"a").unwrap(), None);
    }

    #[test]
    fn test_dropped_transaction_discards_writes() {
        let db = Database::in_memory();
        db.update(|tx| tx.create_bucket(BUCKET)).unwrap();

        let result: LedgerResult<()> = db.update(|tx| {
            tx.put(BUCKET, b"a", vec![1])?;
            Err(LedgerError::Inconsistent("abort".into()))
        });
        assert!(result.is_err());

        let mut tx = db.begin();
        tx.put(BUCKET, b"b", vec![2]).unwrap();
        tx.rollback();

        db.view(|tx| {
            assert_eq!(tx.get(BUCKET, b"a")?, None);
            assert_eq!(tx.get(BUCKET, b"b")?, None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_scan_prefix_merges_pending_writes() {
        let db = Database::in_memory();
        db.update(|tx| {
            tx.create_bucket(BUCKET)?;
            tx.create_bucket(b"bucket2")?;
            tx.put(BUCKET, b"p1", vec![1])?;
            tx.put(BUCKET, b"p2", vec![2])?;
            tx.put(BUCKET, b"q1", vec![3])?;
            tx.put(b"bucket2", b"p9", vec![9])
        })
        .unwrap();

        let mut tx = db.begin();
        tx.delete(BUCKET, b"p1").unwrap();
        tx.put(BUCKET, b"p0", vec![0]).unwrap();
        let scanned = tx.scan_prefix(BUCKET, b"p").unwrap();
        assert_eq!(
            scanned,
            vec![(b"p0".to_vec(), vec![0]), (b"p2".to_vec(), vec![2])]
        );
    }

    #[test]
    fn test_delete_bucket_allows_recreate() {
        let db = Database::in_memory();
        db.update(|tx| {
            tx.create_bucket(BUCKET)?;
            tx.put(BUCKET, b"a", vec![1])
        })
        .unwrap();
        db.update(|tx| tx.delete_bucket(BUCKET)).unwrap();
        db.update(|tx| tx.create_bucket(BUCKET)).unwrap();
        assert_eq!(db.view(|tx| tx.get(BUCKET, b"a")).unwrap(), None);
    }

    #[test]
    fn test_sled_backend_commit_is_visible() {
        let db = Database::with_backend(Arc::new(SledBackend::temporary().unwrap()));
        db.update(|tx| {
            tx.create_bucket(BUCKET)?;
            tx.put_value(BUCKET, b"n", &42u32)
        })
        .unwrap();
        let value: Option<u32> = db.view(|tx| tx.get_value(BUCKET, b"n")).unwrap();
        assert_eq!(value, Some(42));
    }
}
