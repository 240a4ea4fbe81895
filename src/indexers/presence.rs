//! Shared storage for indexes that only record whether a hash has been seen.
//!
//! A hash is recorded by exactly one connected block, so disconnecting that
//! block can delete it without losing an entry another block created.

use crate::error::{LedgerError, LedgerResult};
use crate::storage::DbTransaction;
use crate::types::Hash256;

/// Fails with `Inconsistent` when a hash is already recorded, either by an
/// earlier block or earlier in the same block.
pub(super) fn add_hashes<'a>(
    db_tx: &mut DbTransaction,
    bucket: &[u8],
    hashes: impl Iterator<Item = &'a Hash256>,
) -> LedgerResult<usize> {
    let mut added = 0;
    for hash in hashes {
        if db_tx.contains(bucket, hash)? {
            tracing::warn!(
                hash = %hex::encode(hash),
                bucket = %String::from_utf8_lossy(bucket),
                "hash already recorded"
            );
            return Err(LedgerError::Inconsistent(format!(
                "hash {} already recorded in {}",
                hex::encode(hash),
                String::from_utf8_lossy(bucket)
            )));
        }
        db_tx.put(bucket, hash, Vec::new())?;
        added += 1;
    }
    Ok(added)
}

/// Deleting a hash that is not present is not an error.
pub(super) fn remove_hashes<'a>(
    db_tx: &mut DbTransaction,
    bucket: &[u8],
    hashes: impl Iterator<Item = &'a Hash256>,
) -> LedgerResult<usize> {
    let mut removed = 0;
    for hash in hashes {
        db_tx.delete(bucket, hash)?;
        removed += 1;
    }
    Ok(removed)
}

pub(super) fn contains_hash(
    db_tx: &DbTransaction,
    bucket: &[u8],
    hash: &Hash256,
) -> LedgerResult<bool> {
    db_tx.contains(bucket, hash)
}
