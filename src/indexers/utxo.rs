//! Address (program hash) to spendable output index.
//!
//! Entries are keyed by `program_hash ++ height (big endian)`, so a prefix
//! scan over the program hash yields heights in ascending order. Each entry
//! holds the records appended for that address by the block at that height,
//! in block order (producing transaction position, then output index).
//! Zero-value outputs are never indexed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{fetch_tx_entry, Indexer};
use crate::block::Block;
use crate::constants::buckets::UTXO_INDEX;
use crate::error::{LedgerError, LedgerResult};
use crate::storage::DbTransaction;
use crate::types::{Hash256, OutPoint, ProgramHash, Transaction, TxOutput, PROGRAM_HASH_LEN};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtxoRecord {
    pub tx_hash: Hash256,
    pub index: u16,
    pub value: i64,
}

impl UtxoRecord {
    fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_hash, self.index)
    }
}

pub fn utxo_index_key(address: &ProgramHash, height: u32) -> [u8; PROGRAM_HASH_LEN + 4] {
    let mut key = [0u8; PROGRAM_HASH_LEN + 4];
    key[..PROGRAM_HASH_LEN].copy_from_slice(address.as_bytes());
    key[PROGRAM_HASH_LEN..].copy_from_slice(&height.to_be_bytes());
    key
}

/// Every record of `address`, lower heights first.
pub fn fetch_utxo_index_entry(
    db_tx: &DbTransaction,
    address: &ProgramHash,
) -> LedgerResult<Vec<UtxoRecord>> {
    let mut records = Vec::new();
    for (key, value) in db_tx.scan_prefix(UTXO_INDEX, address.as_bytes())? {
        if key.len() != PROGRAM_HASH_LEN + 4 {
            return Err(LedgerError::Inconsistent(format!(
                "malformed utxo index key for {}",
                address
            )));
        }
        let bucket: Vec<UtxoRecord> = bincode::deserialize(&value)?;
        records.extend(bucket);
    }
    Ok(records)
}

/// Records of `address` created at exactly `height`; empty when none.
pub fn fetch_utxo_index_entry_by_height(
    db_tx: &DbTransaction,
    address: &ProgramHash,
    height: u32,
) -> LedgerResult<Vec<UtxoRecord>> {
    Ok(db_tx
        .get_value(UTXO_INDEX, &utxo_index_key(address, height))?
        .unwrap_or_default())
}

/// A previous output together with where its transaction sits in the chain.
struct SpentOutput {
    output: TxOutput,
    height: u32,
    position: u32,
}

/// Resolves transactions for one block: the block itself first, then the
/// transaction index.
struct BlockResolver<'a> {
    block_height: u32,
    in_block: HashMap<Hash256, (u32, &'a Transaction)>,
    positions: HashMap<Hash256, u32>,
}

impl<'a> BlockResolver<'a> {
    fn new(block: &'a Block) -> Self {
        let in_block = block
            .transactions
            .iter()
            .enumerate()
            .map(|(position, tx)| (tx.hash(), (position as u32, tx)))
            .collect();
        Self {
            block_height: block.height(),
            in_block,
            positions: HashMap::new(),
        }
    }

    fn spent_output(&self, db_tx: &DbTransaction, previous: &OutPoint) -> LedgerResult<SpentOutput> {
        let missing_output = || LedgerError::MissingOutput {
            tx: hex::encode(previous.txid),
            index: previous.index,
        };

        if let Some((position, tx)) = self.in_block.get(&previous.txid) {
            let output = tx.output(previous.index).ok_or_else(missing_output)?;
            return Ok(SpentOutput {
                output: output.clone(),
                height: self.block_height,
                position: *position,
            });
        }

        let entry = fetch_tx_entry(db_tx, &previous.txid)?.ok_or_else(|| {
            LedgerError::NotFound(format!(
                "previous transaction {}",
                hex::encode(previous.txid)
            ))
        })?;
        let output = entry.tx.output(previous.index).ok_or_else(missing_output)?;
        Ok(SpentOutput {
            output: output.clone(),
            height: entry.block_height,
            position: entry.position,
        })
    }

    fn position(&mut self, db_tx: &DbTransaction, hash: &Hash256) -> LedgerResult<u32> {
        if let Some((position, _)) = self.in_block.get(hash) {
            return Ok(*position);
        }
        if let Some(position) = self.positions.get(hash) {
            return Ok(*position);
        }
        let entry = fetch_tx_entry(db_tx, hash)?.ok_or_else(|| {
            LedgerError::NotFound(format!("indexed transaction {}", hex::encode(hash)))
        })?;
        self.positions.insert(*hash, entry.position);
        Ok(entry.position)
    }
}

#[derive(Debug, Default)]
pub struct UtxoIndex;

impl UtxoIndex {
    pub fn new() -> Self {
        Self
    }

    fn load(
        db_tx: &DbTransaction,
        address: &ProgramHash,
        height: u32,
    ) -> LedgerResult<Vec<UtxoRecord>> {
        fetch_utxo_index_entry_by_height(db_tx, address, height)
    }

    fn store(
        db_tx: &mut DbTransaction,
        address: &ProgramHash,
        height: u32,
        records: &[UtxoRecord],
    ) -> LedgerResult<()> {
        let key = utxo_index_key(address, height);
        if records.is_empty() {
            db_tx.delete(UTXO_INDEX, &key)
        } else {
            db_tx.put_value(UTXO_INDEX, &key, &records)
        }
    }

    fn append(
        db_tx: &mut DbTransaction,
        address: &ProgramHash,
        height: u32,
        record: UtxoRecord,
    ) -> LedgerResult<()> {
        let mut records = Self::load(db_tx, address, height)?;
        records.push(record);
        Self::store(db_tx, address, height, &records)
    }

    fn remove(
        db_tx: &mut DbTransaction,
        address: &ProgramHash,
        height: u32,
        outpoint: &OutPoint,
    ) -> LedgerResult<()> {
        let mut records = Self::load(db_tx, address, height)?;
        let position = records
            .iter()
            .position(|record| record.outpoint() == *outpoint)
            .ok_or_else(|| {
                LedgerError::Inconsistent(format!(
                    "utxo {} missing from {} at height {}",
                    outpoint, address, height
                ))
            })?;
        records.remove(position);
        Self::store(db_tx, address, height, &records)
    }

    /// Put a spent record back where connecting its block originally placed it.
    fn restore(
        db_tx: &mut DbTransaction,
        resolver: &mut BlockResolver<'_>,
        address: &ProgramHash,
        spent: &SpentOutput,
        record: UtxoRecord,
    ) -> LedgerResult<()> {
        let mut records = Self::load(db_tx, address, spent.height)?;
        if records.iter().any(|r| r.outpoint() == record.outpoint()) {
            return Err(LedgerError::Inconsistent(format!(
                "utxo {} already indexed for {}",
                record.outpoint(),
                address
            )));
        }

        let target = (spent.position, record.index);
        let mut insert_at = records.len();
        for (i, existing) in records.iter().enumerate() {
            let order = (resolver.position(db_tx, &existing.tx_hash)?, existing.index);
            if order > target {
                insert_at = i;
                break;
            }
        }
        records.insert(insert_at, record);
        Self::store(db_tx, address, spent.height, &records)
    }
}

impl Indexer for UtxoIndex {
    fn key(&self) -> &'static [u8] {
        UTXO_INDEX
    }

    fn name(&self) -> &'static str {
        "utxo index"
    }

    fn connect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        let resolver = BlockResolver::new(block);
        let height = block.height();

        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let spent = resolver.spent_output(db_tx, &input.previous)?;
                    if spent.output.value <= 0 {
                        continue;
                    }
                    Self::remove(
                        db_tx,
                        &spent.output.program_hash,
                        spent.height,
                        &input.previous,
                    )?;
                }
            }

            let hash = tx.hash();
            for (index, output) in tx.outputs.iter().enumerate() {
                if output.value <= 0 {
                    continue;
                }
                let record = UtxoRecord {
                    tx_hash: hash,
                    index: index as u16,
                    value: output.value,
                };
                Self::append(db_tx, &output.program_hash, height, record)?;
            }
        }
        tracing::debug!(height, "utxo index connected block");
        Ok(())
    }

    fn disconnect_block(&self, db_tx: &mut DbTransaction, block: &Block) -> LedgerResult<()> {
        let mut resolver = BlockResolver::new(block);
        let height = block.height();

        for tx in block.transactions.iter().rev() {
            let hash = tx.hash();
            for (index, output) in tx.outputs.iter().enumerate().rev() {
                if output.value <= 0 {
                    continue;
                }
                let outpoint = OutPoint::new(hash, index as u16);
                Self::remove(db_tx, &output.program_hash, height, &outpoint)?;
            }

            if tx.is_coinbase() {
                continue;
            }
            for input in tx.inputs.iter().rev() {
                let spent = resolver.spent_output(db_tx, &input.previous)?;
                if spent.output.value <= 0 {
                    continue;
                }
                let record = UtxoRecord {
                    tx_hash: input.previous.txid,
                    index: input.previous.index,
                    value: spent.output.value,
                };
                let address = spent.output.program_hash;
                Self::restore(db_tx, &mut resolver, &address, &spent, record)?;
            }
        }
        tracing::debug!(height, "utxo index disconnected block");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexers::test_helpers::*;
    use crate::indexers::TxIndex;
    use crate::storage::Database;

    fn setup() -> Database {
        let db = Database::in_memory();
        db.update(|tx| {
            TxIndex::new().create(tx)?;
            UtxoIndex::new().create(tx)
        })
        .unwrap();
        db
    }

    fn connect(db: &Database, block: &Block) {
        db.update(|tx| {
            TxIndex::new().connect_block(tx, block)?;
            UtxoIndex::new().connect_block(tx, block)
        })
        .unwrap();
    }

    fn disconnect(db: &Database, block: &Block) {
        db.update(|tx| {
            UtxoIndex::new().disconnect_block(tx, block)?;
            TxIndex::new().disconnect_block(tx, block)
        })
        .unwrap();
    }

    fn by_address(db: &Database, address: &ProgramHash) -> Vec<(Hash256, u16, i64)> {
        db.view(|tx| fetch_utxo_index_entry(tx, address))
            .unwrap()
            .into_iter()
            .map(|r| (r.tx_hash, r.index, r.value))
            .collect()
    }

    #[test]
    fn test_records_ordered_by_height_then_append() {
        let db = setup();
        let a = addr(1);
        let cb1 = coinbase(1, &[(10, a), (0, a), (20, a)]);
        let cb2 = coinbase(2, &[(30, a)]);
        connect(&db, &block_at(1, vec![cb1.clone()]));
        connect(&db, &block_at(2, vec![cb2.clone()]));

        assert_eq!(
            by_address(&db, &a),
            vec![
                (cb1.hash(), 0, 10),
                (cb1.hash(), 2, 20),
                (cb2.hash(), 0, 30)
            ]
        );

        let at_two = db
            .view(|tx| fetch_utxo_index_entry_by_height(tx, &a, 2))
            .unwrap();
        assert_eq!(at_two.len(), 1);
        assert_eq!(at_two[0].tx_hash, cb2.hash());

        let at_five = db
            .view(|tx| fetch_utxo_index_entry_by_height(tx, &a, 5))
            .unwrap();
        assert!(at_five.is_empty());
    }

    #[test]
    fn test_spend_removes_only_owner_record() {
        let db = setup();
        let (a, b) = (addr(1), addr(2));
        let cb = coinbase(1, &[(10, a), (15, b)]);
        connect(&db, &block_at(1, vec![cb.clone()]));

        let spend = transfer_tx(&[(cb.hash(), 0)], &[(10, b)]);
        connect(&db, &block_at(2, vec![spend.clone()]));

        assert!(by_address(&db, &a).is_empty());
        assert_eq!(
            by_address(&db, &b),
            vec![(cb.hash(), 1, 15), (spend.hash(), 0, 10)]
        );
    }

    #[test]
    fn test_disconnect_restores_original_position() {
        let db = setup();
        let a = addr(1);
        let cb = coinbase(1, &[(10, a), (11, a)]);
        let funding = transfer_tx(&[], &[(12, a), (13, a)]);
        let block1 = block_at(1, vec![cb.clone(), funding.clone()]);
        connect(&db, &block1);
        let before = db.view(|tx| fetch_utxo_index_entry(tx, &a)).unwrap();

        let spend = transfer_tx(
            &[(funding.hash(), 0), (cb.hash(), 1)],
            &[(20, addr(3))],
        );
        let block2 = block_at(2, vec![spend]);
        connect(&db, &block2);
        assert_eq!(
            by_address(&db, &a),
            vec![(cb.hash(), 0, 10), (funding.hash(), 1, 13)]
        );

        disconnect(&db, &block2);
        let after = db.view(|tx| fetch_utxo_index_entry(tx, &a)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_same_block_spend() {
        let db = setup();
        let (a, b) = (addr(1), addr(2));
        let cb = coinbase(4, &[(10, a)]);
        let spend = transfer_tx(&[(cb.hash(), 0)], &[(10, b)]);
        let block = block_at(4, vec![cb.clone(), spend.clone()]);

        connect(&db, &block);
        assert!(by_address(&db, &a).is_empty());
        assert_eq!(by_address(&db, &b), vec![(spend.hash(), 0, 10)]);

        disconnect(&db, &block);
        assert!(by_address(&db, &a).is_empty());
        assert!(by_address(&db, &b).is_empty());
    }

    #[test]
    fn test_missing_record_is_inconsistent() {
        let db = setup();
        let a = addr(1);
        let cb = coinbase(1, &[(10, a)]);
        connect(&db, &block_at(1, vec![cb.clone()]));
        db.update(|tx| tx.delete(UTXO_INDEX, &utxo_index_key(&a, 1)))
            .unwrap();

        let spend = transfer_tx(&[(cb.hash(), 0)], &[(10, a)]);
        let block = block_at(2, vec![spend]);
        let err = db
            .update(|tx| {
                TxIndex::new().connect_block(tx, &block)?;
                UtxoIndex::new().connect_block(tx, &block)
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::Inconsistent(_)));
    }

    #[test]
    fn test_missing_output_index() {
        let db = setup();
        let cb = coinbase(1, &[(10, addr(1))]);
        connect(&db, &block_at(1, vec![cb.clone()]));

        let spend = transfer_tx(&[(cb.hash(), 5)], &[(10, addr(1))]);
        let block = block_at(2, vec![spend]);
        let err = db
            .update(|tx| UtxoIndex::new().connect_block(tx, &block))
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingOutput { index: 5, .. }));
    }
}
