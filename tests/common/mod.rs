#![allow(dead_code)]

use std::sync::Arc;

use utxo_ledger::block::Block;
use utxo_ledger::config::CacheConfig;
use utxo_ledger::storage::{Database, InMemoryBackend};
use utxo_ledger::types::*;
use utxo_ledger::Manager;

pub fn addr(n: u8) -> ProgramHash {
    let mut bytes = [0u8; PROGRAM_HASH_LEN];
    bytes[0] = 0x21;
    bytes[PROGRAM_HASH_LEN - 1] = n;
    ProgramHash(bytes)
}

fn outputs(values: &[(i64, ProgramHash)]) -> Vec<TxOutput> {
    values
        .iter()
        .map(|(value, to)| TxOutput::new(*value, *to))
        .collect()
}

pub fn coinbase(height: u32, values: &[(i64, ProgramHash)]) -> Transaction {
    Transaction {
        version: 0,
        tx_type: TxType::CoinBase,
        payload: Payload::CoinBase {
            content: height.to_le_bytes().to_vec(),
        },
        attributes: vec![],
        inputs: vec![],
        outputs: outputs(values),
        lock_time: height,
        programs: vec![],
    }
}

pub fn transfer(spends: &[(Hash256, u16)], values: &[(i64, ProgramHash)]) -> Transaction {
    Transaction {
        version: 0,
        tx_type: TxType::TransferAsset,
        payload: Payload::Empty,
        attributes: vec![],
        inputs: spends
            .iter()
            .map(|(txid, index)| TxInput::new(OutPoint::new(*txid, *index)))
            .collect(),
        outputs: outputs(values),
        lock_time: 0,
        programs: vec![Program {
            code: vec![0xac],
            parameter: vec![],
        }],
    }
}

pub fn withdraw(spend: (Hash256, u16), side_chain_hashes: Vec<Hash256>) -> Transaction {
    let mut tx = transfer(&[spend], &[(1, addr(0xee))]);
    tx.tx_type = TxType::WithdrawFromSideChain;
    tx.payload = Payload::WithdrawFromSideChain(WithdrawFromSideChain {
        block_height: 7,
        genesis_block_address: "XKUh4GLhFJiqAMTF6HyWQrV9pK9HcGUdfJ".to_string(),
        side_chain_transaction_hashes: side_chain_hashes,
    });
    tx
}

pub fn return_deposit(spend: (Hash256, u16), deposit_hash: Hash256) -> Transaction {
    let mut tx = transfer(&[spend], &[]);
    tx.tx_type = TxType::ReturnSideChainDepositCoin;
    tx.outputs.push(TxOutput {
        value: 1,
        output_lock: 0,
        program_hash: addr(0xdd),
        payload: OutputPayload::ReturnSideChainDeposit {
            genesis_block_address: "XKUh4GLhFJiqAMTF6HyWQrV9pK9HcGUdfJ".to_string(),
            deposit_transaction_hash: deposit_hash,
        },
    });
    tx
}

/// Manager over an in-memory store, plus the backend for raw snapshots.
pub fn memory_manager() -> (Arc<InMemoryBackend>, Manager) {
    let backend = Arc::new(InMemoryBackend::new());
    let db = Database::with_backend(backend.clone());
    let manager = Manager::new(db, &CacheConfig::default());
    manager.init().expect("index buckets");
    (backend, manager)
}

/// Three blocks exercising every index: same-block spends, withdrawals,
/// returned deposits and a zero-value output.
pub struct TestChain {
    pub blocks: Vec<Block>,
    pub side_chain_hashes: Vec<Hash256>,
    pub deposit_hash: Hash256,
}

pub fn test_chain() -> TestChain {
    let (a, b, c, d) = (addr(1), addr(2), addr(3), addr(4));

    let cb0 = coinbase(0, &[(50, a), (30, b), (20, c)]);
    let b0 = Block::new(0, [0u8; 32], vec![cb0.clone()]);

    let cb1 = coinbase(1, &[(50, a)]);
    let t1 = transfer(&[(cb0.hash(), 0)], &[(25, b), (25, c)]);
    let t2 = transfer(&[(t1.hash(), 0)], &[(25, d)]);
    let b1 = Block::new(1, b0.hash(), vec![cb1.clone(), t1.clone(), t2]);

    let side_chain_hashes = vec![[0x51u8; 32], [0x52u8; 32]];
    let deposit_hash = [0x61u8; 32];
    let cb2 = coinbase(2, &[(50, a)]);
    let w = withdraw((cb0.hash(), 1), side_chain_hashes.clone());
    let r = return_deposit((cb0.hash(), 2), deposit_hash);
    let t3 = transfer(&[(t1.hash(), 1), (cb1.hash(), 0)], &[(75, a), (0, b)]);
    let b2 = Block::new(2, b1.hash(), vec![cb2, w, r, t3]);

    TestChain {
        blocks: vec![b0, b1, b2],
        side_chain_hashes,
        deposit_hash,
    }
}
