use crate::block::Block;
use crate::types::*;

pub fn addr(n: u8) -> ProgramHash {
    let mut bytes = [0u8; PROGRAM_HASH_LEN];
    bytes[0] = 0x21;
    bytes[PROGRAM_HASH_LEN - 1] = n;
    ProgramHash(bytes)
}

fn outputs(values: &[(i64, ProgramHash)]) -> Vec<TxOutput> {
    values
        .iter()
        .map(|(value, program_hash)| TxOutput::new(*value, *program_hash))
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

pub fn transfer_tx(spends: &[(Hash256, u16)], values: &[(i64, ProgramHash)]) -> Transaction {
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
        programs: vec![],
    }
}

pub fn withdraw_tx(spend: (Hash256, u16), side_chain_hashes: Vec<Hash256>) -> Transaction {
    let mut tx = transfer_tx(&[spend], &[(1, addr(0xee))]);
    tx.tx_type = TxType::WithdrawFromSideChain;
    tx.payload = Payload::WithdrawFromSideChain(WithdrawFromSideChain {
        block_height: 1,
        genesis_block_address: "side".to_string(),
        side_chain_transaction_hashes: side_chain_hashes,
    });
    tx
}

pub fn return_deposit_tx(spend: (Hash256, u16), deposit_hash: Hash256) -> Transaction {
    let mut tx = transfer_tx(&[spend], &[]);
    tx.tx_type = TxType::ReturnSideChainDepositCoin;
    tx.outputs.push(TxOutput {
        value: 1,
        output_lock: 0,
        program_hash: addr(0xdd),
        payload: OutputPayload::ReturnSideChainDeposit {
            genesis_block_address: "side".to_string(),
            deposit_transaction_hash: deposit_hash,
        },
    });
    tx
}

pub fn block_at(height: u32, transactions: Vec<Transaction>) -> Block {
    Block::new(height, [0u8; 32], transactions)
}
