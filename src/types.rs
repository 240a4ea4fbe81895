use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub type Hash256 = [u8; 32];

pub const PROGRAM_HASH_LEN: usize = 21;

/// Recipient identity an output is locked to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHash(pub [u8; PROGRAM_HASH_LEN]);

impl ProgramHash {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; PROGRAM_HASH_LEN] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

impl fmt::Display for ProgramHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Position of a single output: the producing transaction and the output index.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Hash256,
    pub index: u16,
}

impl OutPoint {
    pub fn new(txid: Hash256, index: u16) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.index)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TxInput {
    pub previous: OutPoint,
    pub sequence: u32,
}

impl TxInput {
    pub fn new(previous: OutPoint) -> Self {
        Self {
            previous,
            sequence: u32::MAX,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OutputPayload {
    #[default]
    Default,
    ReturnSideChainDeposit {
        genesis_block_address: String,
        deposit_transaction_hash: Hash256,
    },
    Vote(Vec<u8>),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxOutput {
    pub value: i64,
    pub output_lock: u32,
    pub program_hash: ProgramHash,
    pub payload: OutputPayload,
}

impl TxOutput {
    pub fn new(value: i64, program_hash: ProgramHash) -> Self {
        Self {
            value,
            output_lock: 0,
            program_hash,
            payload: OutputPayload::Default,
        }
    }

    pub fn deposit_transaction_hash(&self) -> Option<&Hash256> {
        match &self.payload {
            OutputPayload::ReturnSideChainDeposit {
                deposit_transaction_hash,
                ..
            } => Some(deposit_transaction_hash),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TxType {
    CoinBase,
    RegisterAsset,
    TransferAsset,
    Record,
    SideChainPow,
    RechargeToSideChain,
    WithdrawFromSideChain,
    TransferCrossChainAsset,
    ReturnSideChainDepositCoin,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WithdrawFromSideChain {
    pub block_height: u32,
    pub genesis_block_address: String,
    pub side_chain_transaction_hashes: Vec<Hash256>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Payload {
    #[default]
    Empty,
    CoinBase {
        content: Vec<u8>,
    },
    Record {
        record_type: String,
        data: Vec<u8>,
    },
    WithdrawFromSideChain(WithdrawFromSideChain),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attribute {
    pub usage: u8,
    pub data: Vec<u8>,
}

/// Witness program; excluded from the transaction hash.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Program {
    pub code: Vec<u8>,
    pub parameter: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub version: u8,
    pub tx_type: TxType,
    pub payload: Payload,
    pub attributes: Vec<Attribute>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
    pub programs: Vec<Program>,
}

#[derive(Serialize)]
struct UnsignedTransaction<'a> {
    version: u8,
    tx_type: TxType,
    payload: &'a Payload,
    attributes: &'a [Attribute],
    inputs: &'a [TxInput],
    outputs: &'a [TxOutput],
    lock_time: u32,
}

impl Transaction {
    /// Double SHA-256 over the unsigned encoding.
    pub fn hash(&self) -> Hash256 {
        let unsigned = UnsignedTransaction {
            version: self.version,
            tx_type: self.tx_type,
            payload: &self.payload,
            attributes: &self.attributes,
            inputs: &self.inputs,
            outputs: &self.outputs,
            lock_time: self.lock_time,
        };
        let bytes = bincode::serialize(&unsigned).expect("Serialization should succeed");
        Sha256::digest(Sha256::digest(bytes)).into()
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx_type == TxType::CoinBase
    }

    pub fn withdraw_payload(&self) -> Option<&WithdrawFromSideChain> {
        match (&self.tx_type, &self.payload) {
            (TxType::WithdrawFromSideChain, Payload::WithdrawFromSideChain(payload)) => {
                Some(payload)
            }
            _ => None,
        }
    }

    /// Output indices this transaction produces, ascending.
    pub fn output_indices(&self) -> Vec<u16> {
        (0..self.outputs.len()).map(|i| i as u16).collect()
    }

    pub fn output(&self, index: u16) -> Option<&TxOutput> {
        self.outputs.get(index as usize)
    }
}
