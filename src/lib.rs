//! Ledger-state layer of a UTXO chain node.
//!
//! Reversible on-disk indexes maintained per connected block, plus a bounded
//! reference cache that resolves transaction inputs during validation.

pub mod block;
pub mod config;
pub mod constants;
pub mod error;
pub mod indexers;
pub mod logging;
pub mod lookup;
pub mod storage;
pub mod types;
pub mod utxo_cache;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use indexers::{Indexer, Manager};
pub use lookup::TransactionLookup;
pub use storage::{Database, DbTransaction};
pub use utxo_cache::UtxoCache;
