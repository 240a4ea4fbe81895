//! Ledger-state error types
//!
//! Every fallible operation in the crate returns [`LedgerError`]. Errors raised
//! while connecting or disconnecting a block must be propagated so the caller
//! can drop the enclosing storage transaction.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Missing store entry, previous transaction or cache entry
    #[error("not found: {0}")]
    NotFound(String),

    /// Bucket created twice
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// An entry the index invariants require is missing or duplicated
    #[error("index inconsistent: {0}")]
    Inconsistent(String),

    /// The previous transaction exists but has no output at `index`
    #[error("reference {tx}:{index} points past the outputs of the transaction")]
    MissingOutput { tx: String, index: u16 },

    #[error("bucket {0} does not exist")]
    BucketNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for ledger-state operations
pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    /// Missing entries, including a reference past the end of a transaction's outputs.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::NotFound(_) | LedgerError::MissingOutput { .. }
        )
    }

    /// Errors that mean stored index state no longer matches the chain.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            LedgerError::Inconsistent(_) | LedgerError::Serialization(_)
        )
    }
}
