//! Global constants for the ledger-state layer
//!
//! Bucket keys are persisted; changing one orphans the existing index.

/// Storage bucket keys
pub mod buckets {
    /// Per-index tip (block hash + height), keyed by index bucket key
    pub const INDEX_TIPS: &[u8] = b"idxtips";
    pub const TX_INDEX: &[u8] = b"txbyhashidx";
    pub const UNSPENT_INDEX: &[u8] = b"unspentindex";
    pub const UTXO_INDEX: &[u8] = b"utxoindex";
    pub const TX3_INDEX: &[u8] = b"tx3index";
    pub const RETURN_DEPOSIT_INDEX: &[u8] = b"returndepositindex";
}

/// Cache sizing defaults
pub mod cache {
    /// Maximum input references held by the reference cache
    pub const MAX_REFERENCE_SIZE: usize = 100_000;

    /// Maximum transactions held by the unspent index's transaction cache
    pub const TX_CACHE_VOLUME: usize = 100_000;
}
