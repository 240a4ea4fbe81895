pub mod types;

pub use types::{calculate_merkle_root, Block, BlockHeader};
