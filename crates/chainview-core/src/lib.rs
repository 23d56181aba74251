//! chainview-core: record types and error taxonomy shared across the
//! chainview index.
//!
//! The index is a single linear best-chain projection plus a synthetic
//! "pending" block mirroring the node's mempool. Every entity the store
//! persists has an explicit record type here.

pub mod error;
pub mod types;

pub use error::SyncError;
pub use types::{
    coins_to_sats, BlockRow, InputRow, OutputKind, OutputRow, TxRow, NONSTANDARD_ADDRESS,
    NULLDATA_ADDRESS, PENDING_BLOCK_HASH, PENDING_BLOCK_HEIGHT,
};
