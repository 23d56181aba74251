//! chainview-sync: keeps the index congruent with the node.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator (polling loop, state machine)
//!     ├── mempool   (pending-set reconciliation against getrawmempool)
//!     ├── reorg     (tip continuity check + rewind)
//!     └── fetcher   (per-block atomic fetch and commit)
//! ```
//!
//! Everything is written against the `NodeClient` trait, so tests drive
//! whole cycles with a scripted stub node and no real time.

pub mod fetcher;
pub mod mempool;
pub mod orchestrator;
pub mod reorg;

pub use mempool::MempoolDelta;
pub use orchestrator::{CycleReport, Orchestrator, SyncConfig, SyncState};
pub use reorg::RewindReport;
