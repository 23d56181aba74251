//! chainview-rpc: the node-facing half of the sync pipeline.
//!
//! Exposes the `NodeClient` trait (the seam the sync components and their
//! tests are written against) and the `reqwest`-backed `HttpNodeClient`
//! that speaks JSON-RPC 2.0 to a single configured node endpoint.

pub mod client;
pub mod types;
pub mod wire;

pub use client::{HttpClientConfig, HttpNodeClient, NodeClient};
pub use types::{BlockDetail, ChainInfo, ScriptPubKey, TxDetail, TxIn, TxOut};
pub use wire::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
