//! Record types for the persisted index, one struct per table row.

use serde::{Deserialize, Serialize};

/// Hash of the synthetic block that represents the current mempool snapshot.
pub const PENDING_BLOCK_HASH: &str = "pending";

/// Height of the pending sentinel block. Real blocks start at 0.
pub const PENDING_BLOCK_HEIGHT: i64 = -1;

/// Placeholder destination for unspendable nulldata outputs.
pub const NULLDATA_ADDRESS: &str = "nulldata";

/// Placeholder destination when a spendable output's script has no
/// decodable address.
pub const NONSTANDARD_ADDRESS: &str = "nonstandard";

// ─── BlockRow ─────────────────────────────────────────────────────────────────

/// One row of the `block` table.
///
/// Confirmed blocks carry the node's structural metadata verbatim. The
/// pending sentinel (`hash == "pending"`, `height == -1`) zeroes everything
/// except `time` and `numtxs`, which track the live mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
    pub hash: String,
    pub height: i64,
    /// Hash of the predecessor block; empty string for genesis.
    pub previousblockhash: String,
    pub strippedsize: i64,
    pub size: i64,
    pub weight: i64,
    pub versionhex: String,
    pub merkleroot: String,
    /// Block timestamp (unix seconds). Current time for the sentinel.
    pub time: i64,
    pub mediantime: i64,
    pub nonce: i64,
    pub bits: String,
    pub difficulty: String,
    pub chainwork: String,
    /// Number of transactions the block claims to contain.
    pub numtxs: i64,
}

impl BlockRow {
    /// Returns `true` if this is the mempool-snapshot sentinel.
    pub fn is_pending_sentinel(&self) -> bool {
        self.hash == PENDING_BLOCK_HASH
    }

    /// Returns `true` if `self` directly extends `parent` in the chain.
    pub fn extends(&self, parent: &BlockRow) -> bool {
        self.height == parent.height + 1 && self.previousblockhash == parent.hash
    }

    /// Build the sentinel row for a mempool of `numtxs` transactions
    /// observed at `time`.
    pub fn pending_sentinel(numtxs: i64, time: i64) -> Self {
        Self {
            hash: PENDING_BLOCK_HASH.into(),
            height: PENDING_BLOCK_HEIGHT,
            previousblockhash: PENDING_BLOCK_HASH.into(),
            strippedsize: 0,
            size: 0,
            weight: 0,
            versionhex: "0".into(),
            merkleroot: PENDING_BLOCK_HASH.into(),
            time,
            mediantime: 0,
            nonce: 0,
            bits: "0".into(),
            difficulty: "0".into(),
            chainwork: "0".into(),
            numtxs,
        }
    }
}

// ─── TxRow ────────────────────────────────────────────────────────────────────

/// One row of the `tx` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRow {
    pub txid: String,
    /// Hash of the containing block, or `"pending"` for mempool entries.
    pub blockhash: String,
    /// Ordinal position within the block; arbitrary (0) for pending txs.
    pub n: i64,
}

impl TxRow {
    pub fn is_pending(&self) -> bool {
        self.blockhash == PENDING_BLOCK_HASH
    }
}

// ─── InputRow ─────────────────────────────────────────────────────────────────

/// One consumed output reference. Coinbase transactions contribute none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRow {
    /// Owning transaction.
    pub txid: String,
    /// Index of this input within the owning transaction.
    pub n: i64,
    /// Txid of the transaction whose output is being spent.
    pub spendstxid: String,
    /// Output index within `spendstxid`.
    pub spendsn: i64,
}

// ─── OutputRow ────────────────────────────────────────────────────────────────

/// Kind of a produced output, persisted in `output.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    /// Ordinary spendable output paying to an address.
    Normal,
    /// Unspendable data-carrier (nulldata) output.
    Nulldata,
}

impl OutputKind {
    /// The flag stored in the `type` column: `""` normal, `"c"` nulldata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "",
            Self::Nulldata => "c",
        }
    }

    pub fn from_flag(flag: &str) -> Self {
        if flag == "c" {
            Self::Nulldata
        } else {
            Self::Normal
        }
    }
}

/// One row of the `output` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    /// Owning transaction.
    pub txid: String,
    /// Output index within the owning transaction.
    pub n: i64,
    pub kind: OutputKind,
    /// Value in satoshis. Zero for nulldata outputs.
    pub value: i64,
    /// Destination address, or a placeholder for nulldata / non-standard
    /// scripts.
    pub address: String,
}

// ─── Amounts ──────────────────────────────────────────────────────────────────

/// Satoshis per coin.
pub const SATS_PER_COIN: f64 = 100_000_000.0;

/// Convert a node-reported float coin amount to integral satoshis.
///
/// The RPC interface serializes amounts as decimal coins; the index stores
/// satoshis only. Rounding absorbs the float representation error.
pub fn coins_to_sats(coins: f64) -> i64 {
    (coins * SATS_PER_COIN).round() as i64
}

// ─── Tests ────────────────────────────────────────────────────────────────────
