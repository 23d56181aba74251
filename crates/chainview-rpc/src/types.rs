//! Typed shapes for the node responses the sync pipeline consumes.
//!
//! Field names follow Bitcoin Core's verbose RPC output; serde renames
//! cover the camelCase exceptions.

use serde::{Deserialize, Serialize};

// ─── getblock (verbosity 1) ───────────────────────────────────────────────────

/// A confirmed block as returned by `getblock <hash>` (verbosity 1:
/// transactions listed as txids).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDetail {
    pub hash: String,
    pub height: i64,
    /// Absent for the genesis block.
    #[serde(default)]
    pub previousblockhash: Option<String>,
    pub strippedsize: i64,
    pub size: i64,
    pub weight: i64,
    #[serde(rename = "versionHex")]
    pub version_hex: String,
    pub merkleroot: String,
    pub time: i64,
    pub mediantime: i64,
    pub nonce: i64,
    pub bits: String,
    pub difficulty: f64,
    pub chainwork: String,
    /// Contained transaction ids, in block order.
    pub tx: Vec<String>,
}

impl BlockDetail {
    /// Predecessor hash, empty for genesis.
    pub fn previous_hash(&self) -> &str {
        self.previousblockhash.as_deref().unwrap_or("")
    }
}

// ─── getrawtransaction (verbose) ──────────────────────────────────────────────

/// A decoded transaction as returned by `getrawtransaction <txid> true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxDetail {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<TxIn>,
    #[serde(default)]
    pub vout: Vec<TxOut>,
}

/// A transaction input. Coinbase inputs carry the `coinbase` script and no
/// previous-output reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxIn {
    #[serde(default)]
    pub coinbase: Option<String>,
    /// Txid of the spent output's transaction; absent for coinbase.
    #[serde(default)]
    pub txid: Option<String>,
    /// Index of the spent output; absent for coinbase.
    #[serde(default)]
    pub vout: Option<i64>,
}

impl TxIn {
    /// The node's explicit coinbase marker decides; a missing prev-txid
    /// alone does not.
    pub fn is_coinbase(&self) -> bool {
        self.coinbase.is_some()
    }

    /// The `(spendstxid, spendsn)` pair for a non-coinbase input, if the
    /// node supplied both halves.
    pub fn spends(&self) -> Option<(&str, i64)> {
        if self.is_coinbase() {
            return None;
        }
        match (self.txid.as_deref(), self.vout) {
            (Some(txid), Some(n)) => Some((txid, n)),
            _ => None,
        }
    }
}

/// A transaction output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOut {
    /// Value in coins (decimal), as the node reports it.
    pub value: f64,
    pub n: i64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

/// The script half of an output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptPubKey {
    #[serde(rename = "type")]
    pub script_type: String,
    /// Single-address form (Bitcoin Core >= 22).
    #[serde(default)]
    pub address: Option<String>,
    /// Legacy multi-address form.
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
}

impl ScriptPubKey {
    /// Returns `true` for an unspendable data-carrier script.
    pub fn is_nulldata(&self) -> bool {
        self.script_type == "nulldata"
    }

    /// The destination address, whichever form the node used.
    pub fn destination(&self) -> Option<&str> {
        self.address
            .as_deref()
            .or_else(|| self.addresses.as_ref()?.first().map(String::as_str))
    }
}

// ─── getblockchaininfo ────────────────────────────────────────────────────────

/// The subset of `getblockchaininfo` the sync loop needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Current tip height of the node's canonical chain.
    pub blocks: i64,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_detail_decodes_core_output() {
        let v: BlockDetail = serde_json::from_str(
            r#"{
                "hash": "00a1", "height": 100, "previousblockhash": "0090",
                "strippedsize": 200, "size": 250, "weight": 800,
                "versionHex": "20000000", "merkleroot": "mr",
                "time": 1700000000, "mediantime": 1699999000,
                "nonce": 12345, "bits": "1d00ffff", "difficulty": 1.0,
                "chainwork": "0000000000000000000000000000000000000000000000000000000100010001",
                "tx": ["t1", "t2"]
            }"#,
        )
        .unwrap();
        assert_eq!(v.height, 100);
        assert_eq!(v.previous_hash(), "0090");
        assert_eq!(v.tx, vec!["t1", "t2"]);
    }

    #[test]
    fn genesis_block_has_empty_previous_hash() {
        let v: BlockDetail = serde_json::from_str(
            r#"{
                "hash": "g0", "height": 0,
                "strippedsize": 1, "size": 1, "weight": 4,
                "versionHex": "1", "merkleroot": "mr",
                "time": 1, "mediantime": 1, "nonce": 0,
                "bits": "1d00ffff", "difficulty": 1.0, "chainwork": "00",
                "tx": ["cb"]
            }"#,
        )
        .unwrap();
        assert_eq!(v.previous_hash(), "");
    }

    #[test]
    fn coinbase_input_detected_by_marker() {
        let tx: TxDetail = serde_json::from_str(
            r#"{"txid":"cb","vin":[{"coinbase":"04ffff001d","sequence":4294967295}],
                "vout":[{"value":50.0,"n":0,
                         "scriptPubKey":{"type":"pubkeyhash","address":"addr1"}}]}"#,
        )
        .unwrap();
        assert!(tx.vin[0].is_coinbase());
        assert!(tx.vin[0].spends().is_none());
    }

    #[test]
    fn regular_input_exposes_spent_reference() {
        let tx: TxDetail = serde_json::from_str(
            r#"{"txid":"t1","vin":[{"txid":"prev","vout":1}],"vout":[]}"#,
        )
        .unwrap();
        assert!(!tx.vin[0].is_coinbase());
        assert_eq!(tx.vin[0].spends(), Some(("prev", 1)));
    }

    #[test]
    fn script_destination_prefers_single_address() {
        let s: ScriptPubKey = serde_json::from_str(
            r#"{"type":"pubkeyhash","address":"new","addresses":["old"]}"#,
        )
        .unwrap();
        assert_eq!(s.destination(), Some("new"));

        let legacy: ScriptPubKey =
            serde_json::from_str(r#"{"type":"pubkeyhash","addresses":["old"]}"#).unwrap();
        assert_eq!(legacy.destination(), Some("old"));
    }

    #[test]
    fn nulldata_script_flagged() {
        let s: ScriptPubKey = serde_json::from_str(r#"{"type":"nulldata"}"#).unwrap();
        assert!(s.is_nulldata());
        assert_eq!(s.destination(), None);
    }
}
