//! Confirmed-block fetcher.
//!
//! Pulls one block at a time, ascending, and writes it atomically: the
//! block row, its transactions in block order, and their inputs/outputs
//! all land in a single store transaction committed once per block.
//! Progress therefore survives a crash at block granularity; a
//! half-written block never persists.

use chainview_core::types::{NONSTANDARD_ADDRESS, NULLDATA_ADDRESS};
use chainview_core::{coins_to_sats, BlockRow, InputRow, OutputKind, OutputRow, SyncError, TxRow};
use chainview_rpc::{BlockDetail, NodeClient, TxDetail};
use chainview_store::Store;

/// Fetch and index the confirmed heights `[beg, end]` inclusive, in
/// strictly increasing order. Returns the number of blocks committed.
pub async fn fetch_range<C: NodeClient>(
    node: &C,
    store: &Store,
    beg: i64,
    end: i64,
) -> Result<u64, SyncError> {
    let mut fetched = 0u64;
    for height in beg..=end {
        fetch_block(node, store, height).await?;
        fetched += 1;
    }
    Ok(fetched)
}

/// Fetch one confirmed block and commit all of its rows as a unit.
async fn fetch_block<C: NodeClient>(
    node: &C,
    store: &Store,
    height: i64,
) -> Result<(), SyncError> {
    let hash = node.block_hash(height).await?;
    let block = node.block(&hash).await?;

    let mut tx = store.begin().await?;
    tx.insert_block(&block_row(&block)).await?;

    for (n, txid) in block.tx.iter().enumerate() {
        tx.insert_tx(&TxRow {
            txid: txid.clone(),
            blockhash: hash.clone(),
            n: n as i64,
        })
        .await?;

        match node.raw_transaction(txid).await? {
            Some(detail) => {
                let (inputs, outputs) = decode_tx_rows(&detail);
                tx.insert_inputs(&inputs).await?;
                tx.insert_outputs(&outputs).await?;
            }
            // Row-level inconsistency: keep the tx row, skip its detail.
            None => tracing::warn!(
                %txid,
                height,
                "node returned no detail for a confirmed transaction"
            ),
        }
    }

    tx.commit().await?;
    tracing::debug!(height, hash = %hash, txs = block.tx.len(), "indexed block");
    Ok(())
}

/// Convert a node block into its persisted row. `numtxs` is the literal
/// count of listed transactions.
fn block_row(block: &BlockDetail) -> BlockRow {
    BlockRow {
        hash: block.hash.clone(),
        height: block.height,
        previousblockhash: block.previous_hash().to_string(),
        strippedsize: block.strippedsize,
        size: block.size,
        weight: block.weight,
        versionhex: block.version_hex.clone(),
        merkleroot: block.merkleroot.clone(),
        time: block.time,
        mediantime: block.mediantime,
        nonce: block.nonce,
        bits: block.bits.clone(),
        difficulty: block.difficulty.to_string(),
        chainwork: block.chainwork.clone(),
        numtxs: block.tx.len() as i64,
    }
}

/// Decode a verbose transaction into its input and output rows.
///
/// Coinbase inputs (explicit node marker) contribute no input row.
/// Nulldata outputs get the data-carrier kind, zero value, and the
/// placeholder destination; a spendable output whose script yields no
/// address is recorded with a placeholder rather than aborting the block.
pub(crate) fn decode_tx_rows(detail: &TxDetail) -> (Vec<InputRow>, Vec<OutputRow>) {
    let mut inputs = Vec::new();
    for (n, vin) in detail.vin.iter().enumerate() {
        if vin.is_coinbase() {
            continue;
        }
        match vin.spends() {
            Some((spendstxid, spendsn)) => inputs.push(InputRow {
                txid: detail.txid.clone(),
                n: n as i64,
                spendstxid: spendstxid.to_string(),
                spendsn,
            }),
            None => tracing::warn!(
                txid = %detail.txid,
                input = n,
                "input carries neither coinbase marker nor previous output; skipping row"
            ),
        }
    }

    let mut outputs = Vec::with_capacity(detail.vout.len());
    for vout in &detail.vout {
        let row = if vout.script_pub_key.is_nulldata() {
            OutputRow {
                txid: detail.txid.clone(),
                n: vout.n,
                kind: OutputKind::Nulldata,
                value: 0,
                address: NULLDATA_ADDRESS.to_string(),
            }
        } else {
            let address = match vout.script_pub_key.destination() {
                Some(addr) => addr.to_string(),
                None => {
                    tracing::warn!(
                        txid = %detail.txid,
                        output = vout.n,
                        script_type = %vout.script_pub_key.script_type,
                        "spendable output without decodable address"
                    );
                    NONSTANDARD_ADDRESS.to_string()
                }
            };
            OutputRow {
                txid: detail.txid.clone(),
                n: vout.n,
                kind: OutputKind::Normal,
                value: coins_to_sats(vout.value),
                address,
            }
        };
        outputs.push(row);
    }

    (inputs, outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_detail(json: &str) -> TxDetail {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn coinbase_contributes_no_input_rows() {
        let detail = tx_detail(
            r#"{"txid":"cb","vin":[{"coinbase":"04ff"}],
                "vout":[{"value":50.0,"n":0,
                         "scriptPubKey":{"type":"pubkeyhash","address":"miner"}}]}"#,
        );
        let (inputs, outputs) = decode_tx_rows(&detail);
        assert!(inputs.is_empty());
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].value, 5_000_000_000);
        assert_eq!(outputs[0].address, "miner");
        assert_eq!(outputs[0].kind, OutputKind::Normal);
    }

    #[test]
    fn regular_input_yields_spent_reference() {
        let detail = tx_detail(
            r#"{"txid":"t1","vin":[{"txid":"prev","vout":2}],
                "vout":[{"value":0.5,"n":0,
                         "scriptPubKey":{"type":"pubkeyhash","address":"a1"}}]}"#,
        );
        let (inputs, _) = decode_tx_rows(&detail);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].spendstxid, "prev");
        assert_eq!(inputs[0].spendsn, 2);
        assert_eq!(inputs[0].n, 0);
    }

    #[test]
    fn nulldata_output_gets_placeholder() {
        let detail = tx_detail(
            r#"{"txid":"t2","vin":[],
                "vout":[{"value":0.0,"n":0,"scriptPubKey":{"type":"nulldata"}},
                        {"value":1.0,"n":1,
                         "scriptPubKey":{"type":"pubkeyhash","address":"a2"}}]}"#,
        );
        let (_, outputs) = decode_tx_rows(&detail);
        assert_eq!(outputs[0].kind, OutputKind::Nulldata);
        assert_eq!(outputs[0].address, NULLDATA_ADDRESS);
        assert_eq!(outputs[0].value, 0);
        assert_eq!(outputs[1].kind, OutputKind::Normal);
        assert_eq!(outputs[1].value, 100_000_000);
    }

    #[test]
    fn addressless_spendable_output_uses_placeholder() {
        let detail = tx_detail(
            r#"{"txid":"t3","vin":[],
                "vout":[{"value":0.25,"n":0,"scriptPubKey":{"type":"multisig"}}]}"#,
        );
        let (_, outputs) = decode_tx_rows(&detail);
        assert_eq!(outputs[0].address, NONSTANDARD_ADDRESS);
        assert_eq!(outputs[0].value, 25_000_000);
    }

    #[test]
    fn malformed_input_skipped_not_fatal() {
        // Neither coinbase marker nor a full previous-output reference
        let detail = tx_detail(
            r#"{"txid":"t4","vin":[{"txid":"prev"}],"vout":[]}"#,
        );
        let (inputs, _) = decode_tx_rows(&detail);
        assert!(inputs.is_empty());
    }
}
