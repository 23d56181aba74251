//! Mempool reconciliation.
//!
//! Keeps the rows recorded under the pending sentinel congruent with the
//! node's live mempool by set difference: stale recorded transactions are
//! cascade-deleted, newly relayed ones are fetched and inserted, and the
//! sentinel block's counters are refreshed to the live mempool size.

use std::collections::HashSet;

use chainview_core::types::PENDING_BLOCK_HASH;
use chainview_core::{SyncError, TxRow};
use chainview_rpc::NodeClient;
use chainview_store::Store;

use crate::fetcher::decode_tx_rows;

/// What one reconciliation pass changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolDelta {
    /// Transactions newly inserted under the sentinel.
    pub added: usize,
    /// Stale transactions removed (left the mempool since last pass).
    pub removed: usize,
    /// Size of the node's mempool at reconciliation time.
    pub live: usize,
}

impl MempoolDelta {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Reconcile the pending rows against the node's current mempool.
///
/// Idempotent: a second pass against an unchanged mempool deletes and
/// inserts nothing. All row changes and the sentinel refresh commit as one
/// store transaction.
pub async fn reconcile<C: NodeClient>(node: &C, store: &Store) -> Result<MempoolDelta, SyncError> {
    let recorded: HashSet<String> = store.pending_txids().await?.into_iter().collect();
    let live: HashSet<String> = node.raw_mempool().await?.into_iter().collect();

    let mut tx = store.begin().await?;

    let mut removed = 0usize;
    for txid in recorded.difference(&live) {
        tx.delete_tx(txid).await?;
        removed += 1;
    }

    let mut added = 0usize;
    for txid in live.difference(&recorded) {
        match node.raw_transaction(txid).await? {
            Some(detail) => {
                tx.insert_tx(&TxRow {
                    txid: txid.clone(),
                    blockhash: PENDING_BLOCK_HASH.to_string(),
                    n: 0, // position is meaningless for pending txs
                })
                .await?;
                let (inputs, outputs) = decode_tx_rows(&detail);
                tx.insert_inputs(&inputs).await?;
                tx.insert_outputs(&outputs).await?;
                added += 1;
            }
            // Listed by getrawmempool but already gone again; skip it,
            // the next pass will not see it either.
            None => tracing::debug!(%txid, "mempool tx vanished before fetch"),
        }
    }

    tx.upsert_pending_block(live.len() as i64, chrono::Utc::now().timestamp())
        .await?;
    tx.commit().await?;

    let delta = MempoolDelta {
        added,
        removed,
        live: live.len(),
    };
    if !delta.is_noop() {
        tracing::info!(
            added = delta.added,
            removed = delta.removed,
            live = delta.live,
            "reconciled mempool"
        );
    }
    Ok(delta)
}

/// Drop every pending transaction row.
///
/// Invoked before extending the confirmed chain so a transaction that is
/// about to confirm cannot linger (or collide) under the sentinel.
pub async fn clear_pending(store: &Store) -> Result<usize, SyncError> {
    let recorded = store.pending_txids().await?;
    if recorded.is_empty() {
        return Ok(0);
    }

    let mut tx = store.begin().await?;
    for txid in &recorded {
        tx.delete_tx(txid).await?;
    }
    tx.commit().await?;

    tracing::debug!(cleared = recorded.len(), "cleared pending rows before fetch");
    Ok(recorded.len())
}
