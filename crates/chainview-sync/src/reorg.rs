//! Chain-divergence detection and rewind.
//!
//! Before the fetcher extends the index, the stored tip must still be the
//! predecessor of the node's next block. If it is not, the node's
//! canonical chain has diverged at or before our tip: walk backward until
//! the stored hash and the node's canonical hash agree, drop everything
//! above the agreement height, and let the fetcher re-populate from there.

use chainview_core::SyncError;
use chainview_rpc::NodeClient;
use chainview_store::Store;

/// Outcome of a rewind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewindReport {
    /// Highest height at which the store and the node still agree;
    /// -1 when the divergence reaches all the way past genesis.
    pub fork_height: i64,
    /// Confirmed blocks deleted.
    pub dropped: i64,
    /// The stored tip before the rewind.
    pub old_tip: i64,
}

/// Verify tip continuity against the node and rewind on divergence.
///
/// Only call when the node's chain extends past the stored tip (the
/// continuity probe reads the node's block at `tip + 1`). Returns
/// `Ok(None)` when the chains agree or the store holds no confirmed
/// blocks yet.
pub async fn check_and_rewind<C: NodeClient>(
    node: &C,
    store: &Store,
) -> Result<Option<RewindReport>, SyncError> {
    let Some(db_tip) = store.max_confirmed_height().await? else {
        return Ok(None);
    };
    let db_hash = store
        .block_hash_at(db_tip)
        .await?
        .ok_or_else(|| SyncError::Storage(format!("no block stored at tip height {db_tip}")))?;

    let next_hash = node.block_hash(db_tip + 1).await?;
    let next = node.block(&next_hash).await?;
    if next.previous_hash() == db_hash {
        return Ok(None);
    }

    let divergence = SyncError::ChainDivergence {
        height: db_tip,
        db_hash: db_hash.clone(),
        node_prev_hash: next.previous_hash().to_string(),
    };
    tracing::warn!(%divergence, "rewinding");

    let fork_height = find_fork_height(node, store, db_tip).await?;

    let mut tx = store.begin().await?;
    tx.delete_blocks_above(fork_height).await?;
    tx.commit().await?;

    let dropped = db_tip - fork_height;
    tracing::info!(fork_height, dropped, "rewound local chain");
    Ok(Some(RewindReport {
        fork_height,
        dropped,
        old_tip: db_tip,
    }))
}

/// Walk backward from `db_tip` until the node's canonical hash matches the
/// stored hash. Returns -1 if even genesis disagrees.
async fn find_fork_height<C: NodeClient>(
    node: &C,
    store: &Store,
    db_tip: i64,
) -> Result<i64, SyncError> {
    let mut height = db_tip;
    while height >= 0 {
        let node_hash = node.block_hash(height).await?;
        if store.block_hash_at(height).await?.as_deref() == Some(node_hash.as_str()) {
            return Ok(height);
        }
        height -= 1;
    }
    Ok(-1)
}
