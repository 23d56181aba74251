//! Error taxonomy for the sync pipeline.

use thiserror::Error;

/// Errors that can occur while synchronizing the index with the node.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The node could not be reached (connection refused, timeout, bad
    /// HTTP status). Recovered by backing off and retrying.
    #[error("node unreachable: {0}")]
    Transport(String),

    /// The node answered, but with a protocol-level error or a response
    /// that does not decode. The schema assumes well-formed responses, so
    /// this is fatal.
    #[error("node protocol error: {0}")]
    NodeProtocol(String),

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The node's canonical chain no longer matches the local projection.
    /// Recovered by the reorg rewind; never escapes a sync cycle.
    #[error("chain diverged at height {height}: db has {db_hash}, node reports predecessor {node_prev_hash}")]
    ChainDivergence {
        height: i64,
        db_hash: String,
        node_prev_hash: String,
    },
}

impl SyncError {
    /// Returns `true` if the error is transient and the loop should back
    /// off and retry instead of stopping.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` for a detected reorganization.
    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::ChainDivergence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_is_transient() {
        assert!(SyncError::Transport("refused".into()).is_transient());
        assert!(!SyncError::NodeProtocol("bad json".into()).is_transient());
        assert!(!SyncError::Storage("locked".into()).is_transient());
        assert!(!SyncError::ChainDivergence {
            height: 10,
            db_hash: "a".into(),
            node_prev_hash: "b".into(),
        }
        .is_transient());
    }
}
