//! The sync orchestrator sequences one cycle of mempool reconciliation,
//! divergence handling, and block fetching, and drives the polling loop.
//!
//! # Cycle
//! 1. Reconcile the mempool so stale pending rows cannot leak into
//!    confirmed-block processing.
//! 2. Read the stored tip and the node's tip; if nothing is new, idle.
//! 3. Clear pending rows, rewind on divergence, fetch the new range.
//! 4. Reconcile the mempool again to drop just-confirmed transactions.
//!
//! `run_cycle` is public so tests (and alternative schedulers) can drive
//! cycles synchronously; `run` wraps it in the cancellable polling loop.
//! A transport failure puts the loop into a long backoff sleep; any other
//! error is fatal and stops the process.

use std::time::Duration;

use tokio::sync::watch;

use chainview_core::SyncError;
use chainview_rpc::NodeClient;
use chainview_store::Store;

use crate::fetcher;
use crate::mempool::{self, MempoolDelta};
use crate::reorg::{self, RewindReport};

/// Polling cadence configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Sleep between successful cycles.
    pub poll_interval: Duration,
    /// Sleep after a transport failure before retrying.
    pub backoff_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(20),
            backoff_interval: Duration::from_secs(120),
        }
    }
}

/// Phase of the sync loop, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    ReconcilingMempool,
    DetectingReorg,
    Fetching,
    Sleeping,
    Backoff,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ReconcilingMempool => write!(f, "reconciling-mempool"),
            Self::DetectingReorg => write!(f, "detecting-reorg"),
            Self::Fetching => write!(f, "fetching"),
            Self::Sleeping => write!(f, "sleeping"),
            Self::Backoff => write!(f, "backoff"),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Mempool reconciliation before the fetch.
    pub mempool_before: MempoolDelta,
    /// Rewind performed, if the node's chain diverged.
    pub rewind: Option<RewindReport>,
    /// Confirmed blocks fetched and committed.
    pub fetched: u64,
    /// Mempool reconciliation after the fetch; `None` when no blocks were
    /// fetched this cycle.
    pub mempool_after: Option<MempoolDelta>,
}

/// Top-level sync driver. Owns the node client and the store handle for
/// the duration of the loop: one logical worker, strictly sequential.
pub struct Orchestrator<C: NodeClient> {
    node: C,
    store: Store,
    config: SyncConfig,
    state: SyncState,
}

impl<C: NodeClient> Orchestrator<C> {
    pub fn new(node: C, store: Store, config: SyncConfig) -> Self {
        Self {
            node,
            store,
            config,
            state: SyncState::Idle,
        }
    }

    /// Current loop phase.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// The store this orchestrator writes to (read-only access for
    /// callers).
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Execute one full sync cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, SyncError> {
        self.state = SyncState::ReconcilingMempool;
        let mempool_before = mempool::reconcile(&self.node, &self.store).await?;

        let db_tip = self.store.max_confirmed_height().await?.unwrap_or(-1);
        let node_height = self.node.chain_height().await?;

        if node_height <= db_tip {
            tracing::debug!(db_tip, node_height, "no new blocks");
            self.state = SyncState::Idle;
            return Ok(CycleReport {
                mempool_before,
                rewind: None,
                fetched: 0,
                mempool_after: None,
            });
        }

        // A transaction that is about to confirm must not linger under the
        // pending sentinel while its block lands.
        mempool::clear_pending(&self.store).await?;

        self.state = SyncState::DetectingReorg;
        let rewind = reorg::check_and_rewind(&self.node, &self.store).await?;
        let beg = match &rewind {
            Some(report) => report.fork_height + 1,
            None => db_tip + 1,
        };

        self.state = SyncState::Fetching;
        tracing::info!(from = beg, to = node_height, "fetching blocks");
        let fetched = fetcher::fetch_range(&self.node, &self.store, beg, node_height).await?;

        self.state = SyncState::ReconcilingMempool;
        let mempool_after = mempool::reconcile(&self.node, &self.store).await?;

        self.state = SyncState::Idle;
        Ok(CycleReport {
            mempool_before,
            rewind,
            fetched,
            mempool_after: Some(mempool_after),
        })
    }

    /// Run cycles until `shutdown` flips to `true`.
    ///
    /// Cancellation is cooperative: the flag is checked at the top of each
    /// iteration and raced against the sleeps, never mid-fetch; a block's
    /// write commits or rolls back as a unit either way.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SyncError> {
        loop {
            if *shutdown.borrow() {
                tracing::info!("shutdown requested; stopping sync loop");
                return Ok(());
            }

            let sleep_for = match self.run_cycle().await {
                Ok(report) => {
                    if report.fetched > 0 {
                        tracing::info!(
                            fetched = report.fetched,
                            rewound = report.rewind.is_some(),
                            "sync cycle complete"
                        );
                    }
                    self.state = SyncState::Sleeping;
                    self.config.poll_interval
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "node unreachable; backing off");
                    self.state = SyncState::Backoff;
                    self.config.backoff_interval
                }
                Err(e) => {
                    tracing::error!(error = %e, "fatal sync error");
                    return Err(e);
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = shutdown.changed() => {}
            }
            self.state = SyncState::Idle;
        }
    }
}
