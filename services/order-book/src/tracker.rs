//! Pending-swap tracker
//!
//! Two periodic jobs keep swaps moving without a caller:
//! - the poll tick asks the chain about every started swap and resolves
//!   the ones whose transaction reached a final status
//! - the sweep aborts swaps nobody started within the start timeout
//!
//! Both are safe to run from several processes at once: a second
//! resolution or abort of the same swap comes back as
//! [`Transition::AlreadyDone`] and is counted as skipped, never as settled.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use types::errors::SwapError;
use types::swap::SwapTx;

use crate::chain::{BlockchainReader, TxStatus};
use crate::config::TrackerConfig;
use crate::error::{BookError, Result};
use crate::service::{OrderBookService, Transition};
use crate::store::perform_tx;

/// What one poll tick did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub checked: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Still pending, unknown to the node, or lookup failed; retried next tick
    pub retained: usize,
    /// Pending records whose swap no longer exists
    pub dropped: usize,
    /// Final on chain but already resolved by someone else; the leftover
    /// record is removed
    pub skipped: usize,
}

pub struct SwapTracker {
    service: Arc<OrderBookService>,
    chain: Arc<dyn BlockchainReader>,
    config: TrackerConfig,
    /// Serializes ticks within one process
    tick: Mutex<()>,
}

impl SwapTracker {
    pub fn new(service: Arc<OrderBookService>, chain: Arc<dyn BlockchainReader>, config: TrackerConfig) -> Self {
        Self {
            service,
            chain,
            config,
            tick: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Look up every outstanding transaction and resolve the final ones
    pub async fn check_pending_txs(&self) -> Result<PollSummary> {
        let _tick = self.tick.lock().await;
        let pending = self.service.store().pending_swaps().await?;
        let mut summary = PollSummary {
            checked: pending.len(),
            ..PollSummary::default()
        };
        if pending.is_empty() {
            return Ok(summary);
        }

        let chain = &self.chain;
        let statuses: Vec<(SwapTx, _)> = stream::iter(pending)
            .map(|record| async move {
                let status = chain.transaction_status(&record.tx_hash).await;
                (record, status)
            })
            .buffer_unordered(self.config.poll_concurrency.max(1))
            .collect()
            .await;

        for (record, status) in statuses {
            let status = match status {
                Ok(status) => status,
                Err(e) => {
                    warn!(swap_id = %record.swap_id, tx_hash = %record.tx_hash, error = %e, "transaction lookup failed");
                    summary.retained += 1;
                    continue;
                }
            };
            match status {
                TxStatus::Pending => summary.retained += 1,
                TxStatus::NotFound => {
                    warn!(swap_id = %record.swap_id, tx_hash = %record.tx_hash, "transaction unknown to node");
                    summary.retained += 1;
                }
                TxStatus::Success | TxStatus::Failure => {
                    let success = status == TxStatus::Success;
                    match self.service.resolve_swap(&record.swap_id, success).await {
                        Ok(Transition::Applied) if success => summary.succeeded += 1,
                        Ok(Transition::Applied) => summary.failed += 1,
                        Ok(Transition::AlreadyDone) => {
                            self.drop_stale(&record, "swap already resolved").await;
                            summary.skipped += 1;
                        }
                        Err(BookError::Swap(SwapError::NotFound { .. })) => {
                            self.drop_stale(&record, "swap no longer exists").await;
                            summary.dropped += 1;
                        }
                        Err(e) => {
                            error!(swap_id = %record.swap_id, %status, error = %e, "failed to resolve swap");
                            summary.retained += 1;
                        }
                    }
                }
            }
        }

        if summary.succeeded + summary.failed + summary.dropped > 0 {
            info!(
                checked = summary.checked,
                succeeded = summary.succeeded,
                failed = summary.failed,
                dropped = summary.dropped,
                skipped = summary.skipped,
                "pending swaps polled"
            );
        } else {
            debug!(checked = summary.checked, skipped = summary.skipped, "pending swaps polled, none settled");
        }
        Ok(summary)
    }

    /// Remove a pending record whose swap has already gone
    async fn drop_stale(&self, record: &SwapTx, reason: &'static str) {
        let removed = perform_tx(self.service.store(), |tx| {
            tx.remove_pending_swap(record);
            Ok(())
        })
        .await;
        match removed {
            Ok(()) => warn!(swap_id = %record.swap_id, reason, "dropped stale pending record"),
            Err(e) => error!(swap_id = %record.swap_id, error = %e, "failed to drop stale pending record"),
        }
    }

    /// Abort swaps never started within the start timeout; returns how many
    pub async fn sweep_unstarted_swaps(&self) -> Result<usize> {
        let timeout = i64::try_from(self.config.swap_start_timeout.as_secs()).unwrap_or(i64::MAX);
        let now = Utc::now();
        let mut aborted = 0;

        for id in self.service.store().open_swaps().await? {
            let Some(swap) = self.service.store().get_swap(&id).await? else {
                continue;
            };
            if swap.is_started() || swap.age_secs(now) <= timeout {
                continue;
            }
            match self.service.abort_swap(&id).await {
                Ok(Transition::Applied) => aborted += 1,
                Ok(Transition::AlreadyDone) => debug!(swap_id = %id, "swap already aborted elsewhere"),
                // started between the read and the abort
                Err(BookError::Swap(SwapError::AlreadyStarted { .. })) => {
                    debug!(swap_id = %id, "swap started before it could be aborted")
                }
                Err(e) => error!(swap_id = %id, error = %e, "failed to abort stale swap"),
            }
        }

        if aborted > 0 {
            info!(aborted, timeout_secs = timeout, "stale swaps aborted");
        }
        Ok(aborted)
    }

    /// Drive both jobs until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut poll = interval(self.config.tick_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick = ?self.config.tick_interval,
            sweep = ?self.config.sweep_interval,
            start_timeout = ?self.config.swap_start_timeout,
            "swap tracker running"
        );
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.check_pending_txs().await {
                        error!(error = %e, "poll tick failed");
                    }
                }
                _ = sweep.tick() => {
                    if let Err(e) = self.sweep_unstarted_swaps().await {
                        error!(error = %e, "sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("swap tracker stopped");
    }
}
