//! Swap lifecycle
//!
//! ```text
//! quoted ──begin_swap──▶ pending ──swap_started──▶ started ──resolve_swap──▶ resolved
//!                          │
//!                          └──abort_swap (never started)──▶ aborted
//! ```
//!
//! Every transition is one transaction. Orders are re-validated and locked
//! against the versions just read, so two swaps racing for the same
//! liquidity cannot both commit. Start, resolve and abort add the swap to
//! their tracker set inside the transition's own transaction, so an entry
//! exists exactly when the transition committed. Repeats are detected from
//! the stored state and reported as [`Transition::AlreadyDone`].

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use types::errors::SwapError;
use types::fill::Fill;
use types::ids::{OrderId, SwapId, UserId};
use types::order::Order;
use types::swap::{BeginSwapResult, OrderFrag, QuoteResult, Swap, SwapTx};

use super::{OrderBookService, Transition};
use crate::error::{BookError, Result};
use crate::events;
use crate::store::{perform_tx, IndexOp, TrackerStatus, Tx};

/// What a settled or released order needs in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Still resting (or still locked): rewrite the record
    Update,
    /// Done trading but worth keeping: filled, or cancelled after a partial fill
    Close,
    /// Cancelled without ever filling: erase it
    Remove,
}

impl Disposition {
    fn of(order: &Order) -> Self {
        if order.is_pending() {
            Disposition::Update
        } else if order.is_filled() {
            Disposition::Close
        } else if order.cancelled {
            if order.is_unfilled() {
                Disposition::Remove
            } else {
                Disposition::Close
            }
        } else {
            Disposition::Update
        }
    }

    fn stage(self, tx: &mut Tx, order: &mut Order) -> Result<()> {
        match self {
            Disposition::Update => tx.modify_order(IndexOp::Update, order)?,
            Disposition::Close => tx.close_order(order)?,
            Disposition::Remove => tx.remove_order(order)?,
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> BookError {
    SwapError::Invalid { reason: reason.into() }.into()
}

fn already_started(swap_id: &SwapId) -> BookError {
    SwapError::AlreadyStarted {
        swap_id: swap_id.to_string(),
    }
    .into()
}

fn not_found(swap_id: &SwapId) -> BookError {
    SwapError::NotFound {
        swap_id: swap_id.to_string(),
    }
    .into()
}

impl OrderBookService {
    /// Load the orders behind `frags`, index-aligned; a missing order is
    /// index corruption
    async fn load_frag_orders(&self, frags: &[OrderFrag]) -> Result<Vec<Order>> {
        let ids: Vec<OrderId> = frags.iter().map(|frag| frag.order_id).collect();
        let found = self.store.find_orders(&ids).await?;
        ids.iter()
            .zip(found)
            .map(|(id, order)| order.ok_or_else(|| BookError::Unexpected(format!("order {id} referenced by swap is missing"))))
            .collect()
    }

    /// Validate a quote's fragments against current order state and lock
    /// their sizes, all or nothing
    pub async fn begin_swap(&self, quote: &QuoteResult) -> Result<BeginSwapResult> {
        if quote.frags.is_empty() {
            return Err(invalid("quote has no fragments"));
        }
        let mut distinct = HashSet::new();
        if let Some(dup) = quote.frags.iter().find(|frag| !distinct.insert(frag.order_id)) {
            return Err(invalid(format!("order {} appears twice", dup.order_id)));
        }

        let mut orders = self.load_frag_orders(&quote.frags).await?;
        let maker_side = quote.side.opposite();
        for (frag, order) in quote.frags.iter().zip(orders.iter_mut()) {
            if order.symbol != quote.symbol || order.side != maker_side {
                return Err(invalid(format!("order {} is not a {} {} order", order.id, order.symbol, maker_side)));
            }
            if order.is_filled() {
                return Err(invalid(format!("order {} is already filled", order.id)));
            }
            let size = order.frag_atoken_size(frag);
            if order.available_size() < size {
                debug!(
                    order_id = %order.id,
                    available = %order.available_size(),
                    required = %size,
                    "fragment exceeds available size"
                );
                return Err(invalid(format!("order {} has insufficient available size", order.id)));
            }
            order.lock(frag).map_err(|e| invalid(e.to_string()))?;
        }

        let swap = Swap::new(quote.symbol.clone(), quote.side, quote.frags.clone(), Utc::now());
        perform_tx(self.store(), |tx| {
            for order in orders.iter_mut() {
                tx.modify_order(IndexOp::Update, order)?;
            }
            tx.store_swap(&swap);
            Ok(())
        })
        .await?;

        info!(
            swap_id = %swap.id,
            symbol = %swap.symbol,
            side = %swap.side,
            frags = swap.frags.len(),
            out_amount = %quote.out_amount,
            "swap begun"
        );
        self.publish_orders(&orders).await;

        Ok(BeginSwapResult {
            swap_id: swap.id,
            out_amount: quote.out_amount,
            orders,
            frags: quote.frags.clone(),
        })
    }

    /// Record the on-chain submission of a swap; at most once per swap
    pub async fn swap_started(&self, swap_id: &SwapId, tx_hash: &str) -> Result<Swap> {
        let Some(mut swap) = self.store.get_swap(swap_id).await? else {
            return Err(self.missing_swap(swap_id).await);
        };
        if swap.is_started() {
            return Err(already_started(swap_id));
        }

        swap.started = Some(Utc::now());
        swap.tx_hash = Some(tx_hash.to_string());
        let pending = SwapTx::new(*swap_id, tx_hash);
        let committed = perform_tx(self.store(), |tx| {
            tx.guard_swap_not_started(*swap_id);
            tx.store_swap(&swap);
            tx.add_pending_swap(&pending);
            tx.track_swap(TrackerStatus::Started, *swap_id);
            Ok(())
        })
        .await;

        if let Err(e) = committed {
            // lost a race: report what the winner did
            if e.is_conflict() {
                return match self.store.get_swap(swap_id).await? {
                    Some(current) if current.is_started() => Err(already_started(swap_id)),
                    Some(_) => Err(e),
                    None => Err(self.missing_swap(swap_id).await),
                };
            }
            return Err(e);
        }
        info!(swap_id = %swap_id, tx_hash, "swap started");
        Ok(swap)
    }

    /// Why a swap is gone: resolved (archived) or never existed / aborted
    async fn missing_swap(&self, swap_id: &SwapId) -> BookError {
        match self.store.resolved_swap(swap_id).await {
            Ok(Some(_)) => SwapError::AlreadyResolved {
                swap_id: swap_id.to_string(),
            }
            .into(),
            Ok(None) => not_found(swap_id),
            Err(e) => e.into(),
        }
    }

    /// Apply the final on-chain outcome of a swap.
    ///
    /// Success moves each fragment from pending to filled; failure releases
    /// the locks. Either way the swap is archived, its pending record
    /// removed and its `resolved` tracker entry added in the same
    /// transaction. A swap already resolved is reported as
    /// [`Transition::AlreadyDone`] without touching the store.
    pub async fn resolve_swap(&self, swap_id: &SwapId, success: bool) -> Result<Transition> {
        let Some(swap) = self.store.get_swap(swap_id).await? else {
            return self.resolved_or_missing(swap_id).await;
        };
        match self.resolve_loaded(swap, success).await {
            Err(e) if e.is_conflict() => {
                if self.store.resolved_swap(swap_id).await?.is_some() {
                    debug!(swap_id = %swap_id, "swap resolved concurrently");
                    return Ok(Transition::AlreadyDone);
                }
                Err(e)
            }
            outcome => outcome,
        }
    }

    async fn resolved_or_missing(&self, swap_id: &SwapId) -> Result<Transition> {
        if self.store.resolved_swap(swap_id).await?.is_some() {
            debug!(swap_id = %swap_id, "swap already resolved, skipping");
            return Ok(Transition::AlreadyDone);
        }
        Err(not_found(swap_id))
    }

    async fn resolve_loaded(&self, mut swap: Swap, success: bool) -> Result<Transition> {
        let mut orders = self.load_frag_orders(&swap.frags).await?;

        for (frag, order) in swap.frags.iter().zip(orders.iter_mut()) {
            if success {
                order.fill(frag)?;
            } else {
                order.unlock(frag)?;
            }
        }

        let now = Utc::now();
        swap.mined.get_or_insert(now);
        swap.resolved = Some(now);
        swap.succeeded = success;
        let pending = swap.tx_hash.as_deref().map(|hash| SwapTx::new(swap.id, hash));
        let users: Vec<UserId> = orders
            .iter()
            .map(|order| order.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        perform_tx(self.store(), |tx| {
            tx.guard_swap_exists(swap.id);
            for order in orders.iter_mut() {
                Disposition::of(order).stage(tx, order)?;
            }
            tx.remove_swap(swap.id);
            if let Some(pending) = &pending {
                tx.remove_pending_swap(pending);
            }
            tx.archive_resolved_swap(&swap, users);
            tx.track_swap(TrackerStatus::Resolved, swap.id);
            Ok(())
        })
        .await?;

        info!(
            swap_id = %swap.id,
            success,
            orders = orders.len(),
            "swap resolved"
        );
        self.publish_orders(&orders).await;
        if success {
            for (frag, order) in swap.frags.iter().zip(orders.iter()) {
                events::publish_fill(self.events.as_ref(), order.user_id, Fill::new(&swap, frag, order)).await;
            }
        }
        Ok(Transition::Applied)
    }

    /// Settle a swap whose transaction is known to have succeeded
    pub async fn fill_swap(&self, swap_id: &SwapId) -> Result<Transition> {
        self.resolve_swap(swap_id, true).await
    }

    /// Release a swap that never started. Aborting twice is a no-op
    /// reported as [`Transition::AlreadyDone`].
    pub async fn abort_swap(&self, swap_id: &SwapId) -> Result<Transition> {
        let Some(swap) = self.store.get_swap(swap_id).await? else {
            return self.aborted_or_missing(swap_id).await;
        };
        if swap.is_started() {
            return Err(already_started(swap_id));
        }
        match self.abort_loaded(swap).await {
            Err(e) if e.is_conflict() => match self.store.get_swap(swap_id).await? {
                Some(current) if current.is_started() => Err(already_started(swap_id)),
                Some(_) => Err(e),
                None => self.aborted_or_missing(swap_id).await,
            },
            outcome => outcome,
        }
    }

    async fn aborted_or_missing(&self, swap_id: &SwapId) -> Result<Transition> {
        if self.store.is_swap_tracked(TrackerStatus::Aborted, swap_id).await? {
            debug!(swap_id = %swap_id, "swap already aborted, skipping");
            return Ok(Transition::AlreadyDone);
        }
        Err(not_found(swap_id))
    }

    async fn abort_loaded(&self, swap: Swap) -> Result<Transition> {
        let ids: Vec<OrderId> = swap.order_ids().collect();
        let found = self.store.find_orders(&ids).await?;
        let mut orders = Vec::with_capacity(found.len());
        for (frag, order) in swap.frags.iter().zip(found) {
            let Some(mut order) = order else {
                error!(swap_id = %swap.id, order_id = %frag.order_id, "order missing while aborting swap");
                continue;
            };
            order.unlock(frag)?;
            orders.push(order);
        }

        perform_tx(self.store(), |tx| {
            tx.guard_swap_not_started(swap.id);
            for order in orders.iter_mut() {
                Disposition::of(order).stage(tx, order)?;
            }
            tx.remove_swap(swap.id);
            tx.track_swap(TrackerStatus::Aborted, swap.id);
            Ok(())
        })
        .await?;

        let age = swap.age_secs(Utc::now());
        if age > 0 {
            info!(swap_id = %swap.id, age_secs = age, orders = orders.len(), "swap aborted");
        } else {
            warn!(swap_id = %swap.id, orders = orders.len(), "swap aborted right after creation");
        }
        self.publish_orders(&orders).await;
        Ok(Transition::Applied)
    }
}
