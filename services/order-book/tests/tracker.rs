//! Poll and sweep jobs against a scripted chain

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{d, symbol, Harness};
use order_book::book::PriceIndex;
use order_book::chain::{BlockchainReader, ChainError, StaticBlockchain, TxStatus};
use order_book::store::{TrackerStatus, Tx};
use order_book::{
    MemoryStore, OrderBookStore, PollSummary, StoreError, SwapTracker, TrackerConfig, Transition,
};
use tokio::sync::watch;
use types::ids::{ClientOrderId, OrderId, SwapId, UserId};
use types::order::{Order, Side};
use types::swap::{Swap, SwapTx};

/// Memory store whose tracker sets refuse writes outside a transaction
struct TransactionalTrackingOnly(Arc<MemoryStore>);

fn tracker_set_down() -> StoreError {
    StoreError::CommitFailed("tracker set unavailable".to_string())
}

#[async_trait]
impl OrderBookStore for TransactionalTrackingOnly {
    fn price_index(&self) -> &dyn PriceIndex {
        self.0.price_index()
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        self.0.find_order(id).await
    }

    async fn find_order_by_client_oid(&self, id: &ClientOrderId) -> Result<Option<Order>, StoreError> {
        self.0.find_order_by_client_oid(id).await
    }

    async fn find_orders(&self, ids: &[OrderId]) -> Result<Vec<Option<Order>>, StoreError> {
        self.0.find_orders(ids).await
    }

    async fn user_open_orders(&self, user_id: &UserId) -> Result<Vec<OrderId>, StoreError> {
        self.0.user_open_orders(user_id).await
    }

    async fn user_filled_orders(&self, user_id: &UserId) -> Result<Vec<OrderId>, StoreError> {
        self.0.user_filled_orders(user_id).await
    }

    async fn get_swap(&self, id: &SwapId) -> Result<Option<Swap>, StoreError> {
        self.0.get_swap(id).await
    }

    async fn open_swaps(&self) -> Result<Vec<SwapId>, StoreError> {
        self.0.open_swaps().await
    }

    async fn pending_swaps(&self) -> Result<Vec<SwapTx>, StoreError> {
        self.0.pending_swaps().await
    }

    async fn resolved_swap(&self, id: &SwapId) -> Result<Option<Swap>, StoreError> {
        self.0.resolved_swap(id).await
    }

    async fn user_resolved_swaps(&self, user_id: &UserId) -> Result<Vec<SwapId>, StoreError> {
        self.0.user_resolved_swaps(user_id).await
    }

    async fn track_swap(&self, _status: TrackerStatus, _id: &SwapId) -> Result<bool, StoreError> {
        Err(tracker_set_down())
    }

    async fn is_swap_tracked(&self, status: TrackerStatus, id: &SwapId) -> Result<bool, StoreError> {
        self.0.is_swap_tracked(status, id).await
    }

    async fn untrack_swap(&self, _status: TrackerStatus, _id: &SwapId) -> Result<(), StoreError> {
        Err(tracker_set_down())
    }

    async fn commit(&self, tx: Tx) -> Result<(), StoreError> {
        self.0.commit(tx).await
    }
}

fn tracker(h: &Harness, chain: &Arc<StaticBlockchain>, config: TrackerConfig) -> SwapTracker {
    SwapTracker::new(
        Arc::clone(&h.service),
        Arc::clone(chain) as Arc<dyn BlockchainReader>,
        config,
    )
}

async fn started_swap(h: &Harness, in_amount: &str, tx_hash: &str) -> SwapId {
    let quote = h.service.get_quote(&symbol(), Side::BUY, d(in_amount), None).await.unwrap();
    let begun = h.service.begin_swap(&quote).await.unwrap();
    h.service.swap_started(&begun.swap_id, tx_hash).await.unwrap();
    begun.swap_id
}

#[tokio::test]
async fn test_poll_resolves_final_transactions() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let chain = Arc::new(StaticBlockchain::new());
    let tracker = tracker(&h, &chain, TrackerConfig::default());

    let won = started_swap(&h, "1000", "0xwin").await;
    let lost = started_swap(&h, "2002", "0xlose").await;
    let waiting = started_swap(&h, "1002", "0xwait").await;
    let unknown = started_swap(&h, "1002", "0xunknown").await;
    chain.set_status("0xwin", TxStatus::Success);
    chain.set_status("0xlose", TxStatus::Failure);
    chain.set_status("0xwait", TxStatus::Pending);

    let summary = tracker.check_pending_txs().await.unwrap();
    assert_eq!(
        summary,
        PollSummary {
            checked: 4,
            succeeded: 1,
            failed: 1,
            retained: 2,
            dropped: 0,
            skipped: 0,
        }
    );

    assert!(h.order(&asks[0]).await.unwrap().is_filled());
    let released = h.order(&asks[1]).await.unwrap();
    assert!(released.size_pending.is_zero());
    assert!(released.size_filled.is_zero());

    let remaining: Vec<SwapId> = h
        .store
        .pending_swaps()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.swap_id)
        .collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&waiting));
    assert!(remaining.contains(&unknown));
    assert!(h.service.get_swap(&won).await.unwrap().unwrap().succeeded);
    assert!(!h.service.get_swap(&lost).await.unwrap().unwrap().succeeded);
}

#[tokio::test]
async fn test_lookup_errors_are_retried() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let chain = Arc::new(StaticBlockchain::new());
    let tracker = tracker(&h, &chain, TrackerConfig::default());

    started_swap(&h, "1000", "0xflaky").await;
    chain.set_status("0xflaky", TxStatus::Success);
    chain.fail_lookups("0xflaky", ChainError::Transport("connection refused".to_string()));

    let summary = tracker.check_pending_txs().await.unwrap();
    assert_eq!(summary.retained, 1);
    assert_eq!(h.order(&asks[0]).await.unwrap().size_pending, d("1"));

    chain.clear_failure("0xflaky");
    let summary = tracker.check_pending_txs().await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert!(h.order(&asks[0]).await.unwrap().is_filled());
    assert!(h.store.pending_swaps().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_record_without_swap_is_dropped() {
    let h = Harness::new();
    let chain = Arc::new(StaticBlockchain::new());
    let tracker = tracker(&h, &chain, TrackerConfig::default());

    let orphan = SwapTx::new(SwapId::new(), "0xorphan");
    let mut tx = Tx::begin();
    tx.add_pending_swap(&orphan);
    h.store.commit(tx).await.unwrap();
    chain.set_status("0xorphan", TxStatus::Success);

    let summary = tracker.check_pending_txs().await.unwrap();
    assert_eq!(summary.dropped, 1);
    assert!(h.store.pending_swaps().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_aborts_only_stale_unstarted_swaps() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let chain = Arc::new(StaticBlockchain::new());

    let quote = h.service.get_quote(&symbol(), Side::BUY, d("1000"), None).await.unwrap();
    let idle = h.service.begin_swap(&quote).await.unwrap().swap_id;
    let started = started_swap(&h, "2002", "0xstarted").await;

    // nothing is older than the default timeout yet
    let patient = tracker(&h, &chain, TrackerConfig::default());
    assert_eq!(patient.sweep_unstarted_swaps().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let eager = tracker(
        &h,
        &chain,
        TrackerConfig {
            swap_start_timeout: Duration::ZERO,
            ..TrackerConfig::default()
        },
    );
    assert_eq!(eager.sweep_unstarted_swaps().await.unwrap(), 1);

    assert!(h.store.get_swap(&idle).await.unwrap().is_none());
    assert!(h.store.get_swap(&started).await.unwrap().is_some());
    assert!(h.order(&asks[0]).await.unwrap().size_pending.is_zero());
    assert_eq!(h.order(&asks[1]).await.unwrap().size_pending, d("2"));
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let chain = Arc::new(StaticBlockchain::new());
    let tracker = Arc::new(tracker(
        &h,
        &chain,
        TrackerConfig {
            tick_interval: Duration::from_millis(10),
            sweep_interval: Duration::from_millis(10),
            ..TrackerConfig::default()
        },
    ));

    started_swap(&h, "1000", "0xrun").await;
    chain.set_status("0xrun", TxStatus::Success);

    let (shutdown, signal) = watch::channel(false);
    let handle = tokio::spawn({
        let tracker = Arc::clone(&tracker);
        async move { tracker.run(signal).await }
    });

    tokio::time::timeout(Duration::from_secs(2), async {
        while !h.order(&asks[0]).await.unwrap().is_filled() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_leftover_resolved_entry_does_not_block_settlement() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let chain = Arc::new(StaticBlockchain::new());
    let tracker = tracker(&h, &chain, TrackerConfig::default());

    let swap_id = started_swap(&h, "1000", "0xleftover").await;
    // entry written by a process that died before its commit
    assert!(h.store.track_swap(TrackerStatus::Resolved, &swap_id).await.unwrap());
    chain.set_status("0xleftover", TxStatus::Success);

    let summary = tracker.check_pending_txs().await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 0);

    let order = h.order(&asks[0]).await.unwrap();
    assert!(order.is_filled());
    assert!(order.size_pending.is_zero());
    assert!(h.store.get_swap(&swap_id).await.unwrap().is_none());
    assert!(h.store.pending_swaps().await.unwrap().is_empty());

    let summary = tracker.check_pending_txs().await.unwrap();
    assert_eq!(summary, PollSummary::default());
}

#[tokio::test]
async fn test_already_resolved_swap_counts_as_skipped() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let chain = Arc::new(StaticBlockchain::new());
    let tracker = tracker(&h, &chain, TrackerConfig::default());

    let swap_id = started_swap(&h, "1000", "0xtwice").await;
    assert_eq!(h.service.fill_swap(&swap_id).await.unwrap(), Transition::Applied);
    let commits = h.store.commit_count();

    // a record another tracker read before the resolution removed it
    let mut tx = Tx::begin();
    tx.add_pending_swap(&SwapTx::new(swap_id, "0xtwice"));
    h.store.commit(tx).await.unwrap();
    chain.set_status("0xtwice", TxStatus::Success);

    let summary = tracker.check_pending_txs().await.unwrap();
    assert_eq!(
        summary,
        PollSummary {
            checked: 1,
            succeeded: 0,
            failed: 0,
            retained: 0,
            dropped: 0,
            skipped: 1,
        }
    );
    assert_eq!(h.order(&asks[0]).await.unwrap().size_filled, d("1"));
    assert!(h.store.pending_swaps().await.unwrap().is_empty());
    // the re-added record and its removal; no order or swap writes
    assert_eq!(h.store.commit_count(), commits + 2);
}

#[tokio::test]
async fn test_failed_resolve_settles_next_tick_without_standalone_tracking() {
    let memory = Arc::new(MemoryStore::new());
    let h = Harness::over(
        Arc::new(TransactionalTrackingOnly(Arc::clone(&memory))) as Arc<dyn OrderBookStore>,
        memory,
    );
    let asks = h.seed_asks().await;
    let chain = Arc::new(StaticBlockchain::new());
    let tracker = tracker(&h, &chain, TrackerConfig::default());

    let swap_id = started_swap(&h, "1000", "0xretry").await;
    assert!(h.store.is_tracked(TrackerStatus::Started, &swap_id));
    chain.set_status("0xretry", TxStatus::Success);

    h.store.fail_next_commit();
    let summary = tracker.check_pending_txs().await.unwrap();
    assert_eq!(summary.retained, 1);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(h.order(&asks[0]).await.unwrap().size_pending, d("1"));
    assert!(!h.store.is_tracked(TrackerStatus::Resolved, &swap_id));

    let summary = tracker.check_pending_txs().await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert!(h.order(&asks[0]).await.unwrap().is_filled());
    assert!(h.store.pending_swaps().await.unwrap().is_empty());
    assert!(h.store.is_tracked(TrackerStatus::Resolved, &swap_id));
}

#[tokio::test(start_paused = true)]
async fn test_run_polls_again_after_each_interval() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let chain = Arc::new(StaticBlockchain::new());
    let tracker = Arc::new(tracker(
        &h,
        &chain,
        TrackerConfig {
            tick_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(3600),
            ..TrackerConfig::default()
        },
    ));

    started_swap(&h, "1000", "0xlater").await;
    chain.set_status("0xlater", TxStatus::Pending);

    let (shutdown, signal) = watch::channel(false);
    let handle = tokio::spawn({
        let tracker = Arc::clone(&tracker);
        async move { tracker.run(signal).await }
    });

    // the immediate first tick sees a pending transaction
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.order(&asks[0]).await.unwrap().size_pending, d("1"));

    chain.set_status("0xlater", TxStatus::Success);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(!h.order(&asks[0]).await.unwrap().is_filled());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.order(&asks[0]).await.unwrap().is_filled());

    shutdown.send(true).unwrap();
    handle.await.unwrap();
}
