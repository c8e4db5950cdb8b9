//! Racing swaps over the same liquidity
//!
//! A commit delay widens the window between validation and commit so
//! every racer reads the same order version before anyone writes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{d, symbol, Harness};
use futures::future::join_all;
use order_book::{BookError, CancelOrderInput, ErrorKind, OrderBookStore, Transition};
use rust_decimal::Decimal;
use types::errors::SwapError;
use types::order::Side;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_begin_swaps_never_overlock() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let quote = h.service.get_quote(&symbol(), Side::BUY, d("500"), None).await.unwrap();
    assert_eq!(quote.frags.len(), 1);

    h.store.set_commit_delay(Some(Duration::from_millis(20)));
    let racers = (0..8).map(|_| {
        let service = Arc::clone(&h.service);
        let quote = quote.clone();
        tokio::spawn(async move { service.begin_swap(&quote).await })
    });
    let results: Vec<_> = join_all(racers).await.into_iter().map(|r| r.unwrap()).collect();
    h.store.set_commit_delay(None);

    let won = results.iter().filter(|r| r.is_ok()).count();
    assert!(won >= 1);
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(result.is_conflict(), "unexpected error: {result}");
    }

    let order = h.order(&asks[0]).await.unwrap();
    assert!(order.check_invariant());
    assert!(order.size_pending <= order.size - order.size_filled);
    assert_eq!(order.size_pending, d("0.5") * Decimal::from(won as u64));
    assert_eq!(h.store.open_swaps().await.unwrap().len(), won);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_size_race_has_one_winner() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let quote = h.service.get_quote(&symbol(), Side::BUY, d("6008"), None).await.unwrap();

    h.store.set_commit_delay(Some(Duration::from_millis(20)));
    let racers = (0..6).map(|_| {
        let service = Arc::clone(&h.service);
        let quote = quote.clone();
        tokio::spawn(async move { service.begin_swap(&quote).await })
    });
    let results: Vec<_> = join_all(racers).await.into_iter().map(|r| r.unwrap()).collect();
    h.store.set_commit_delay(None);

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for original in &asks {
        let order = h.order(original).await.unwrap();
        assert_eq!(order.size_pending, original.size);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_racing_begin_swap() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let quote = h.service.get_quote(&symbol(), Side::BUY, d("1000"), None).await.unwrap();
    let cancel = CancelOrderInput {
        id: *asks[0].id.as_uuid(),
        is_client_oid: false,
        user_id: asks[0].user_id,
    };

    h.store.set_commit_delay(Some(Duration::from_millis(20)));
    let swap = {
        let service = Arc::clone(&h.service);
        let quote = quote.clone();
        tokio::spawn(async move { service.begin_swap(&quote).await })
    };
    let cancelled = {
        let service = Arc::clone(&h.service);
        tokio::spawn(async move { service.cancel_order(cancel).await })
    };
    let (swap, cancelled) = (swap.await.unwrap(), cancelled.await.unwrap());
    h.store.set_commit_delay(None);

    // exactly one of the two wins
    assert!(swap.is_ok() != cancelled.is_ok());
    let loser = swap.err().or(cancelled.err()).unwrap();
    assert!(
        matches!(loser.kind(), ErrorKind::Conflict | ErrorKind::Unexpected),
        "unexpected error: {loser}"
    );

    match h.order(&asks[0]).await {
        Some(order) => {
            assert!(!order.cancelled);
            assert_eq!(order.size_pending, d("1"));
        }
        None => assert!(h.store.open_swaps().await.unwrap().is_empty()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_resolves_apply_once() {
    let h = Harness::new();
    let asks = h.seed_asks().await;
    let quote = h.service.get_quote(&symbol(), Side::BUY, d("3002"), None).await.unwrap();
    let begun = h.service.begin_swap(&quote).await.unwrap();
    h.service.swap_started(&begun.swap_id, "0xrace").await.unwrap();

    h.store.set_commit_delay(Some(Duration::from_millis(20)));
    let racers = (0..6).map(|_| {
        let service = Arc::clone(&h.service);
        let swap_id = begun.swap_id;
        tokio::spawn(async move { service.resolve_swap(&swap_id, true).await })
    });
    let results: Vec<_> = join_all(racers).await.into_iter().map(|r| r.unwrap().unwrap()).collect();
    h.store.set_commit_delay(None);

    assert_eq!(results.iter().filter(|t| t.is_applied()).count(), 1);
    assert!(results.iter().all(|t| matches!(t, Transition::Applied | Transition::AlreadyDone)));

    assert!(h.order(&asks[0]).await.unwrap().is_filled());
    assert_eq!(h.order(&asks[1]).await.unwrap().size_filled, d("2"));
    assert!(h.order(&asks[1]).await.unwrap().size_pending.is_zero());
    assert!(h.store.pending_swaps().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_starts_have_one_winner() {
    let h = Harness::new();
    h.seed_asks().await;
    let quote = h.service.get_quote(&symbol(), Side::BUY, d("1000"), None).await.unwrap();
    let begun = h.service.begin_swap(&quote).await.unwrap();

    h.store.set_commit_delay(Some(Duration::from_millis(20)));
    let racers = (0..4).map(|i| {
        let service = Arc::clone(&h.service);
        let swap_id = begun.swap_id;
        tokio::spawn(async move { service.swap_started(&swap_id, &format!("0xstart{i}")).await })
    });
    let results: Vec<_> = join_all(racers).await.into_iter().map(|r| r.unwrap()).collect();
    h.store.set_commit_delay(None);

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, BookError::Swap(SwapError::AlreadyStarted { .. })), "unexpected error: {err}");
    }
    assert_eq!(h.store.pending_swaps().await.unwrap().len(), 1);
}
