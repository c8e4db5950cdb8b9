use std::sync::Arc;

use order_book::events::{BroadcastEventSink, EventSink, RedisEventSink};
use order_book::{BookConfig, MemoryStore, OrderBookService, OrderBookStore, RedisStore, StoreBackend};

/// Service wiring for the configured backend
pub struct TrackerState {
    pub backend: StoreBackend,
    pub service: Arc<OrderBookService>,
}

impl TrackerState {
    pub async fn connect(config: BookConfig) -> Result<Self, anyhow::Error> {
        let backend = config.backend;
        let (store, events): (Arc<dyn OrderBookStore>, Arc<dyn EventSink>) = match backend {
            StoreBackend::Redis => {
                let store = RedisStore::connect(&config.redis_url).await?;
                let events = RedisEventSink::new(store.client().clone(), store.connection());
                (Arc::new(store), Arc::new(events))
            }
            StoreBackend::Memory => {
                tracing::warn!("Running against an in-process store; swaps from other processes are invisible");
                (Arc::new(MemoryStore::new()), Arc::new(BroadcastEventSink::default()))
            }
        };

        Ok(Self {
            backend,
            service: Arc::new(OrderBookService::new(store, events, config)),
        })
    }
}
