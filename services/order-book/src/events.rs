//! Order-state notifications
//!
//! Every committed order change is published on `user_orders:<userId>` as
//! the order JSON with its derived status; successful fills go out on
//! `user_fills:<userId>`. Publishing is fire-and-forget: a failed publish
//! is logged and never undoes the state change that caused it.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use types::fill::Fill;
use types::ids::UserId;
use types::order::Order;

use crate::error::StoreError;
use crate::keys;

/// Topic-addressed notification sink
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish_event(&self, topic: &str, payload: String) -> Result<(), StoreError>;

    /// Payloads published on `topic` from now on
    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, String>, StoreError>;
}

/// Envelope published for a settled fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillEvent {
    pub user_id: UserId,
    #[serde(flatten)]
    pub fill: Fill,
}

/// Publish an order's current state to its owner; failures are logged only
pub async fn publish_order(sink: &dyn EventSink, order: &Order) {
    let payload = match order.to_event_json() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(order_id = %order.id, error = %e, "failed to encode order event");
            return;
        }
    };
    let topic = keys::user_orders_channel(&order.user_id);
    if let Err(e) = sink.publish_event(&topic, payload).await {
        warn!(order_id = %order.id, topic, error = %e, "failed to publish order event");
    }
}

/// Publish a fill to the maker that owns the order; failures are logged only
pub async fn publish_fill(sink: &dyn EventSink, user_id: UserId, fill: Fill) {
    let order_id = fill.order_id;
    let event = FillEvent { user_id, fill };
    let payload = match serde_json::to_string(&event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(%order_id, error = %e, "failed to encode fill event");
            return;
        }
    };
    let topic = keys::user_fills_channel(&user_id);
    if let Err(e) = sink.publish_event(&topic, payload).await {
        warn!(%order_id, topic, error = %e, "failed to publish fill event");
    }
}

/// In-process sink over a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<(String, String)>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn publish_event(&self, topic: &str, payload: String) -> Result<(), StoreError> {
        // no subscribers is not an error
        let receivers = self.sender.send((topic.to_string(), payload)).unwrap_or(0);
        debug!(topic, receivers, "event published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, String>, StoreError> {
        let receiver = self.sender.subscribe();
        let topic = topic.to_string();
        let events = stream::unfold((receiver, topic), |(mut receiver, topic)| async move {
            loop {
                match receiver.recv().await {
                    Ok((event_topic, payload)) if event_topic == topic => {
                        return Some((payload, (receiver, topic)));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic, skipped, "subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(events.boxed())
    }
}

/// Redis pub/sub sink
#[derive(Clone)]
pub struct RedisEventSink {
    client: Client,
    conn: ConnectionManager,
}

impl RedisEventSink {
    pub fn new(client: Client, conn: ConnectionManager) -> Self {
        Self { client, conn }
    }
}

#[async_trait]
impl EventSink for RedisEventSink {
    async fn publish_event(&self, topic: &str, payload: String) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(topic, payload).await?;
        debug!(topic, receivers, "event published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, String>, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;
        let events = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(channel = msg.get_channel_name(), error = %e, "dropping undecodable message");
                    None
                }
            }
        });
        Ok(events.boxed())
    }
}
