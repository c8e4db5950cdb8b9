//! Cancellation
//!
//! An order locked by an in-flight swap cannot be cancelled; the swap has
//! to resolve or abort first. An unfilled order is erased from every
//! index. A partially filled one keeps its record, marked cancelled, and
//! moves from the resting indices to the owner's filled history.

use tracing::{info, warn};
use types::errors::OrderError;
use types::ids::{ClientOrderId, OrderId, Symbol, UserId};

use super::{CancelOrderInput, OrderBookService};
use crate::error::Result;
use crate::store::perform_tx;

impl OrderBookService {
    pub async fn cancel_order(&self, input: CancelOrderInput) -> Result<OrderId> {
        let found = if input.is_client_oid {
            self.store
                .find_order_by_client_oid(&ClientOrderId::from_uuid(input.id))
                .await?
        } else {
            self.store.find_order(&OrderId::from_uuid(input.id)).await?
        };

        // another user's order is reported as missing
        let mut order = match found {
            Some(order) if order.user_id == input.user_id => order,
            _ => {
                return Err(OrderError::NotFound {
                    order_id: input.id.to_string(),
                }
                .into())
            }
        };

        let order_id = order.id.to_string();
        if order.cancelled {
            return Err(OrderError::Cancelled { order_id }.into());
        }
        if order.is_filled() {
            return Err(OrderError::Filled { order_id }.into());
        }
        if order.is_pending() {
            return Err(OrderError::Pending { order_id }.into());
        }

        order.cancelled = true;
        let unfilled = order.is_unfilled();
        perform_tx(self.store(), |tx| {
            if unfilled {
                tx.remove_order(&mut order)?;
            } else {
                tx.close_order(&mut order)?;
            }
            Ok(())
        })
        .await?;

        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            removed = unfilled,
            size_filled = %order.size_filled,
            "order cancelled"
        );
        self.publish_orders(std::slice::from_ref(&order)).await;
        Ok(order.id)
    }

    /// Cancel every open order of a user, optionally for one symbol.
    ///
    /// Individual failures are logged and skipped; returns the ids that
    /// were cancelled.
    pub async fn cancel_orders_for_user(&self, user_id: &UserId, symbol: Option<&Symbol>) -> Result<Vec<OrderId>> {
        let ids = self.store.user_open_orders(user_id).await?;
        let orders = self.store.find_orders(&ids).await?;

        let mut cancelled = Vec::new();
        for order in orders.into_iter().flatten() {
            if symbol.is_some_and(|s| &order.symbol != s) {
                continue;
            }
            let input = CancelOrderInput {
                id: *order.id.as_uuid(),
                is_client_oid: false,
                user_id: *user_id,
            };
            match self.cancel_order(input).await {
                Ok(id) => cancelled.push(id),
                Err(e) => warn!(order_id = %order.id, user_id = %user_id, error = %e, "skipping order in bulk cancel"),
            }
        }

        info!(user_id = %user_id, cancelled = cancelled.len(), "bulk cancel finished");
        Ok(cancelled)
    }
}
