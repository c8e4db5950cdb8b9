//! Settlement records
//!
//! A [`Fill`] describes how much of one maker order a resolved swap
//! settled. Fills are published to the maker on success; they are not
//! persisted separately from the order's `size_filled`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ClientOrderId, OrderId, SwapId, Symbol};
use crate::numeric::{Price, Size};
use crate::order::{Order, Side};
use crate::swap::{OrderFrag, Swap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub order_id: OrderId,
    pub client_order_id: ClientOrderId,
    pub swap_id: SwapId,
    pub side: Side,
    pub symbol: Symbol,
    pub mined: Option<DateTime<Utc>>,
    pub resolved: Option<DateTime<Utc>>,
    pub price: Price,
    /// Base-token amount settled by this fill
    pub size: Size,
    /// Original size of the maker order
    pub order_size: Size,
}

impl Fill {
    pub fn new(swap: &Swap, frag: &OrderFrag, order: &Order) -> Self {
        Self {
            order_id: frag.order_id,
            client_order_id: order.client_order_id,
            swap_id: swap.id,
            side: order.side,
            symbol: order.symbol.clone(),
            mined: swap.mined,
            resolved: swap.resolved,
            price: order.price,
            size: order.frag_atoken_size(frag),
            order_size: order.size,
        }
    }
}
