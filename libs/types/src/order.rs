//! Resting limit orders
//!
//! Size accounting invariants, enforced by every mutator here:
//! - `0 <= size_filled <= size`
//! - `0 <= size_pending <= size - size_filled`
//! - `available_size = size - size_filled - size_pending >= 0`
//!
//! `size_pending` only moves through [`Order::lock`], [`Order::unlock`] and
//! [`Order::fill`], all of which take the committed amount from a swap
//! fragment in base-token units.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{OrderError, RecordError};
use crate::ids::{ClientOrderId, OrderId, Symbol, UserId};
use crate::numeric::{is_positive, Price, Size};
use crate::swap::OrderFrag;

/// Order side (buyer or seller of the base token)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::BUY => "buy",
            Side::SELL => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::BUY),
            "sell" => Ok(Side::SELL),
            other => Err(format!("unknown side {other}")),
        }
    }
}

/// Externally visible order status, derived from the size fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Open,
    Pending,
    Filled,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// A resting limit order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "orderId")]
    pub id: OrderId,
    pub client_order_id: ClientOrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    pub size: Size,
    #[serde(rename = "filledSize")]
    pub size_filled: Size,
    #[serde(rename = "pendingSize")]
    pub size_pending: Size,
    pub cancelled: bool,
    pub timestamp: DateTime<Utc>,
    /// Optimistic locking, bumped on every persisted update
    pub version: u64,
}

impl Order {
    /// Create a new open order, rejecting non-positive price or size
    pub fn try_new(
        user_id: UserId,
        client_order_id: ClientOrderId,
        symbol: Symbol,
        side: Side,
        price: Price,
        size: Size,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if !is_positive(price) {
            return Err(OrderError::InvalidPrice(price.to_string()));
        }
        if !is_positive(size) {
            return Err(OrderError::InvalidSize(size.to_string()));
        }

        Ok(Self {
            id: OrderId::new(),
            client_order_id,
            user_id,
            symbol,
            side,
            price,
            size,
            size_filled: Decimal::ZERO,
            size_pending: Decimal::ZERO,
            cancelled: false,
            timestamp,
            version: 0,
        })
    }

    /// Size neither filled nor locked by a swap
    pub fn available_size(&self) -> Size {
        self.size - self.size_filled - self.size_pending
    }

    pub fn is_pending(&self) -> bool {
        self.size_pending > Decimal::ZERO
    }

    pub fn is_filled(&self) -> bool {
        self.size_filled == self.size
    }

    pub fn is_unfilled(&self) -> bool {
        self.size_filled.is_zero()
    }

    pub fn is_partial_filled(&self) -> bool {
        self.size_filled > Decimal::ZERO && self.size_filled < self.size
    }

    pub fn is_open(&self) -> bool {
        !self.is_filled() && !self.cancelled
    }

    /// Whether a quote walk may consume this order
    pub fn is_matchable(&self) -> bool {
        !self.cancelled && is_positive(self.available_size())
    }

    pub fn status(&self) -> OrderStatus {
        if self.cancelled {
            OrderStatus::Cancelled
        } else if self.is_filled() {
            OrderStatus::Filled
        } else if self.is_pending() {
            OrderStatus::Pending
        } else {
            OrderStatus::Open
        }
    }

    /// Check the size accounting invariant
    pub fn check_invariant(&self) -> bool {
        self.size_filled >= Decimal::ZERO
            && self.size_pending >= Decimal::ZERO
            && self.size_filled + self.size_pending <= self.size
    }

    /// Base-token amount a fragment commits from this order.
    ///
    /// Fragments are seen from the taker: a maker BUY receives the taker's
    /// base token (`in_size`), a maker SELL hands base token out (`out_size`).
    pub fn frag_atoken_size(&self, frag: &OrderFrag) -> Size {
        match self.side {
            Side::BUY => frag.in_size,
            Side::SELL => frag.out_size,
        }
    }

    /// Reserve a fragment's size for an in-flight swap
    pub fn lock(&mut self, frag: &OrderFrag) -> Result<(), OrderError> {
        let size = self.frag_atoken_size(frag);
        if self.cancelled {
            return Err(OrderError::Cancelled {
                order_id: self.id.to_string(),
            });
        }
        if self.available_size() < size {
            return Err(OrderError::InsufficientAvailable {
                order_id: self.id.to_string(),
                required: size.to_string(),
                available: self.available_size().to_string(),
            });
        }

        self.size_pending += size;
        Ok(())
    }

    /// Release a fragment's reservation
    pub fn unlock(&mut self, frag: &OrderFrag) -> Result<(), OrderError> {
        let size = self.frag_atoken_size(frag);
        if self.size_pending < size {
            return Err(OrderError::UnexpectedSizePending {
                order_id: self.id.to_string(),
                pending: self.size_pending.to_string(),
                requested: size.to_string(),
            });
        }

        self.size_pending -= size;
        Ok(())
    }

    /// Settle a fragment, moving its size from pending to filled.
    ///
    /// Returns whether the order is now completely filled.
    pub fn fill(&mut self, frag: &OrderFrag) -> Result<bool, OrderError> {
        let size = self.frag_atoken_size(frag);
        if self.size_filled + size > self.size {
            return Err(OrderError::UnexpectedSizeFilled {
                order_id: self.id.to_string(),
                size: self.size.to_string(),
                filled: self.size_filled.to_string(),
                requested: size.to_string(),
            });
        }
        if size > self.size_pending {
            return Err(OrderError::UnexpectedSizePending {
                order_id: self.id.to_string(),
                pending: self.size_pending.to_string(),
                requested: size.to_string(),
            });
        }

        self.size_filled += size;
        self.size_pending -= size;
        Ok(self.is_filled())
    }

    /// Flatten into the field map persisted as the order hash
    pub fn to_record(&self) -> Vec<(&'static str, String)> {
        vec![
            ("id", self.id.to_string()),
            ("clientOId", self.client_order_id.to_string()),
            ("userId", self.user_id.to_string()),
            ("symbol", self.symbol.to_string()),
            ("side", self.side.to_string()),
            ("price", self.price.to_string()),
            ("size", self.size.to_string()),
            ("sizeFilled", self.size_filled.to_string()),
            ("sizePending", self.size_pending.to_string()),
            ("cancelled", self.cancelled.to_string()),
            (
                "timestamp",
                self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            ),
            ("version", self.version.to_string()),
        ]
    }

    /// Rebuild an order from its persisted field map
    pub fn from_record(data: &HashMap<String, String>) -> Result<Self, RecordError> {
        if data.is_empty() {
            return Err(RecordError::Empty);
        }

        let field = |name: &'static str| -> Result<&str, RecordError> {
            data.get(name)
                .map(String::as_str)
                .ok_or(RecordError::MissingField(name))
        };
        let invalid = |name: &'static str, reason: String| RecordError::InvalidField {
            field: name,
            reason,
        };
        let decimal = |name: &'static str| -> Result<Decimal, RecordError> {
            Decimal::from_str(field(name)?).map_err(|e| invalid(name, e.to_string()))
        };

        Ok(Self {
            id: field("id")?.parse().map_err(|e: uuid::Error| invalid("id", e.to_string()))?,
            client_order_id: field("clientOId")?
                .parse()
                .map_err(|e: uuid::Error| invalid("clientOId", e.to_string()))?,
            user_id: field("userId")?
                .parse()
                .map_err(|e: uuid::Error| invalid("userId", e.to_string()))?,
            symbol: field("symbol")?
                .parse()
                .map_err(|e: crate::errors::SymbolError| invalid("symbol", e.to_string()))?,
            side: field("side")?.parse().map_err(|e| invalid("side", e))?,
            price: decimal("price")?,
            size: decimal("size")?,
            size_filled: decimal("sizeFilled")?,
            size_pending: decimal("sizePending")?,
            cancelled: field("cancelled")?
                .parse()
                .map_err(|e: std::str::ParseBoolError| invalid("cancelled", e.to_string()))?,
            timestamp: DateTime::parse_from_rfc3339(field("timestamp")?)
                .map_err(|e| invalid("timestamp", e.to_string()))?
                .with_timezone(&Utc),
            version: field("version")?
                .parse()
                .map_err(|e: std::num::ParseIntError| invalid("version", e.to_string()))?,
        })
    }

    /// Notification payload: the order JSON plus its derived status
    pub fn to_event_json(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert("status".to_string(), serde_json::to_value(self.status())?);
        }
        serde_json::to_string(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn create_order(side: Side, price: &str, size: &str) -> Order {
        Order::try_new(
            UserId::new(),
            ClientOrderId::new(),
            Symbol::try_new("ETH-USDC").unwrap(),
            side,
            d(price),
            d(size),
            Utc.timestamp_opt(1708123456, 789_000_000).unwrap(),
        )
        .unwrap()
    }

    fn frag(order: &Order, a_size: &str) -> OrderFrag {
        match order.side {
            Side::SELL => OrderFrag::new(order.id, order.price * d(a_size), d(a_size)),
            Side::BUY => OrderFrag::new(order.id, d(a_size), order.price * d(a_size)),
        }
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::BUY.opposite(), Side::SELL);
        assert_eq!(Side::SELL.opposite(), Side::BUY);
    }

    #[test]
    fn test_side_parse() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::BUY);
        assert_eq!("SELL".parse::<Side>().unwrap(), Side::SELL);
        assert!("hold".parse::<Side>().is_err());
    }

    #[test]
    fn test_order_rejects_non_positive() {
        let symbol = Symbol::try_new("ETH-USDC").unwrap();
        let now = Utc::now();
        let zero_price = Order::try_new(
            UserId::new(),
            ClientOrderId::new(),
            symbol.clone(),
            Side::BUY,
            Decimal::ZERO,
            d("1"),
            now,
        );
        assert!(matches!(zero_price, Err(OrderError::InvalidPrice(_))));

        let negative_size = Order::try_new(
            UserId::new(),
            ClientOrderId::new(),
            symbol,
            Side::BUY,
            d("1"),
            d("-1"),
            now,
        );
        assert!(matches!(negative_size, Err(OrderError::InvalidSize(_))));
    }

    #[test]
    fn test_order_creation() {
        let order = create_order(Side::SELL, "1000", "1");
        assert_eq!(order.status(), OrderStatus::Open);
        assert_eq!(order.available_size(), d("1"));
        assert!(order.is_unfilled());
        assert!(!order.is_pending());
        assert!(order.is_open());
        assert!(order.check_invariant());
    }

    #[test]
    fn test_frag_atoken_size_follows_maker_side() {
        let ask = create_order(Side::SELL, "1000", "1");
        let bid = create_order(Side::BUY, "1000", "1");
        let f = OrderFrag::new(ask.id, d("500"), d("0.5"));
        assert_eq!(ask.frag_atoken_size(&f), d("0.5"));
        let f = OrderFrag::new(bid.id, d("0.5"), d("500"));
        assert_eq!(bid.frag_atoken_size(&f), d("0.5"));
    }

    #[test]
    fn test_lock_unlock() {
        let mut order = create_order(Side::SELL, "1000", "1");
        let f = frag(&order, "0.4");

        order.lock(&f).unwrap();
        assert_eq!(order.size_pending, d("0.4"));
        assert_eq!(order.available_size(), d("0.6"));
        assert_eq!(order.status(), OrderStatus::Pending);

        order.unlock(&f).unwrap();
        assert_eq!(order.size_pending, Decimal::ZERO);
        assert_eq!(order.available_size(), d("1"));
    }

    #[test]
    fn test_lock_more_than_available_fails() {
        let mut order = create_order(Side::SELL, "1000", "1");
        order.lock(&frag(&order, "0.7")).unwrap();

        let err = order.lock(&frag(&order, "0.5")).unwrap_err();
        assert!(matches!(err, OrderError::InsufficientAvailable { .. }));
        assert_eq!(order.size_pending, d("0.7"));
    }

    #[test]
    fn test_lock_cancelled_fails() {
        let mut order = create_order(Side::BUY, "1000", "1");
        order.cancelled = true;
        let err = order.lock(&frag(&order, "0.1")).unwrap_err();
        assert!(matches!(err, OrderError::Cancelled { .. }));
    }

    #[test]
    fn test_unlock_more_than_pending_fails() {
        let mut order = create_order(Side::SELL, "1000", "1");
        order.lock(&frag(&order, "0.2")).unwrap();
        let err = order.unlock(&frag(&order, "0.3")).unwrap_err();
        assert!(matches!(err, OrderError::UnexpectedSizePending { .. }));
    }

    #[test]
    fn test_fill_partial_then_complete() {
        let mut order = create_order(Side::SELL, "1000", "1");
        let first = frag(&order, "0.3");
        order.lock(&first).unwrap();
        assert!(!order.fill(&first).unwrap());
        assert!(order.is_partial_filled());
        assert_eq!(order.size_pending, Decimal::ZERO);

        let rest = frag(&order, "0.7");
        order.lock(&rest).unwrap();
        assert!(order.fill(&rest).unwrap());
        assert!(order.is_filled());
        assert_eq!(order.status(), OrderStatus::Filled);
        assert!(!order.is_open());
    }

    #[test]
    fn test_fill_without_pending_fails() {
        let mut order = create_order(Side::SELL, "1000", "1");
        let err = order.fill(&frag(&order, "0.5")).unwrap_err();
        assert!(matches!(err, OrderError::UnexpectedSizePending { .. }));
    }

    #[test]
    fn test_overfill_fails() {
        let mut order = create_order(Side::SELL, "1000", "1");
        order.size_pending = d("0.5");
        order.size_filled = d("0.8");
        let err = order.fill(&frag(&order, "0.5")).unwrap_err();
        assert!(matches!(err, OrderError::UnexpectedSizeFilled { .. }));
    }

    #[test]
    fn test_status_cancelled_wins() {
        let mut order = create_order(Side::BUY, "1000", "1");
        order.size_filled = d("0.5");
        order.cancelled = true;
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(!order.is_matchable());
    }

    #[test]
    fn test_record_round_trip() {
        let mut order = create_order(Side::BUY, "3000.50", "2.500");
        order.size_filled = d("0.000000000000000001");
        order.size_pending = d("1.25");
        order.version = 7;

        let record: HashMap<String, String> = order
            .to_record()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let decoded = Order::from_record(&record).unwrap();

        assert_eq!(decoded, order);
        assert_eq!(decoded.size.to_string(), "2.500");
        assert_eq!(decoded.timestamp, order.timestamp);
    }

    #[test]
    fn test_from_record_missing_field() {
        let order = create_order(Side::BUY, "1", "1");
        let mut record: HashMap<String, String> = order
            .to_record()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        record.remove("sizePending");
        assert_eq!(
            Order::from_record(&record),
            Err(RecordError::MissingField("sizePending"))
        );
        assert_eq!(Order::from_record(&HashMap::new()), Err(RecordError::Empty));
    }

    #[test]
    fn test_event_json_carries_status() {
        let mut order = create_order(Side::SELL, "1000", "1");
        order.lock(&frag(&order, "0.1")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&order.to_event_json().unwrap()).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["pendingSize"], "0.1");
        assert_eq!(json["side"], "SELL");
    }

    #[derive(Debug, Clone)]
    enum Step {
        Lock(u32),
        Unlock(u32),
        Fill(u32),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (1u32..600).prop_map(Step::Lock),
            (1u32..600).prop_map(Step::Unlock),
            (1u32..600).prop_map(Step::Fill),
        ]
    }

    proptest! {
        #[test]
        fn prop_size_invariant_holds(steps in proptest::collection::vec(step(), 1..40)) {
            let mut order = create_order(Side::SELL, "1000", "1");
            for s in steps {
                // sizes in thousandths of a base token
                let before = order.clone();
                let result = match s {
                    Step::Lock(n) => order.lock(&frag(&before, &format!("0.{:03}", n))).map(|_| ()),
                    Step::Unlock(n) => order.unlock(&frag(&before, &format!("0.{:03}", n))),
                    Step::Fill(n) => order.fill(&frag(&before, &format!("0.{:03}", n))).map(|_| ()),
                };
                if result.is_err() {
                    prop_assert_eq!(&order, &before);
                }
                prop_assert!(order.check_invariant());
                prop_assert!(order.available_size() >= Decimal::ZERO);
            }
        }

        #[test]
        fn prop_record_round_trip(
            price in 1u64..10_000_000,
            price_scale in 0u32..8,
            filled in 0u64..1_000,
            version in 0u64..1_000,
        ) {
            let mut order = create_order(Side::BUY, "1", "1000");
            order.price = Decimal::new(price as i64, price_scale);
            order.size_filled = Decimal::new(filled as i64, 0);
            order.version = version;
            let record: HashMap<String, String> = order
                .to_record()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            prop_assert_eq!(Order::from_record(&record).unwrap(), order);
        }
    }
}
