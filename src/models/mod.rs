use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side as the venue understands it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Venue-reported order status
///
/// Anything the venue sends that we don't recognise (including an empty
/// string) is `Unknown` and treated like a working order.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(from = "String")]
pub enum OrderStatus {
    Open,
    PartialFill,
    Fill,
    Complete,
    Cancel,
    Expired,
    Error,
    Unknown(String),
}

impl OrderStatus {
    /// True once the venue reports the order fully done
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Fill | OrderStatus::Complete)
    }
}

impl From<String> for OrderStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "OPEN" => OrderStatus::Open,
            "PARTIAL_FILL" => OrderStatus::PartialFill,
            "FILL" => OrderStatus::Fill,
            "COMPLETE" => OrderStatus::Complete,
            "CANCEL" => OrderStatus::Cancel,
            "EXPIRED" => OrderStatus::Expired,
            "ERROR" => OrderStatus::Error,
            _ => OrderStatus::Unknown(raw),
        }
    }
}

impl From<&str> for OrderStatus {
    fn from(raw: &str) -> Self {
        OrderStatus::from(raw.to_string())
    }
}

/// One line of a consolidated order book
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookLevel {
    pub price: Decimal,
    #[serde(default)]
    pub quantity: Decimal,
    pub venue: String,
}

/// Consolidated order book across venues
///
/// Both ladders are sorted ascending by price: the best offer is the first
/// offer, the best bid is the last bid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub offers: Vec<BookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.last()
    }

    pub fn best_offer(&self) -> Option<&BookLevel> {
        self.offers.first()
    }

    /// Midpoint of the touch, shifted by `adjustment`
    pub fn mid_price(&self, adjustment: Decimal) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let offer = self.best_offer()?.price;
        Some((bid + offer) / Decimal::TWO + adjustment)
    }
}

/// Open holding in one asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub asset: String,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// Ledger key for one submitted order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OrderHandle(Uuid);

impl OrderHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the execution engine is asked to trade
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub asset: String,
    pub base_asset: String,
    pub venue: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    /// On an exit, the entry price of the position it closes
    pub entry_price: Option<Decimal>,
}

/// Historical record of a submitted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub handle: OrderHandle,
    pub venue: String,
    pub venue_order_id: String,
    pub asset: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub submitted_at: DateTime<Utc>,
    pub is_filled: bool,
    pub is_complete: bool,
}

impl OrderRecord {
    /// Fresh record for an order the venue has just accepted
    pub fn submitted(request: &OrderRequest, venue: String, venue_order_id: String) -> Self {
        Self {
            handle: OrderHandle::new(),
            venue,
            venue_order_id,
            asset: request.asset.clone(),
            side: request.side,
            size: request.size,
            price: request.price,
            submitted_at: Utc::now(),
            is_filled: false,
            is_complete: false,
        }
    }
}
