pub mod auth;
pub mod dma;

pub use auth::TokenRefresher;
pub use dma::{DmaClient, DmaSettings};

use crate::models::{OrderBook, OrderRequest, OrderStatus};
use crate::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// Business error reported by a venue inside an otherwise successful response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VenueError {
    #[serde(rename = "error")]
    pub message: String,
}

/// Venue acknowledgement of a new order
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SubmitAck {
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub venue_order_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<VenueError>,
}

/// Venue view of an order's progress
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StatusReport {
    #[serde(default = "unknown_status", deserialize_with = "null_as_unknown")]
    pub status: OrderStatus,
    #[serde(rename = "filled", default)]
    pub filled_amount: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<VenueError>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CancelAck {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<VenueError>,
}

/// Holdings of one asset at one venue
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Balance {
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<VenueError>,
}

/// Join venue errors into one message, `None` if there are none
pub fn venue_errors(errors: &[VenueError]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }

    Some(
        errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Order routing to named venues
///
/// A transport failure is the final answer for that call; callers must also
/// inspect the `errors` list of every response.
#[async_trait]
pub trait VenueGateway: Send + Sync {
    async fn submit_order(&self, request: &OrderRequest) -> Result<SubmitAck>;

    async fn order_status(&self, venue: &str, venue_order_id: &str) -> Result<StatusReport>;

    async fn cancel_order(&self, venue: &str, venue_order_id: &str) -> Result<CancelAck>;
}

/// Source of consolidated order books
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn order_book(&self, asset: &str, base_asset: &str) -> Result<OrderBook>;
}

fn unknown_status() -> OrderStatus {
    OrderStatus::Unknown(String::new())
}

fn null_as_unknown<'de, D>(deserializer: D) -> std::result::Result<OrderStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(OrderStatus::from)
        .unwrap_or_else(unknown_status))
}

// Venues send `null` for an empty error list
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
