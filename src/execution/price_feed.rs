use super::QuoteHistory;
use crate::api::MarketDataSource;
use crate::error::TradingError;
use crate::models::OrderBook;
use crate::Result;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Collects one top-of-book observation per asset per tick
pub struct PriceFeed {
    source: Arc<dyn MarketDataSource>,
    assets: Vec<String>,
    base_asset: String,
    quotes: QuoteHistory,
    last_books: HashMap<String, OrderBook>,
}

impl PriceFeed {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        assets: Vec<String>,
        base_asset: String,
        history_capacity: usize,
    ) -> Self {
        Self {
            source,
            assets,
            base_asset,
            quotes: QuoteHistory::new(history_capacity),
            last_books: HashMap::new(),
        }
    }

    /// Fetch every asset's book and append its best bid and best offer
    ///
    /// Stops at the first asset that fails; assets fetched before it keep
    /// their new observation.
    pub async fn collect(&mut self) -> Result<()> {
        for asset in self.assets.clone() {
            let book = self
                .source
                .order_book(&asset, &self.base_asset)
                .await
                .map_err(|e| match e {
                    TradingError::MarketData { .. } => e,
                    other => market_data(&asset, other.to_string()),
                })?;

            let best_bid = touch_price(&asset, book.best_bid().map(|l| l.price), "bid")?;
            let best_offer = touch_price(&asset, book.best_offer().map(|l| l.price), "offer")?;

            self.quotes.record(&asset, best_bid, best_offer);
            self.last_books.insert(asset.clone(), book);

            tracing::debug!(asset = %asset, best_bid, best_offer, "Recorded quote");
        }

        Ok(())
    }

    pub fn quotes(&self) -> &QuoteHistory {
        &self.quotes
    }

    /// Book from the most recent successful fetch
    pub fn book(&self, asset: &str) -> Option<&OrderBook> {
        self.last_books.get(asset)
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn base_asset(&self) -> &str {
        &self.base_asset
    }
}

fn market_data(asset: &str, reason: String) -> TradingError {
    TradingError::MarketData {
        asset: asset.to_string(),
        reason,
    }
}

fn touch_price(asset: &str, price: Option<Decimal>, side: &str) -> Result<f64> {
    let price = price.ok_or_else(|| market_data(asset, format!("empty {} ladder", side)))?;
    price
        .to_f64()
        .ok_or_else(|| market_data(asset, format!("unrepresentable {} price {}", side, price)))
}
