use std::collections::{HashMap, VecDeque};

/// Rolling per-asset price series
///
/// Keeps at most `capacity` observations per asset; the oldest is evicted
/// once the window is full.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    series: HashMap<String, VecDeque<f64>>,
    capacity: usize,
}

impl PriceHistory {
    /// # Arguments
    /// * `capacity` - Maximum number of observations to keep per asset
    pub fn new(capacity: usize) -> Self {
        Self {
            series: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append one observation for an asset
    pub fn push(&mut self, asset: &str, price: f64) {
        let series = self
            .series
            .entry(asset.to_string())
            .or_insert_with(VecDeque::new);

        series.push_back(price);

        while series.len() > self.capacity {
            series.pop_front();
        }
    }

    /// Number of observations held for an asset
    pub fn len(&self, asset: &str) -> usize {
        self.series.get(asset).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, asset: &str) -> bool {
        self.len(asset) == 0
    }

    /// The `n` most recent observations, oldest first
    ///
    /// Returns `None` if fewer than `n` are held.
    pub fn recent(&self, asset: &str, n: usize) -> Option<Vec<f64>> {
        let series = self.series.get(asset)?;
        if series.len() < n {
            return None;
        }

        Some(series.iter().skip(series.len() - n).copied().collect())
    }

    pub fn latest(&self, asset: &str) -> Option<f64> {
        self.series.get(asset)?.back().copied()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Best-bid and best-offer histories, tracked independently
#[derive(Debug, Clone)]
pub struct QuoteHistory {
    pub bids: PriceHistory,
    pub asks: PriceHistory,
}

impl QuoteHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            bids: PriceHistory::new(capacity),
            asks: PriceHistory::new(capacity),
        }
    }

    /// Record one top-of-book observation
    pub fn record(&mut self, asset: &str, best_bid: f64, best_offer: f64) {
        self.bids.push(asset, best_bid);
        self.asks.push(asset, best_offer);
    }
}
