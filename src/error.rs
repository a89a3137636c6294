use thiserror::Error;

/// Everything that can go wrong between reading the order book and settling an order.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("insufficient history for {asset}: have {have}, need {need}")]
    InsufficientHistory {
        asset: String,
        have: usize,
        need: usize,
    },

    #[error("no asset has enough history to rank")]
    NoEligibleAsset,

    #[error("market data unavailable for {asset}: {reason}")]
    MarketData { asset: String, reason: String },

    /// The venue rejected the order at entry. No monitor exists for it.
    #[error("order submission to {venue} failed: {reason}")]
    SubmissionFailed { venue: String, reason: String },

    #[error("order {order_id} failed: {reason}")]
    OrderFailed { order_id: String, reason: String },

    #[error("order {order_id} did not complete after {attempts} status checks")]
    TimedOut { order_id: String, attempts: u32 },

    /// Cancelling a failed or stale order also failed. The order may still be live.
    #[error("order {order_id} at {venue} is in an unknown state: {reason}")]
    UnresolvedOrderState {
        venue: String,
        order_id: String,
        reason: String,
    },

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl TradingError {
    /// Only an order whose true state on the venue is unknown must halt the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnresolvedOrderState { .. })
    }

    /// Data and signal errors abort the current tick and nothing more.
    pub fn is_tick_local(&self) -> bool {
        matches!(
            self,
            Self::InsufficientHistory { .. } | Self::NoEligibleAsset | Self::MarketData { .. }
        )
    }
}
