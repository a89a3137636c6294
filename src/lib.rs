// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod strategy;
pub mod trader;

// Re-export commonly used types
pub use api::{DmaClient, MarketDataSource, TokenRefresher, VenueGateway};
pub use config::AppConfig;
pub use error::TradingError;
pub use models::*;
pub use trader::{MomentumTrader, TickOutcome, TraderSettings};

// Error handling
pub type Result<T> = std::result::Result<T, TradingError>;
