// Order execution and data collection module
pub mod executor;
pub mod ledger;
pub mod price_feed;
pub mod price_history;

pub use executor::{ExecutionSettings, FaultReceiver, OrderExecutor, OrderOutcome, SubmittedOrder};
pub use ledger::{Ledger, SharedLedger};
pub use price_feed::PriceFeed;
pub use price_history::{PriceHistory, QuoteHistory};
