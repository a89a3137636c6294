// Statistics over price windows, used by the momentum selector
pub mod statistics;

pub use statistics::{mean, std_dev};
