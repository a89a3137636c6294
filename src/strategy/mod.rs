// Trading signal module
pub mod momentum;

pub use momentum::{
    biggest_gainer_over, deviation_score, gain_over, MomentumParams, MomentumSelector, Selection,
};
