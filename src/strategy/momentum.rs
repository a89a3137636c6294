use crate::error::TradingError;
use crate::execution::PriceHistory;
use crate::indicators::{mean, std_dev};
use crate::Result;

/// Below this a window is treated as having no variance at all
const ZERO_DEVIATION_EPSILON: f64 = 1e-8;

/// Momentum rotation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumParams {
    /// Window used to rank gainers
    pub gainer_periods: usize,
    /// Window used for the deviation score
    pub deviation_periods: usize,
    /// Minimum deviation (in standard deviations) before we buy the winner
    pub min_deviation: f64,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            gainer_periods: 5,
            deviation_periods: 10,
            min_deviation: 1.0,
        }
    }
}

impl MomentumParams {
    /// Longest window the selector reads
    pub fn max_lookback(&self) -> usize {
        self.gainer_periods.max(self.deviation_periods)
    }
}

/// Gain of the latest price over the first price of an `n_periods` window
pub fn gain_over(asset: &str, history: &PriceHistory, n_periods: usize) -> Result<f64> {
    let window = window(asset, history, n_periods)?;

    let first = window[0];
    let last = window[window.len() - 1];
    Ok((last / first) - 1.0)
}

/// Asset with the strictly largest gain over `n_periods`
///
/// Assets without enough history are skipped. Ties keep the earlier asset.
pub fn biggest_gainer_over(
    assets: &[String],
    history: &PriceHistory,
    n_periods: usize,
) -> Result<(String, f64)> {
    let mut best: Option<(String, f64)> = None;

    for asset in assets {
        let gain = match gain_over(asset, history, n_periods) {
            Ok(gain) => gain,
            Err(TradingError::InsufficientHistory { .. }) => continue,
            Err(e) => return Err(e),
        };

        if !gain.is_finite() {
            tracing::warn!(asset = %asset, "Skipping non-finite gain");
            continue;
        }

        tracing::debug!(asset = %asset, gain, "Gain over {} periods", n_periods);

        let is_better = best.as_ref().map_or(true, |(_, best_gain)| gain > *best_gain);
        if is_better {
            best = Some((asset.clone(), gain));
        }
    }

    best.ok_or(TradingError::NoEligibleAsset)
}

/// How many standard deviations the latest price sits from the window mean
pub fn deviation_score(asset: &str, history: &PriceHistory, n_periods: usize) -> Result<f64> {
    let window = window(asset, history, n_periods)?;

    // window() never returns an empty slice
    let sigma = std_dev(&window).unwrap_or(0.0);
    if sigma.abs() < ZERO_DEVIATION_EPSILON {
        return Ok(0.0);
    }

    let mu = mean(&window).unwrap_or(0.0);
    let last = window[window.len() - 1];
    let score = (last - mu) / sigma;

    tracing::debug!(
        asset = %asset,
        last,
        mean = mu,
        sigma,
        score,
        "Deviation score"
    );

    Ok(score)
}

fn window(asset: &str, history: &PriceHistory, n_periods: usize) -> Result<Vec<f64>> {
    let insufficient = || TradingError::InsufficientHistory {
        asset: asset.to_string(),
        have: history.len(asset),
        need: n_periods,
    };

    if n_periods == 0 {
        return Err(insufficient());
    }

    history.recent(asset, n_periods).ok_or_else(insufficient)
}

/// Outcome of ranking the tracked assets on one tick
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub asset: String,
    pub gain: f64,
    pub score: f64,
    /// True when the score meets the configured minimum
    pub qualifies: bool,
}

/// Picks the biggest gainer and checks it is stretched far enough above its mean
#[derive(Debug, Clone, Default)]
pub struct MomentumSelector {
    params: MomentumParams,
}

impl MomentumSelector {
    pub fn new(params: MomentumParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MomentumParams {
        &self.params
    }

    /// Rank `assets` on their offer-side history
    pub fn select(&self, assets: &[String], asks: &PriceHistory) -> Result<Selection> {
        let (asset, gain) = biggest_gainer_over(assets, asks, self.params.gainer_periods)?;
        let score = deviation_score(&asset, asks, self.params.deviation_periods)?;
        let qualifies = score >= self.params.min_deviation;

        Ok(Selection {
            asset,
            gain,
            score,
            qualifies,
        })
    }
}
