/// Arithmetic mean of a price window
///
/// Returns `None` for an empty window; callers guard on it.
pub fn mean(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }

    let sum: f64 = prices.iter().sum();
    Some(sum / prices.len() as f64)
}

/// Population standard deviation (divides by N, not N-1)
pub fn std_dev(prices: &[f64]) -> Option<f64> {
    let mu = mean(prices)?;

    let variance = prices
        .iter()
        .map(|price| {
            let diff = price - mu;
            diff * diff
        })
        .sum::<f64>()
        / prices.len() as f64;

    Some(variance.sqrt())
}
