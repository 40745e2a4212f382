/// Streaming exponentially weighted moving average.
///
/// Recursive infinite-history form: `alpha = 2 / (window + 1)`, the first
/// sample initializes the average, then
/// `ema[t] = alpha * x[t] + (1 - alpha) * ema[t-1]`. O(1) per sample and
/// equal to [`ewma_infinite_hist`] over the same inputs.
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    value: Option<f64>,
}

impl Ewma {
    pub fn new(window: usize) -> Self {
        Self {
            alpha: 2.0 / (window as f64 + 1.0),
            value: None,
        }
    }

    /// Fold one sample into the average and return the updated value.
    pub fn update(&mut self, x: f64) -> f64 {
        let next = match self.value {
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
            None => x,
        };
        self.value = Some(next);
        next
    }

    /// Current average, `None` until the first sample arrives.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

/// Batch EWMA under the infinite-history assumption (`adjust=False`
/// exponential smoothing). Reference form of [`Ewma`].
pub fn ewma_infinite_hist(values: &[f64], window: usize) -> Vec<f64> {
    let alpha = 2.0 / (window as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = match values.first() {
        Some(&x) => x,
        None => return out,
    };
    out.push(prev);
    for &x in &values[1..] {
        prev = alpha * x + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Batch EWMA with finite-history correction (`adjust=True`): outputs are
/// renormalized by the cumulative weight, so early values are exact
/// weighted averages of the observed prefix. Converges to
/// [`ewma_infinite_hist`] as the prefix grows.
pub fn ewma_adjusted(values: &[f64], window: usize) -> Vec<f64> {
    let alpha = 2.0 / (window as f64 + 1.0);
    let decay = 1.0 - alpha;
    let mut out = Vec::with_capacity(values.len());
    let first = match values.first() {
        Some(&x) => x,
        None => return out,
    };
    let mut weighted_sum = first;
    let mut cum_weight = 1.0;
    out.push(first);
    for (i, &x) in values.iter().enumerate().skip(1) {
        cum_weight += decay.powi(i as i32);
        weighted_sum = weighted_sum * decay + x;
        out.push(weighted_sum / cum_weight);
    }
    out
}
