use ndarray::Array2;

/// Metropolis-Hastings acceptance probability for a log-likelihood difference.
///
/// `exp(diff)` overflows to infinity for large positive differences; the clamp
/// turns overflow into certain acceptance instead of an error.
#[inline]
pub(crate) fn mh_probability(diff: f64) -> f64 {
    diff.exp().min(1.0)
}

/// Population variance of a gridded residual field.
pub(crate) fn variance(values: &Array2<f64>) -> f64 {
    let n = values.len() as f64;
    let mean = values.sum() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// `count` evenly spaced values from `start` to `stop` inclusive.
pub(crate) fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    if count < 2 {
        return vec![start];
    }
    let step = (stop - start) / (count - 1) as f64;
    let mut values: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
    values[count - 1] = stop;
    values
}
