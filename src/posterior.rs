//! Ergodic averaging of committed surfaces into posterior-mean estimates.

use crate::chain::ChainState;
use crate::surface::{CheckpointSeries, Surface};

/// Running per-checkpoint surface sums over post-burn-in iterations.
///
/// Every iteration past the burn-in cutoff contributes the currently committed
/// surfaces, whether that iteration accepted or rejected, and bumps one counter
/// shared by both channels.
#[derive(Debug, Clone, Default)]
pub struct PosteriorAccumulator {
    burn_in: usize,
    sum_elev: Vec<(f64, Surface)>,
    sum_erodep: Vec<(f64, Surface)>,
    count: usize,
}

impl PosteriorAccumulator {
    /// `burn_in` is the number of leading iterations excluded: with 1-indexed
    /// iterations, iteration `burn_in + 1` is the first to contribute.
    pub fn new(burn_in: usize) -> Self {
        Self {
            burn_in,
            ..Self::default()
        }
    }

    /// Iterations included so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Fold the committed state of `iteration` into the running sums.
    pub fn observe(&mut self, iteration: usize, state: &ChainState) {
        if iteration <= self.burn_in {
            return;
        }
        accumulate(&mut self.sum_elev, &state.elevation);
        accumulate(&mut self.sum_erodep, &state.erodep);
        self.count += 1;
    }

    /// Posterior-mean surfaces, elementwise `sum / count`, per checkpoint and
    /// channel. Empty if nothing has contributed yet.
    pub fn means(&self) -> (Vec<(f64, Surface)>, Vec<(f64, Surface)>) {
        (self.divide(&self.sum_elev), self.divide(&self.sum_erodep))
    }

    fn divide(&self, sums: &[(f64, Surface)]) -> Vec<(f64, Surface)> {
        let count = self.count as f64;
        sums.iter()
            .map(|(time, sum)| (*time, sum.mapv(|v| v / count)))
            .collect()
    }
}

fn accumulate(sums: &mut Vec<(f64, Surface)>, series: &CheckpointSeries) {
    if sums.is_empty() {
        sums.extend(series.iter().map(|(time, surface)| (time, surface.clone())));
        return;
    }
    for ((_, sum), (_, surface)) in sums.iter_mut().zip(series.iter()) {
        *sum += surface;
    }
}
