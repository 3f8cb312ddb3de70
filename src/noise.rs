//! Adaptive observation-noise state: a log-variance random walk per channel.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::math::variance;
use crate::surface::Surface;

/// Log-variance state for the two observed channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseState {
    pub eta_elev: f64,
    pub eta_erodep: f64,
}

impl NoiseState {
    /// Elevation noise variance, strictly positive by construction.
    pub fn tau_elev(&self) -> f64 {
        self.eta_elev.exp()
    }

    /// Erosion-deposition noise variance, strictly positive by construction.
    pub fn tau_erodep(&self) -> f64 {
        self.eta_erodep.exp()
    }
}

/// Random walk over [`NoiseState`] with step sizes frozen at initialization.
///
/// The walk is unconstrained on the log scale (a flat prior on log-variance);
/// unlike the forcing parameters, no bounds apply.
#[derive(Debug, Clone, Copy)]
pub struct NoiseModel {
    step_eta_elev: f64,
    step_eta_erodep: f64,
}

impl NoiseModel {
    /// Initialize from the residuals of the first forward run.
    ///
    /// Each eta starts at the log of its channel's residual variance; the step
    /// sizes are `step_fraction` of the initial eta magnitude and never change.
    pub fn from_residuals(
        resid_elev: &Surface,
        resid_erodep: &Surface,
        step_fraction: f64,
    ) -> (Self, NoiseState) {
        let eta_elev = variance(resid_elev).ln();
        let eta_erodep = variance(resid_erodep).ln();
        let model = Self {
            step_eta_elev: step_fraction * eta_elev.abs(),
            step_eta_erodep: step_fraction * eta_erodep.abs(),
        };
        (model, NoiseState { eta_elev, eta_erodep })
    }

    pub fn step_eta_elev(&self) -> f64 {
        self.step_eta_elev
    }

    pub fn step_eta_erodep(&self) -> f64 {
        self.step_eta_erodep
    }

    pub fn propose<R: Rng + ?Sized>(&self, current: &NoiseState, rng: &mut R) -> NoiseState {
        let z_elev: f64 = rng.sample(StandardNormal);
        let z_erodep: f64 = rng.sample(StandardNormal);
        NoiseState {
            eta_elev: current.eta_elev + z_elev * self.step_eta_elev,
            eta_erodep: current.eta_erodep + z_erodep * self.step_eta_erodep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use pretty_assertions::assert_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn residual(values: Vec<f64>) -> Surface {
        let n = values.len();
        Array2::from_shape_vec((1, n), values).unwrap()
    }

    #[test]
    fn initializes_to_log_residual_variance() {
        let resid = residual(vec![-1.0, 1.0, -1.0, 1.0]);
        let (model, state) = NoiseModel::from_residuals(&resid, &resid, 0.05);
        assert_abs_diff_eq!(state.eta_elev, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(state.tau_elev(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(model.step_eta_elev(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn step_size_uses_eta_magnitude() {
        // Residual variance below 1 gives a negative eta; the step size must
        // still come out non-negative.
        let small = residual(vec![-0.1, 0.1, -0.1, 0.1]);
        let large = residual(vec![-10.0, 10.0, -10.0, 10.0]);
        let (model, state) = NoiseModel::from_residuals(&small, &large, 0.05);
        assert!(state.eta_elev < 0.0);
        assert_abs_diff_eq!(
            model.step_eta_elev(),
            0.05 * state.eta_elev.abs(),
            epsilon = 1e-12
        );
        assert!(model.step_eta_elev() > 0.0);
        assert!(model.step_eta_erodep() > 0.0);
    }

    #[test]
    fn taus_stay_positive_along_the_walk() {
        let resid = residual(vec![-3.0, 1.0, 4.0, -2.0]);
        let (model, mut state) = NoiseModel::from_residuals(&resid, &resid, 0.05);
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..1000 {
            state = model.propose(&state, &mut rng);
            assert!(state.tau_elev() > 0.0);
            assert!(state.tau_erodep() > 0.0);
        }
    }

    #[test]
    fn zero_fraction_freezes_the_walk() {
        let resid = residual(vec![-3.0, 1.0, 4.0, -2.0]);
        let (model, state) = NoiseModel::from_residuals(&resid, &resid, 0.0);
        let mut rng = SmallRng::seed_from_u64(12);
        assert_eq!(model.propose(&state, &mut rng), state);
    }
}
