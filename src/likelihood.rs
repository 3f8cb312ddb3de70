//! Gaussian scoring of predicted surfaces against the observed reference.

use std::f64::consts::PI;

use thiserror::Error;

use crate::noise::NoiseState;
use crate::surface::Surface;

#[derive(Error, Debug)]
pub enum LikelihoodError {
    #[error("predicted grid is {pred:?} but observed reference is {obs:?}")]
    ShapeMismatch {
        pred: (usize, usize),
        obs: (usize, usize),
    },
}

/// Which channels enter the acceptance score.
///
/// The erosion-deposition noise channel is random-walked and recorded in either
/// mode; the switch only controls whether its Gaussian term joins the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikelihoodMode {
    /// Score the elevation channel only.
    #[default]
    ElevationOnly,
    /// Sum both channel terms, each under its own tau.
    Joint,
}

/// Cell-wise Gaussian log-likelihood of `pred` against `obs` under variance `tau`,
/// summed over all cells.
pub fn gaussian_log_likelihood(
    pred: &Surface,
    obs: &Surface,
    tau: f64,
) -> Result<f64, LikelihoodError> {
    check_shapes(pred, obs)?;
    let norm = -0.5 * (2.0 * PI * tau).ln();
    let total = pred
        .iter()
        .zip(obs.iter())
        .map(|(p, o)| {
            let r = p - o;
            norm - 0.5 * r * r / tau
        })
        .sum();
    Ok(total)
}

/// Root-mean-square error between a predicted and an observed grid.
pub fn rmse(pred: &Surface, obs: &Surface) -> Result<f64, LikelihoodError> {
    check_shapes(pred, obs)?;
    let sum_sq: f64 = pred
        .iter()
        .zip(obs.iter())
        .map(|(p, o)| (p - o) * (p - o))
        .sum();
    Ok((sum_sq / pred.len() as f64).sqrt())
}

fn check_shapes(pred: &Surface, obs: &Surface) -> Result<(), LikelihoodError> {
    if pred.dim() != obs.dim() {
        return Err(LikelihoodError::ShapeMismatch {
            pred: pred.dim(),
            obs: obs.dim(),
        });
    }
    Ok(())
}

/// Scores candidate surfaces against the observed reference grids.
#[derive(Debug, Clone)]
pub struct LikelihoodEvaluator {
    observed_elev: Surface,
    observed_erodep: Surface,
    mode: LikelihoodMode,
}

impl LikelihoodEvaluator {
    pub fn new(observed_elev: Surface, observed_erodep: Surface, mode: LikelihoodMode) -> Self {
        Self {
            observed_elev,
            observed_erodep,
            mode,
        }
    }

    pub fn observed_elev(&self) -> &Surface {
        &self.observed_elev
    }

    pub fn observed_erodep(&self) -> &Surface {
        &self.observed_erodep
    }

    pub(crate) fn check_prediction(
        &self,
        pred_elev: &Surface,
        pred_erodep: &Surface,
    ) -> Result<(), LikelihoodError> {
        check_shapes(pred_elev, &self.observed_elev)?;
        check_shapes(pred_erodep, &self.observed_erodep)
    }

    /// Total log-likelihood of a candidate prediction under the candidate noise
    /// state.
    pub fn score(
        &self,
        pred_elev: &Surface,
        pred_erodep: &Surface,
        noise: &NoiseState,
    ) -> Result<f64, LikelihoodError> {
        let mut total = gaussian_log_likelihood(pred_elev, &self.observed_elev, noise.tau_elev())?;
        if self.mode == LikelihoodMode::Joint {
            total +=
                gaussian_log_likelihood(pred_erodep, &self.observed_erodep, noise.tau_erodep())?;
        }
        Ok(total)
    }
}
