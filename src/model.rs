//! Interface to the forward landscape-evolution simulator.

use anyhow::Result;

use crate::params::ParameterVector;

/// One checkpoint of raw simulator output: an irregular node cloud carrying
/// elevation and cumulative erosion-deposition.
#[derive(Debug, Clone)]
pub struct CheckpointCloud {
    /// Simulated time of this checkpoint.
    pub time: f64,
    /// Planar node coordinates.
    pub coords: Vec<[f64; 2]>,
    /// Elevation at each node.
    pub elevation: Vec<f64>,
    /// Cumulative erosion-deposition at each node.
    pub erodep: Vec<f64>,
}

/// The opaque forward simulator being calibrated.
///
/// Implementations must be deterministic for fixed parameters; the sampler relies
/// on replayable likelihoods for reproducible chains. Calls are synchronous and
/// non-cancellable, and any error aborts the run. The sampler never retries.
pub trait ForwardModel {
    /// Run the simulator under the given forcing and report one cloud per
    /// requested checkpoint time, in the same (ascending) order.
    fn evaluate(
        &mut self,
        params: &ParameterVector,
        checkpoints: &[f64],
    ) -> Result<Vec<CheckpointCloud>>;
}
