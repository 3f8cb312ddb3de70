//! Metropolis-Hastings calibration of landscape-evolution simulators.
//!
//! A forward simulator (consumed behind [`ForwardModel`]) maps scalar forcing
//! parameters to time-indexed irregular surfaces. This crate random-walks those
//! parameters together with an adaptive observation-noise state, scores every
//! candidate against an observed reference grid under a Gaussian error model,
//! and accumulates posterior-mean surfaces over the post-burn-in chain.
//!
//! The chain is strictly sequential and all randomness flows from an injected
//! generator, so a fixed seed reproduces a run bit-for-bit against a
//! deterministic simulator.

pub(crate) mod chain;
pub(crate) mod interpolate;
pub(crate) mod likelihood;
pub(crate) mod math;
pub(crate) mod model;
pub(crate) mod noise;
pub(crate) mod params;
pub(crate) mod posterior;
pub(crate) mod sampler;
pub(crate) mod surface;
pub(crate) mod trace;

pub use chain::{ChainState, IterationRecord, MhChain};
pub use interpolate::{CloudInterpolator, InterpolationError};
pub use likelihood::{
    gaussian_log_likelihood, rmse, LikelihoodError, LikelihoodEvaluator, LikelihoodMode,
};
pub use model::{CheckpointCloud, ForwardModel};
pub use noise::{NoiseModel, NoiseState};
pub use params::{Bounds, ParamSpec, ParameterVector, ProposalConfig};
pub use posterior::PosteriorAccumulator;
pub use sampler::{sample, SampleResult, SamplerSettings};
pub use surface::{CheckpointSeries, Surface};
pub use trace::{write_mean_grid, TraceRecorder};
