//! Run-level driver: configuration, the sampling loop, and result assembly.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::chain::MhChain;
use crate::likelihood::{LikelihoodEvaluator, LikelihoodMode};
use crate::model::ForwardModel;
use crate::params::{ParameterVector, ProposalConfig};
use crate::posterior::PosteriorAccumulator;
use crate::surface::Surface;
use crate::trace::{write_mean_grid, TraceRecorder};

/// Sampler configuration.
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    /// Total sample budget, counting the unconditionally accepted initial point.
    pub samples: usize,
    /// Proposal configuration for the forcing parameters.
    pub proposal: ProposalConfig,
    /// Simulated times the forward model reports, strictly ascending.
    pub checkpoint_times: Vec<f64>,
    /// The checkpoint scored against the reference.
    pub target_time: f64,
    /// Leading fraction of the budget excluded from posterior averaging.
    pub burn_in_fraction: f64,
    /// Noise random-walk step size as a fraction of the initial log-variance
    /// magnitude.
    pub noise_step_fraction: f64,
    pub likelihood_mode: LikelihoodMode,
    pub seed: u64,
    /// Decimal places in the posterior-mean grid files.
    pub grid_precision: usize,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            samples: 10_000,
            proposal: ProposalConfig::default(),
            checkpoint_times: (0..=10).map(|i| f64::from(i) * 5000.0).collect(),
            target_time: 50_000.0,
            burn_in_fraction: 0.05,
            noise_step_fraction: 0.05,
            likelihood_mode: LikelihoodMode::default(),
            seed: 0,
            grid_precision: 5,
        }
    }
}

impl SamplerSettings {
    /// Number of leading iterations excluded from posterior averaging.
    pub fn burn_in(&self) -> usize {
        (self.samples as f64 * self.burn_in_fraction) as usize
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.samples >= 1, "sample budget must be at least 1");
        ensure!(
            (0.0..1.0).contains(&self.burn_in_fraction),
            "burn-in fraction must lie in [0, 1)"
        );
        ensure!(
            self.noise_step_fraction >= 0.0,
            "noise step fraction must be non-negative"
        );
        ensure!(
            !self.checkpoint_times.is_empty(),
            "at least one checkpoint time is required"
        );
        ensure!(
            self.checkpoint_times.windows(2).all(|w| w[0] < w[1]),
            "checkpoint times must be strictly ascending"
        );
        ensure!(
            self.checkpoint_times.contains(&self.target_time),
            "target time {} is not one of the checkpoint times",
            self.target_time
        );
        for (name, spec) in [
            ("rain", &self.proposal.rain),
            ("erodibility", &self.proposal.erodibility),
            ("m", &self.proposal.m),
            ("n", &self.proposal.n),
        ] {
            ensure!(
                spec.bounds.min <= spec.bounds.max,
                "{name} bounds are inverted"
            );
            ensure!(spec.step >= 0.0, "{name} step size must be non-negative");
            if !spec.active {
                ensure!(
                    spec.bounds.contains(spec.fixed),
                    "{name} fixed value {} lies outside its bounds",
                    spec.fixed
                );
            }
        }
        Ok(())
    }
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct SampleResult {
    pub iterations: usize,
    pub accepted: usize,
    pub acceptance_ratio: f64,
    pub final_params: ParameterVector,
    pub final_log_likelihood: f64,
    /// Posterior-mean elevation surfaces per checkpoint.
    pub mean_elevation: Vec<(f64, Surface)>,
    /// Posterior-mean erosion-deposition surfaces per checkpoint.
    pub mean_erodep: Vec<(f64, Surface)>,
}

/// Run one Metropolis-Hastings chain against the observed reference grids and
/// persist the scalar trace and posterior-mean grids under `output_dir`.
pub fn sample<M: ForwardModel>(
    model: M,
    observed_elev: Surface,
    observed_erodep: Surface,
    settings: &SamplerSettings,
    output_dir: &Path,
) -> Result<SampleResult> {
    settings.validate()?;

    let rng = ChaCha8Rng::seed_from_u64(settings.seed);
    let mut recorder = TraceRecorder::create(output_dir)?;
    let evaluator =
        LikelihoodEvaluator::new(observed_elev, observed_erodep, settings.likelihood_mode);
    let mut chain = MhChain::init(
        model,
        evaluator,
        settings.proposal,
        settings.checkpoint_times.clone(),
        settings.target_time,
        settings.noise_step_fraction,
        rng,
    )?;
    let mut accumulator = PosteriorAccumulator::new(settings.burn_in());

    write_run_description(output_dir, settings, &chain.state().params)?;

    let initial = chain.initial_record();
    recorder.record(&initial)?;
    accumulator.observe(initial.iteration, chain.state());

    for _ in 1..settings.samples {
        let record = chain.step()?;
        recorder.record(&record)?;
        accumulator.observe(record.iteration, chain.state());
    }
    recorder.flush()?;

    let (mean_elevation, mean_erodep) = accumulator.means();
    for (time, grid) in &mean_elevation {
        let path = output_dir.join(format!("mean_pred_elev_{time}.txt"));
        write_mean_grid(&path, grid, settings.grid_precision)?;
    }
    for (time, grid) in &mean_erodep {
        let path = output_dir.join(format!("mean_pred_erodep_{time}.txt"));
        write_mean_grid(&path, grid, settings.grid_precision)?;
    }

    let accepted = chain.accepted();
    let acceptance_ratio = accepted as f64 / settings.samples as f64;
    log::info!(
        "accepted {accepted} of {} samples ({:.1}%)",
        settings.samples,
        100.0 * acceptance_ratio
    );
    write_run_summary(output_dir, settings.samples, accepted, acceptance_ratio)?;

    Ok(SampleResult {
        iterations: chain.iteration(),
        accepted,
        acceptance_ratio,
        final_params: chain.state().params,
        final_log_likelihood: chain.state().log_likelihood,
        mean_elevation,
        mean_erodep,
    })
}

/// Record the experimental conditions at run start.
fn write_run_description(
    dir: &Path,
    settings: &SamplerSettings,
    initial: &ParameterVector,
) -> Result<()> {
    let proposal = &settings.proposal;
    let text = format!(
        "samples: {}\n\
         burn_in_fraction: {}\n\
         noise_step_fraction: {}\n\
         target_time: {}\n\
         step_rain: {}\n\
         step_erod: {}\n\
         step_m: {}\n\
         step_n: {}\n\
         rain_limits: [{}, {}]\n\
         erod_limits: [{}, {}]\n\
         m_limit: [{}, {}]\n\
         n_limit: [{}, {}]\n\
         initial_rain: {}\n\
         initial_erod: {}\n\
         initial_m: {}\n\
         initial_n: {}\n",
        settings.samples,
        settings.burn_in_fraction,
        settings.noise_step_fraction,
        settings.target_time,
        proposal.rain.step,
        proposal.erodibility.step,
        proposal.m.step,
        proposal.n.step,
        proposal.rain.bounds.min,
        proposal.rain.bounds.max,
        proposal.erodibility.bounds.min,
        proposal.erodibility.bounds.max,
        proposal.m.bounds.min,
        proposal.m.bounds.max,
        proposal.n.bounds.min,
        proposal.n.bounds.max,
        initial.rain,
        initial.erodibility,
        initial.m,
        initial.n,
    );
    std::fs::write(dir.join("description.txt"), text).context("failed to write run description")
}

fn write_run_summary(dir: &Path, samples: usize, accepted: usize, ratio: f64) -> Result<()> {
    let text = format!(
        "Accept ratio: {:.2} %\nSamples accepted: {accepted} out of {samples}\n",
        100.0 * ratio
    );
    std::fs::write(dir.join("out_results.txt"), text).context("failed to write run summary")
}
