//! Forcing parameters, bounds, and random-walk proposals.

use rand::Rng;
use rand_distr::StandardNormal;

/// Scalar forcing parameters of the forward simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterVector {
    pub rain: f64,
    pub erodibility: f64,
    pub m: f64,
    pub n: f64,
}

/// Inclusive parameter bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Proposal configuration for a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub bounds: Bounds,
    /// Gaussian random-walk step size.
    pub step: f64,
    /// Inactive parameters are held at [`ParamSpec::fixed`] for the whole run.
    pub active: bool,
    /// Initial value of an inactive parameter.
    pub fixed: f64,
}

impl ParamSpec {
    /// A parameter the chain explores, starting from a uniform draw within bounds.
    pub fn active(bounds: Bounds, step: f64) -> Self {
        Self {
            bounds,
            step,
            active: true,
            fixed: bounds.min,
        }
    }

    /// A parameter held at `value` for the whole run.
    pub fn fixed(bounds: Bounds, step: f64, value: f64) -> Self {
        Self {
            bounds,
            step,
            active: false,
            fixed: value,
        }
    }

    /// Keep `candidate` if it lies within bounds, else hard-revert to `current`.
    ///
    /// The revert replaces the whole component with its previous committed value;
    /// the candidate is neither reflected at the boundary nor redrawn.
    pub fn admit(&self, current: f64, candidate: f64) -> f64 {
        if self.bounds.contains(candidate) {
            candidate
        } else {
            current
        }
    }

    fn initial<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.active {
            rng.random_range(self.bounds.min..=self.bounds.max)
        } else {
            self.fixed
        }
    }

    fn perturb<R: Rng + ?Sized>(&self, current: f64, rng: &mut R) -> f64 {
        if !self.active {
            return current;
        }
        let noise: f64 = rng.sample(StandardNormal);
        self.admit(current, current + noise * self.step)
    }
}

/// Proposal configuration for the full parameter vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposalConfig {
    pub rain: ParamSpec,
    pub erodibility: ParamSpec,
    pub m: ParamSpec,
    pub n: ParamSpec,
}

impl Default for ProposalConfig {
    /// Reference configuration: rain and erodibility explored with steps of 1% of
    /// their bound width, stream-power exponents m and n held at their usual
    /// defaults.
    fn default() -> Self {
        let rain = Bounds::new(0.0, 3.0);
        let erodibility = Bounds::new(1.0e-5, 9.0e-5);
        Self {
            rain: ParamSpec::active(rain, rain.width() * 0.01),
            erodibility: ParamSpec::active(erodibility, erodibility.width() * 0.01),
            m: ParamSpec::fixed(Bounds::new(0.0, 2.0), 0.05, 0.5),
            n: ParamSpec::fixed(Bounds::new(0.0, 4.0), 0.05, 1.0),
        }
    }
}

impl ProposalConfig {
    /// Initial chain position: a uniform draw within bounds for active
    /// parameters, the fixed default for inactive ones.
    pub fn initial_draw<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterVector {
        ParameterVector {
            rain: self.rain.initial(rng),
            erodibility: self.erodibility.initial(rng),
            m: self.m.initial(rng),
            n: self.n.initial(rng),
        }
    }

    /// Random-walk candidate from `current`.
    pub fn propose<R: Rng + ?Sized>(
        &self,
        current: &ParameterVector,
        rng: &mut R,
    ) -> ParameterVector {
        ParameterVector {
            rain: self.rain.perturb(current.rain, rng),
            erodibility: self.erodibility.perturb(current.erodibility, rng),
            m: self.m.perturb(current.m, rng),
            n: self.n.perturb(current.n, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn out_of_bounds_candidate_reverts_to_current() {
        let spec = ParamSpec::active(Bounds::new(0.0, 3.0), 0.03);
        assert_eq!(spec.admit(1.5, 5.0), 1.5);
        assert_eq!(spec.admit(1.5, -0.1), 1.5);
        assert_eq!(spec.admit(1.5, 2.9), 2.9);
        assert_eq!(spec.admit(1.5, 3.0), 3.0);
    }

    #[test]
    fn zero_step_proposal_equals_current() {
        let mut config = ProposalConfig::default();
        config.rain.step = 0.0;
        config.erodibility.step = 0.0;
        let mut rng = SmallRng::seed_from_u64(1);
        let current = config.initial_draw(&mut rng);
        for _ in 0..20 {
            assert_eq!(config.propose(&current, &mut rng), current);
        }
    }

    #[test]
    fn inactive_parameters_never_move() {
        let config = ProposalConfig::default();
        let mut rng = SmallRng::seed_from_u64(2);
        let current = config.initial_draw(&mut rng);
        assert_eq!(current.m, 0.5);
        assert_eq!(current.n, 1.0);
        for _ in 0..50 {
            let candidate = config.propose(&current, &mut rng);
            assert_eq!(candidate.m, 0.5);
            assert_eq!(candidate.n, 1.0);
        }
    }

    #[test]
    fn initial_draw_respects_bounds() {
        let config = ProposalConfig::default();
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..100 {
            let draw = config.initial_draw(&mut rng);
            assert!(config.rain.bounds.contains(draw.rain));
            assert!(config.erodibility.bounds.contains(draw.erodibility));
        }
    }

    #[test]
    fn proposals_stay_within_bounds() {
        let config = ProposalConfig::default();
        let mut rng = SmallRng::seed_from_u64(4);
        let mut current = config.initial_draw(&mut rng);
        for _ in 0..500 {
            current = config.propose(&current, &mut rng);
            assert!(config.rain.bounds.contains(current.rain));
            assert!(config.erodibility.bounds.contains(current.erodibility));
        }
    }
}
