//! Job-size sampler: pluggable tasks-per-job distributions (spec.md §4.3).

// ACCEPTABLE: these .expect() calls guard construction-time invariants
// (weights already validated non-empty), not fallible I/O.
#![allow(clippy::expect_used)]

use crate::error::{SparrowError, SparrowResult};
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use std::sync::Arc;

/// Coerces a raw sample to `max(1, floor(x))`, per spec.md §4.3.
fn coerce(x: i64) -> u32 {
    x.max(1) as u32
}

/// Returns tasks-per-job for one job. Implementations own their
/// distribution parameters; the scheduler supplies the RNG so that draws
/// stay inside its seeded, deterministic stream.
pub trait JobSizeSampler: Send + Sync {
    fn sample(&self, rng: &mut dyn rand::RngCore) -> u32;
}

/// `fixed`: always returns `k` (default 3).
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub u32);

impl Default for FixedSampler {
    fn default() -> Self {
        Self(3)
    }
}

impl JobSizeSampler for FixedSampler {
    fn sample(&self, _rng: &mut dyn rand::RngCore) -> u32 {
        coerce(self.0 as i64)
    }
}

/// `uniform`: `U{lo, hi}` inclusive.
#[derive(Debug, Clone, Copy)]
pub struct UniformSampler {
    pub lo: u32,
    pub hi: u32,
}

impl UniformSampler {
    pub fn new(lo: u32, hi: u32) -> SparrowResult<Self> {
        if hi < lo {
            return Err(SparrowError::config(format!(
                "uniform jobsize: hi ({hi}) < lo ({lo})"
            )));
        }
        Ok(Self { lo, hi })
    }
}

impl JobSizeSampler for UniformSampler {
    fn sample(&self, rng: &mut dyn rand::RngCore) -> u32 {
        coerce(rng.gen_range(self.lo..=self.hi) as i64)
    }
}

/// `powerlaw`: weighted categorical over a user-supplied list of sizes.
/// Default weight of element `i` is `1/(i+1)` when weights are omitted.
#[derive(Debug, Clone)]
pub struct PowerlawSampler {
    choices: Vec<u32>,
    weights: Vec<f64>,
}

impl PowerlawSampler {
    pub fn new(choices: Vec<u32>, weights: Option<Vec<f64>>) -> SparrowResult<Self> {
        if choices.is_empty() {
            return Err(SparrowError::config("powerlaw jobsize: empty choices"));
        }
        let weights = match weights {
            Some(w) => {
                if w.len() != choices.len() {
                    return Err(SparrowError::config(
                        "powerlaw jobsize: weights length must match choices length",
                    ));
                }
                w
            }
            None => (0..choices.len()).map(|i| 1.0 / (i as f64 + 1.0)).collect(),
        };
        Ok(Self { choices, weights })
    }

    pub fn default_sizes() -> Self {
        Self::new(vec![1, 2, 3, 4, 8, 16, 32, 64, 128], None)
            .expect("built-in default powerlaw sizes are always valid")
    }
}

impl JobSizeSampler for PowerlawSampler {
    fn sample(&self, rng: &mut dyn rand::RngCore) -> u32 {
        let dist = WeightedIndex::new(&self.weights)
            .expect("weights validated non-empty and non-negative at construction");
        let idx = dist.sample(rng);
        coerce(self.choices[idx] as i64)
    }
}

/// `mixed`: 70% `U{1, min(5,max)}`, 20% `U{6, min(20,max)}`, 10%
/// `U{21, min(200,max)}`.
#[derive(Debug, Clone, Copy)]
pub struct MixedSampler {
    pub max: u32,
}

impl Default for MixedSampler {
    fn default() -> Self {
        Self { max: 200 }
    }
}

impl JobSizeSampler for MixedSampler {
    fn sample(&self, rng: &mut dyn rand::RngCore) -> u32 {
        let r: f64 = rng.gen_range(0.0..1.0);
        let n = if r < 0.7 {
            rng.gen_range(1..=5.min(self.max).max(1))
        } else if r < 0.9 {
            rng.gen_range(6..=20.min(self.max).max(6))
        } else {
            rng.gen_range(21..=200.min(self.max).max(21))
        };
        coerce(n as i64)
    }
}

/// The `jobsize_kind` + `jobsize_params` pair from spec.md §6's simulation
/// boundary entry point, as one value instead of a stringly-typed kind plus
/// a param bag — constructed by the CLI layer from its parsed flags.
#[derive(Debug, Clone)]
pub enum JobSizeSpec {
    Fixed(u32),
    Uniform { lo: u32, hi: u32 },
    Powerlaw { choices: Vec<u32>, weights: Option<Vec<f64>> },
    Mixed { max: u32 },
}

impl Default for JobSizeSpec {
    fn default() -> Self {
        Self::Fixed(3)
    }
}

impl JobSizeSpec {
    pub fn build(&self) -> SparrowResult<Arc<dyn JobSizeSampler>> {
        Ok(match self {
            Self::Fixed(k) => Arc::new(FixedSampler(*k)),
            Self::Uniform { lo, hi } => Arc::new(UniformSampler::new(*lo, *hi)?),
            Self::Powerlaw { choices, weights } => {
                Arc::new(PowerlawSampler::new(choices.clone(), weights.clone())?)
            }
            Self::Mixed { max } => Arc::new(MixedSampler { max: *max }),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn fixed_sampler_ignores_rng() {
        let s = FixedSampler(7);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert_eq!(s.sample(&mut rng), 7);
    }

    #[test]
    fn uniform_rejects_inverted_range() {
        assert!(UniformSampler::new(10, 1).is_err());
    }

    #[test]
    fn uniform_stays_in_bounds() {
        let s = UniformSampler::new(2, 4).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let v = s.sample(&mut rng);
            assert!((2..=4).contains(&v));
        }
    }

    #[test]
    fn powerlaw_only_returns_configured_choices() {
        let s = PowerlawSampler::default_sizes();
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let allowed = [1, 2, 3, 4, 8, 16, 32, 64, 128];
        for _ in 0..200 {
            assert!(allowed.contains(&s.sample(&mut rng)));
        }
    }

    #[test]
    fn mixed_never_exceeds_configured_max() {
        let s = MixedSampler { max: 10 };
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        for _ in 0..500 {
            let v = s.sample(&mut rng);
            assert!(v >= 1 && v <= 10);
        }
    }

    #[test]
    fn coercion_floors_at_one() {
        assert_eq!(coerce(0), 1);
        assert_eq!(coerce(-5), 1);
    }

    #[test]
    fn jobsize_spec_rejects_invalid_uniform_range() {
        let spec = JobSizeSpec::Uniform { lo: 10, hi: 1 };
        assert!(spec.build().is_err());
    }

    #[test]
    fn jobsize_spec_builds_fixed_by_default() {
        let spec = JobSizeSpec::default();
        let sampler = spec.build().unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert_eq!(sampler.sample(&mut rng), 3);
    }
}
