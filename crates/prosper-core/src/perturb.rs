//! Random scaling of captured values, used to fabricate model updates.
//!
//! Each target is multiplied by an integer percentage drawn uniformly from
//! `[min_percent, max_percent]`. Perturbation compounds: every call scales
//! the value left by the previous call.

use prosper_bridge::Capture;
use prosper_types::{CellValue, VariableId};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::ExerciseConfig;

/// Scale-factor range in whole percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Perturbation {
    min_percent: u32,
    max_percent: u32,
}

impl Perturbation {
    /// A perturbation drawing from `[min_percent, max_percent]`.
    ///
    /// The bounds are swapped if given in the wrong order.
    pub const fn new(min_percent: u32, max_percent: u32) -> Self {
        if min_percent <= max_percent {
            Self {
                min_percent,
                max_percent,
            }
        } else {
            Self {
                min_percent: max_percent,
                max_percent: min_percent,
            }
        }
    }

    /// The range configured for the exercise.
    pub const fn from_config(config: &ExerciseConfig) -> Self {
        Self::new(config.min_percent, config.max_percent)
    }

    /// Draw one scale factor.
    pub fn factor<R: Rng>(&self, rng: &mut R) -> f64 {
        let percent = rng.random_range(self.min_percent..=self.max_percent);
        f64::from(percent) / 100.0
    }

    /// Scale every target in `capture`.
    ///
    /// Targets that are absent, not sampled or not numeric are logged and
    /// left unchanged. Returns the targets that were scaled.
    pub fn apply<R: Rng>(
        &self,
        capture: &mut Capture,
        targets: &[VariableId],
        rng: &mut R,
    ) -> Vec<VariableId> {
        let mut scaled = Vec::with_capacity(targets.len());

        for target in targets {
            let Some(cell) = capture.get_mut(target) else {
                tracing::warn!(variable = %target, "Perturbation target not captured");
                continue;
            };
            let Some(current) = cell.as_number() else {
                tracing::warn!(variable = %target, value = ?cell, "Perturbation target is not numeric");
                continue;
            };

            let factor = self.factor(rng);
            let next = current * factor;
            tracing::debug!(variable = %target, current, factor, next, "Perturbed");
            *cell = CellValue::Number(next);
            scaled.push(target.clone());
        }

        scaled
    }
}

/// A random generator, seeded when `seed` is set.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}
