// Placeholder values for measures without samples: baseline ± bounded noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::log_history::LogAverages;

/// Relative noise bound applied around a baseline value (±5%).
pub const NOISE_RATIO: f64 = 0.05;

/// Source of uniform samples in `[-1, 1]`.
pub trait NoiseSource {
    fn sample(&mut self) -> f64;
}

/// Seedable random noise; `seeded` gives reproducible sequences for tests.
#[derive(Debug, Clone)]
pub struct StdNoise(StdRng);

impl StdNoise {
    pub fn from_os_rng() -> Self {
        Self(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl NoiseSource for StdNoise {
    fn sample(&mut self) -> f64 {
        self.0.random_range(-1.0..=1.0)
    }
}

/// Constant sample; `FixedNoise(0.0)` disables noise entirely.
#[derive(Debug, Clone, Copy)]
pub struct FixedNoise(pub f64);

impl NoiseSource for FixedNoise {
    fn sample(&mut self) -> f64 {
        self.0
    }
}

/// Long-run averages used to backfill windows that have no real samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub handle_time: f64,
    pub process_time: f64,
    pub error_percentage: f64,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            handle_time: 150.0,
            process_time: 15.0,
            error_percentage: 0.035,
        }
    }
}

impl Baseline {
    /// Takes each positive history average, keeping the default for the rest.
    pub fn from_averages(averages: Option<&LogAverages>) -> Self {
        let default = Self::default();
        let Some(avg) = averages else {
            return default;
        };
        let pick = |value: f64, fallback: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                fallback
            }
        };
        Self {
            handle_time: pick(avg.average_handle_time, default.handle_time),
            process_time: pick(avg.average_process_time, default.process_time),
            error_percentage: pick(avg.error_percentage, default.error_percentage),
        }
    }
}

/// `value ± value * 5%`, rounded to two decimals.
pub fn jitter(value: f64, noise: &mut dyn NoiseSource) -> f64 {
    let u = noise.sample().clamp(-1.0, 1.0);
    round2(value + u * value * NOISE_RATIO)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

