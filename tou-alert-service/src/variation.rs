use std::{
    collections::VecDeque,
    f64::consts::PI,
    sync::Mutex,
};

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Source of uniform samples in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn uniform(&self) -> f64;
}

/// Process-wide thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn uniform(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Reproducible generator for replays and tests.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.random::<f64>(),
            Err(poisoned) => poisoned.into_inner().random::<f64>(),
        }
    }
}

/// Replays a fixed sequence of samples, cycling when exhausted.
#[derive(Debug)]
pub struct FixedRandom {
    samples: Mutex<VecDeque<f64>>,
}

impl FixedRandom {
    /// An empty sequence behaves like a constant 0.5.
    pub fn new(samples: impl IntoIterator<Item = f64>) -> Self {
        let mut samples: VecDeque<f64> = samples.into_iter().collect();
        if samples.is_empty() {
            samples.push_back(0.5);
        }
        Self {
            samples: Mutex::new(samples),
        }
    }

    /// Every draw is 0.25, so `cos(2π·u2) ≈ 0` and the noise vanishes however
    /// concurrent callers interleave.
    pub fn zero_noise() -> Self {
        Self::new([0.25])
    }
}

impl RandomSource for FixedRandom {
    fn uniform(&self) -> f64 {
        let mut samples = match self.samples.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let v = samples.pop_front().unwrap_or_default();
        samples.push_back(v);
        v
    }
}

const MAX_RESAMPLES: usize = 8;

/// Zero-mean Gaussian noise scaled by `magnitude` (Box–Muller).
///
/// `u1` must be strictly positive for the logarithm; zero draws are resampled a
/// few times and then clamped to the smallest positive `f64`.
pub fn gaussian_noise(rng: &dyn RandomSource, magnitude: f64) -> f64 {
    if magnitude <= 0.0 || !magnitude.is_finite() {
        return 0.0;
    }

    let mut u1 = rng.uniform();
    let mut attempts = 0;
    while !(u1 > 0.0) && attempts < MAX_RESAMPLES {
        u1 = rng.uniform();
        attempts += 1;
    }
    let u1 = if u1.is_finite() { u1.clamp(f64::MIN_POSITIVE, 1.0) } else { 0.5 };
    let u2 = rng.uniform();

    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    z * magnitude
}
