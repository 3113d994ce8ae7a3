//! Injectable randomness for target and parameter selection

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Source of the two random choices an iteration makes
pub trait RandomSource: Send {
    /// Uniform index in `0..len`; `len` is never zero
    fn pick_index(&mut self, len: usize) -> usize;

    /// Uniform integer in `min..=max`; `min <= max`
    fn pick_in_range(&mut self, min: i64, max: i64) -> i64;
}

/// `StdRng`-backed source, seeded or from OS entropy
pub struct RngSource {
    rng: StdRng,
}

impl RngSource {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for RngSource {
    fn pick_index(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }

    fn pick_in_range(&mut self, min: i64, max: i64) -> i64 {
        self.rng.random_range(min..=max)
    }
}

/// Deterministic source that always returns the same choices, clamped to range.
/// An empty range yields index 0.
#[derive(Debug, Clone, Copy)]
pub struct FixedSource {
    pub index: usize,
    pub value: i64,
}

impl RandomSource for FixedSource {
    fn pick_index(&mut self, len: usize) -> usize {
        self.index.min(len.saturating_sub(1))
    }

    fn pick_in_range(&mut self, min: i64, max: i64) -> i64 {
        self.value.clamp(min, max)
    }
}

/// Builds one independent [`RandomSource`] per slot
pub type RandomSourceFactory = Arc<dyn Fn(usize) -> Box<dyn RandomSource> + Send + Sync>;

/// Factory yielding entropy-seeded sources, or per-slot streams derived from `seed`
pub fn source_factory(seed: Option<u64>) -> RandomSourceFactory {
    match seed {
        Some(seed) => Arc::new(move |slot| {
            let stream = seed ^ (slot as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            Box::new(RngSource::seeded(stream)) as Box<dyn RandomSource>
        }),
        None => Arc::new(|_| Box::new(RngSource::from_entropy()) as Box<dyn RandomSource>),
    }
}
