//! Seeded random sample generation
//!
//! Every run owns its generator; there is no process-wide random state.
//! A generator can be restarted to reproduce the same sequence.

use rand::rngs::{SmallRng, StdRng};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::standard_normal;

/// Underlying pseudo random algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RandomGeneratorType {
    /// Cryptographically strong ChaCha based generator
    #[default]
    Standard,
    /// Xoshiro based generator, faster but weaker
    Fast,
}

/// Random generator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomSettings {
    pub generator: RandomGeneratorType,

    /// Primary seed
    pub seed: u64,

    /// Secondary seed, mixed into the primary one
    pub seed_b: u64,

    /// When false the generator is seeded from system entropy
    pub is_repeatable: bool,
}

impl Default for RandomSettings {
    fn default() -> Self {
        Self {
            generator: RandomGeneratorType::Standard,
            seed: 0,
            seed_b: 0,
            is_repeatable: true,
        }
    }
}

impl RandomSettings {
    fn combined_seed(&self) -> u64 {
        self.seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(self.seed_b.rotate_left(32))
    }
}

#[derive(Debug, Clone)]
enum GeneratorState {
    Standard(StdRng),
    Fast(SmallRng),
}

/// Source of uniform and standard normal draws for one run
#[derive(Debug, Clone)]
pub struct RandomSampleGenerator {
    settings: RandomSettings,
    state: GeneratorState,
}

impl RandomSampleGenerator {
    pub fn new(settings: RandomSettings) -> Self {
        let state = Self::create_state(&settings);
        Self { settings, state }
    }

    fn create_state(settings: &RandomSettings) -> GeneratorState {
        let seed = if settings.is_repeatable {
            settings.combined_seed()
        } else {
            rand::rng().random()
        };
        match settings.generator {
            RandomGeneratorType::Standard => GeneratorState::Standard(StdRng::seed_from_u64(seed)),
            RandomGeneratorType::Fast => GeneratorState::Fast(SmallRng::seed_from_u64(seed)),
        }
    }

    /// Restart the sequence from the configured seed
    pub fn restart(&mut self) {
        self.state = Self::create_state(&self.settings);
    }

    pub fn settings(&self) -> &RandomSettings {
        &self.settings
    }

    /// Uniform draw in the open interval (0, 1)
    pub fn next_uniform(&mut self) -> f64 {
        loop {
            let r: f64 = match &mut self.state {
                GeneratorState::Standard(rng) => rng.random(),
                GeneratorState::Fast(rng) => rng.random(),
            };
            if r > 0.0 {
                return r;
            }
        }
    }

    /// Standard normal draw by inverse transform
    pub fn next_standard_normal(&mut self) -> f64 {
        standard_normal::get_u_from_p(self.next_uniform())
    }

    /// Vector of independent standard normal draws
    pub fn next_u_vector(&mut self, count: usize) -> Vec<f64> {
        (0..count).map(|_| self.next_standard_normal()).collect()
    }

    /// Uniformly distributed unit vector (direction) in `count` dimensions
    pub fn next_direction(&mut self, count: usize) -> Vec<f64> {
        loop {
            let u = self.next_u_vector(count);
            let norm = u.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                return u.iter().map(|v| v / norm).collect();
            }
        }
    }
}
