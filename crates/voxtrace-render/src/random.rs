//! Host-side random state for the kernels
//!
//! The trace kernel draws from a per-pixel seed table and the bake draws from
//! a fixed pool of unit directions. Both are generated here from one `u64`
//! seed so that a render is reproducible end to end.

use rand::{Rng as _, SeedableRng as _};
use rand_distr::Distribution as _;
use rand_xoshiro::Xoshiro256Plus;

/// Deterministic source of seed tables and direction pools
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: Xoshiro256Plus,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256Plus::seed_from_u64(seed),
        }
    }

    /// `len` non-zero lane seeds
    pub fn seed_table(&mut self, len: usize) -> Vec<u32> {
        (0..len).map(|_| self.rng.random_range(1..=u32::MAX)).collect()
    }

    /// `len` uniformly distributed unit vectors, padded to four lanes
    pub fn direction_pool(&mut self, len: usize) -> Vec<[f32; 4]> {
        (0..len)
            .map(|_| {
                let [x, y, z]: [f32; 3] = rand_distr::UnitSphere.sample(&mut self.rng);
                [x, y, z, 0.0]
            })
            .collect()
    }
}
