//! Per-lane random state
//!
//! Must stay bit-identical to `rng_next` in `shaders/kernels.wgsl`.

use glam::Vec3;
use std::f32::consts::TAU;

/// Substitute state for a zero seed, which xorshift never leaves
const ZERO_SEED_REPLACEMENT: u32 = 0x9E37_79B9;

/// 32-bit xorshift generator owned by one lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneRng {
    state: u32,
}

impl LaneRng {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { ZERO_SEED_REPLACEMENT } else { seed },
        }
    }

    /// Current state, written back to the seed buffer after a dispatch
    pub fn state(self) -> u32 {
        self.state
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in `[0, 1)` with 24 bits of precision
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / 16_777_216.0
    }

    /// Uniform direction on the hemisphere around `normal`
    pub fn hemisphere(&mut self, normal: Vec3) -> Vec3 {
        let z = 1.0 - 2.0 * self.next_f32();
        let phi = TAU * self.next_f32();
        let r = (1.0 - z * z).max(0.0).sqrt();
        orient(Vec3::new(r * phi.cos(), r * phi.sin(), z), normal)
    }
}

/// Flip `direction` into the hemisphere of `normal`
pub fn orient(direction: Vec3, normal: Vec3) -> Vec3 {
    if direction.dot(normal) < 0.0 {
        -direction
    } else {
        direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_xorshift_sequence() {
        let mut rng = LaneRng::new(1);
        assert_eq!(rng.next_u32(), 270_369);
        assert_eq!(rng.state(), 270_369);
    }

    #[test]
    fn test_zero_seed_is_replaced() {
        let mut rng = LaneRng::new(0);
        assert_ne!(rng.next_u32(), 0);
    }

    #[test]
    fn test_floats_in_unit_interval() {
        let mut rng = LaneRng::new(0xDEAD_BEEF);
        for _ in 0..10_000 {
            let value = rng.next_f32();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn test_hemisphere_directions() {
        let mut rng = LaneRng::new(42);
        let normal = Vec3::NEG_Y;
        let mut mean = Vec3::ZERO;
        for _ in 0..4096 {
            let direction = rng.hemisphere(normal);
            assert_relative_eq!(direction.length(), 1.0, epsilon = 1e-4);
            assert!(direction.dot(normal) >= 0.0);
            mean += direction;
        }
        mean /= 4096.0;
        // Centered on the normal
        assert_relative_eq!(mean.y, -0.5, epsilon = 0.05);
        assert_relative_eq!(mean.x, 0.0, epsilon = 0.05);
    }
}
