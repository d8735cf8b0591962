//! # voxtrace core
//!
//! Scene state for the voxtrace ray renderer: a dense grid of tagged voxels,
//! their materials and colors, and the procedural layouts that fill a grid.
//!
//! ## Quick Start
//!
//! ```rust
//! use voxtrace_core::prelude::*;
//!
//! let mut grid = SceneKind::Prison.generate(UVec3::splat(40))?;
//! grid.set(UVec3::new(5, 5, 5), Voxel::local_light(Rgba8::WHITE))?;
//! assert_eq!(grid.get(UVec3::new(5, 5, 5))?.kind(), VoxelKind::LocalLight);
//! # Ok::<(), voxtrace_core::Error>(())
//! ```
//!
//! ## Conventions
//!
//! - **Axes**: `z` is up; cell `(x, y, z)` covers `[x, x+1) × [y, y+1) × [z, z+1)`
//! - **Angles**: radians; azimuth is measured from `+x` towards `+y`
//! - **Colors**: 8 bits per channel, packed as `0xRRGGBBAA`

pub mod grid;
pub mod scene;
pub mod voxel;

mod error;

pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::grid::{Grid, Region};
    pub use crate::scene::{SceneFn, SceneKind};
    pub use crate::voxel::{Face, Rgba8, Voxel, VoxelKind};

    // Math (re-export glam)
    pub use glam::{IVec3, UVec3, Vec3};

    // Error handling
    pub use crate::{Error, Result};
}
