//! Light transport settings and the kernel parameter block
//!
//! [`TraceSettings`] is the user-facing configuration. [`KernelParams`] is the
//! flat, GPU-ready block that every kernel receives; the host backend reads
//! the very same struct.

use crate::camera::Camera;
use crate::{Error, Result};
use bytemuck::{Pod, Zeroable};
use glam::{UVec2, UVec3};
use serde::{Deserialize, Serialize};

/// Throughput below which a ray no longer contributes visibly
pub const MIN_THROUGHPUT: f32 = 1.0 / 512.0;

/// Settings that control how rays march and what they pick up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Per-step attenuation factor in `(0, 1]`; values near 1 reach far
    pub propagation_length: f32,
    /// Distance advanced per march step, in voxels
    pub step_length: f32,
    /// Hard limit on march steps per ray, across all bounces
    pub step_cap: u32,
    /// Diffuse bounces a trace path may take before terminating on a wall
    pub bounces: u32,
    /// Sample rays per voxel face in the surface bake
    pub bake_samples: u32,
    /// Shade terminal wall hits with the baked per-face ambient color
    pub use_surface_cache: bool,
    /// Neighborhood radius of the distance blur, in pixels
    pub blur_radius: u32,
    /// Color returned by rays that leave the grid (RGB, 0-1)
    pub void_color: [f32; 3],
    /// Trace dispatches averaged per accumulated frame
    pub samples: u32,
    /// Trace dispatches averaged for a snapshot
    pub snapshot_samples: u32,
    /// Unit directions in the bake pool
    pub direction_pool_size: u32,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            propagation_length: 0.99,
            step_length: 1.0,
            step_cap: 4096,
            bounces: 1,
            bake_samples: 64,
            use_surface_cache: true,
            blur_radius: 1,
            void_color: [0.0, 0.0, 0.0],
            samples: 10,
            snapshot_samples: 100,
            direction_pool_size: 65_536,
        }
    }
}

impl TraceSettings {
    /// Settings that make a single trace sample reproduce wall colors exactly
    pub fn unlit() -> Self {
        Self {
            propagation_length: 1.0,
            bounces: 0,
            use_surface_cache: false,
            ..Self::default()
        }
    }

    /// Number of steps a ray may take before its attenuation drops below
    /// [`MIN_THROUGHPUT`], bounded by [`TraceSettings::step_cap`]
    pub fn march_steps(&self) -> u32 {
        if self.propagation_length >= 1.0 {
            return self.step_cap;
        }
        let steps = (MIN_THROUGHPUT.ln() / self.propagation_length.ln()).ceil();
        (steps as u32).clamp(1, self.step_cap)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.propagation_length > 0.0 && self.propagation_length <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "propagation_length must be in (0, 1], got {}",
                self.propagation_length
            )));
        }
        if !(self.step_length > 0.0 && self.step_length.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "step_length must be positive, got {}",
                self.step_length
            )));
        }
        if self.step_cap == 0 {
            return Err(Error::InvalidParameter("step_cap must be non-zero".into()));
        }
        if self.samples == 0
            || self.snapshot_samples == 0
            || self.bake_samples == 0
            || self.direction_pool_size == 0
        {
            return Err(Error::InvalidParameter(
                "sample counts must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// [`TraceSettings::validate`] plus the limits that depend on the image
    ///
    /// The blur neighborhood must be smaller than the image.
    pub fn validate_for_image(&self, image: UVec2) -> Result<()> {
        self.validate()?;
        if self.blur_radius >= image.max_element() {
            return Err(Error::InvalidParameter(format!(
                "blur_radius must be below the larger image side {}, got {}",
                image.max_element(),
                self.blur_radius
            )));
        }
        Ok(())
    }
}

/// Parameter block bound to every kernel dispatch
///
/// This struct must match `Params` in `shaders/kernels.wgsl` exactly. All
/// members are 4-byte scalars so the layout is identical in both languages.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    // Camera
    pub position_x: f32,
    pub position_y: f32,
    pub position_z: f32,
    pub azimuth: f32,
    pub elevation: f32,
    pub field_of_view: f32,
    pub ray_spacing: f32,
    pub projection: u32,

    // Image and grid extents
    pub width: u32,
    pub height: u32,
    pub grid_x: u32,
    pub grid_y: u32,
    pub grid_z: u32,

    // Marching
    pub propagation_length: f32,
    pub step_length: f32,
    pub max_steps: u32,
    pub bounces: u32,
    pub use_surface_cache: u32,

    // Bake and blur
    pub bake_samples: u32,
    pub direction_cursor: u32,
    pub direction_count: u32,
    pub blur_radius: u32,

    // Background
    pub void_r: f32,
    pub void_g: f32,
    pub void_b: f32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}

impl KernelParams {
    /// Size in bytes (a multiple of 16 for uniform binding)
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(
        camera: &Camera,
        settings: &TraceSettings,
        image: UVec2,
        grid: UVec3,
        direction_count: u32,
    ) -> Self {
        Self {
            position_x: camera.position.x,
            position_y: camera.position.y,
            position_z: camera.position.z,
            azimuth: camera.ray_azimuth(),
            elevation: camera.elevation,
            field_of_view: camera.field_of_view,
            ray_spacing: camera.ray_spacing,
            projection: camera.projection as u32,
            width: image.x,
            height: image.y,
            grid_x: grid.x,
            grid_y: grid.y,
            grid_z: grid.z,
            propagation_length: settings.propagation_length,
            step_length: settings.step_length,
            max_steps: settings.march_steps(),
            bounces: settings.bounces,
            use_surface_cache: u32::from(settings.use_surface_cache),
            bake_samples: settings.bake_samples,
            direction_cursor: 0,
            direction_count,
            blur_radius: settings.blur_radius,
            void_r: settings.void_color[0],
            void_g: settings.void_color[1],
            void_b: settings.void_color[2],
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        }
    }

    pub fn with_cursor(mut self, cursor: u32) -> Self {
        self.direction_cursor = cursor;
        self
    }

    pub fn image_size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn grid_size(&self) -> UVec3 {
        UVec3::new(self.grid_x, self.grid_y, self.grid_z)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
