//! Compute kernels
//!
//! Each kernel exists twice: as WGSL in `shaders/kernels.wgsl` for the GPU
//! backend and as the plain functions below, which the host backend runs
//! lane by lane. Every kernel is a pure function of the parameter block, the
//! bound buffers and its lane index.

pub mod march;
pub mod rng;

use crate::camera::{Projection, spherical};
use crate::environment::KernelParams;
use bytemuck::{Pod, Zeroable};
use glam::{IVec3, UVec3, Vec3};
use march::{Cell, GridView, PathOptions};
use voxtrace_core::voxel::{Face, VoxelKind};

pub use march::{first_hit_distance, hit_face, pack_rgb, trace_path, unpack_rgb};
pub use rng::LaneRng;

/// Distance a baked face origin is pushed off the surface
pub const SURFACE_OFFSET: f32 = 1e-3;

/// A precompiled kernel with a fixed binding list and index space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Per pixel: write the ray origin and direction
    RayOrigins,
    /// Per pixel: follow one stochastic light path, write packed RGB
    Trace,
    /// Per pixel: distance to the first non-empty voxel
    Lidar,
    /// Per pixel: smoothed inverse-square distance for display
    DistanceBlur,
    /// Per voxel face: ambient light averaged over the direction pool
    Bake,
}

impl Kernel {
    pub const ALL: [Self; 5] = [
        Self::RayOrigins,
        Self::Trace,
        Self::Lidar,
        Self::DistanceBlur,
        Self::Bake,
    ];

    /// WGSL entry point name
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::RayOrigins => "ray_origins",
            Self::Trace => "trace",
            Self::Lidar => "lidar",
            Self::DistanceBlur => "distance_blur",
            Self::Bake => "bake",
        }
    }

    /// Must match the `@workgroup_size` of the entry point
    pub fn workgroup_size(self) -> UVec3 {
        match self {
            Self::Bake => UVec3::new(4, 4, 4),
            _ => UVec3::new(8, 8, 1),
        }
    }

    /// Global index space: pixels, or `X × Y × Z·6` voxel faces for the bake
    pub fn index_space(self, params: &KernelParams) -> UVec3 {
        match self {
            Self::Bake => UVec3::new(params.grid_x, params.grid_y, params.grid_z * 6),
            _ => UVec3::new(params.width, params.height, 1),
        }
    }

    /// Workgroups needed to cover the index space
    pub fn workgroups(self, params: &KernelParams) -> UVec3 {
        let space = self.index_space(params);
        let size = self.workgroup_size();
        (space + size - UVec3::ONE) / size
    }

    pub fn lane_count(self, params: &KernelParams) -> usize {
        let space = self.index_space(params).as_u64vec3();
        space.element_product() as usize
    }
}

/// One camera ray, padded to 16-byte vectors for storage buffers
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct RayRecord {
    pub origin: [f32; 4],
    pub direction: [f32; 4],
}

impl RayRecord {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin: origin.extend(0.0).to_array(),
            direction: direction.extend(0.0).to_array(),
        }
    }

    pub fn origin(&self) -> Vec3 {
        Vec3::from_slice(&self.origin[..3])
    }

    pub fn direction(&self) -> Vec3 {
        Vec3::from_slice(&self.direction[..3])
    }
}

/// Ray for pixel `(i, j)`, row 0 at the top
pub fn ray_origin(params: &KernelParams, i: u32, j: u32) -> RayRecord {
    let (w, h) = (params.width as f32, params.height as f32);
    let u = (i as f32 + 0.5) / w - 0.5;
    let v = (0.5 - (j as f32 + 0.5) / h) * h / w;
    let (azimuth, elevation) = (params.azimuth, params.elevation);
    let position = Vec3::new(params.position_x, params.position_y, params.position_z);

    let forward = spherical(azimuth, elevation);
    let right = Vec3::new(azimuth.sin(), -azimuth.cos(), 0.0);
    let up = right.cross(forward);

    match params.projection {
        p if p == Projection::Flat as u32 => {
            let scale = 2.0 * (0.5 * params.field_of_view).tan();
            let direction = (forward + (u * right + v * up) * scale).normalize();
            RayRecord::new(position, direction)
        }
        p if p == Projection::Infinite as u32 => {
            let offset = (u * right + v * up) * params.ray_spacing * w;
            RayRecord::new(position + offset, forward)
        }
        _ => {
            let spread = 1.0 + params.ray_spacing * (u * u + v * v);
            let direction = spherical(
                azimuth + u * params.field_of_view * spread,
                elevation + v * params.field_of_view * spread,
            );
            RayRecord::new(position, direction)
        }
    }
}

/// Trace radiance for one pixel, advancing its random state
pub fn trace_pixel(
    params: &KernelParams,
    grid: &GridView<'_>,
    ray: &RayRecord,
    rng: &mut LaneRng,
) -> u32 {
    let color = trace_path(
        params,
        grid,
        ray.origin(),
        ray.direction(),
        PathOptions {
            rng: Some(rng),
            bounces: params.bounces,
            use_surface_cache: params.use_surface_cache != 0,
        },
    );
    pack_rgb(color)
}

/// Mean of `255 / (d² + 1)` over the in-image neighborhood of `(i, j)`
pub fn blur_pixel(params: &KernelParams, distances: &[f32], i: u32, j: u32) -> f32 {
    let (w, h) = (i64::from(params.width), i64::from(params.height));
    let radius = i64::from(params.blur_radius).min(w.max(h));
    let (i, j) = (i64::from(i), i64::from(j));
    let mut sum = 0.0;
    let mut count = 0u32;

    for nj in (j - radius).max(0)..=(j + radius).min(h - 1) {
        for ni in (i - radius).max(0)..=(i + radius).min(w - 1) {
            let d = distances[(nj * w + ni) as usize];
            sum += 255.0 / (d * d + 1.0);
            count += 1;
        }
    }

    if count == 0 { 0.0 } else { sum / count as f32 }
}

/// Baked ambient color for one voxel face lane (`cell * 6 + face`)
///
/// Only wall faces that look into empty space or out of the grid are baked;
/// every other lane is zero.
pub fn bake_lane(
    params: &KernelParams,
    grid: &GridView<'_>,
    directions: &[[f32; 4]],
    lane: usize,
) -> u32 {
    let Some(face) = Face::from_index(lane % 6) else {
        return 0;
    };
    let d = grid.dimensions();
    let cell_index = (lane / 6) as u32;
    let cell = UVec3::new(
        cell_index % d.x,
        (cell_index / d.x) % d.y,
        cell_index / (d.x * d.y),
    )
    .as_ivec3();

    if Cell::decode(grid.word(cell)).kind != Some(VoxelKind::Wall) {
        return 0;
    }
    let neighbor: IVec3 = cell + face.normal();
    if grid.contains(neighbor) && grid.word(neighbor) != 0 {
        return 0;
    }
    if directions.is_empty() || params.bake_samples == 0 {
        return 0;
    }

    let normal = face.normal().as_vec3();
    let origin = cell.as_vec3() + 0.5 + normal * (0.5 + SURFACE_OFFSET);
    let count = directions.len() as u32;
    let base = params
        .direction_cursor
        .wrapping_add((lane as u32).wrapping_mul(params.bake_samples));

    let mut sum = Vec3::ZERO;
    for s in 0..params.bake_samples {
        let index = base.wrapping_add(s) % count;
        let sample = Vec3::from_slice(&directions[index as usize][..3]);
        let direction = rng::orient(sample, normal);
        sum += trace_path(
            params,
            grid,
            origin,
            direction,
            PathOptions {
                rng: None,
                bounces: 0,
                use_surface_cache: false,
            },
        );
    }
    pack_rgb(sum / params.bake_samples as f32)
}
