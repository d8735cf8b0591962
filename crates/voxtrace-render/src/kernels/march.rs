//! Fixed-step ray marching through the packed grid
//!
//! These are the host versions of the WGSL kernels. Both sides walk the same
//! sample sequence: the `k`-th sample after a (re)start sits at
//! `origin + direction * step_length * k`, and samples that land in the same
//! cell as the previous one are skipped.

use super::rng::LaneRng;
use crate::environment::KernelParams;
use glam::{IVec3, UVec3, Vec3};
use voxtrace_core::voxel::{Face, Rgba8, VoxelKind};

/// Read-only view of the packed grid and its surface cache
#[derive(Debug, Clone, Copy)]
pub struct GridView<'a> {
    cells: &'a [u64],
    surface: &'a [u32],
    dimensions: UVec3,
}

impl<'a> GridView<'a> {
    pub fn new(cells: &'a [u64], surface: &'a [u32], dimensions: UVec3) -> Self {
        Self {
            cells,
            surface,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> UVec3 {
        self.dimensions
    }

    pub fn contains(&self, cell: IVec3) -> bool {
        cell.cmpge(IVec3::ZERO).all() && cell.cmplt(self.dimensions.as_ivec3()).all()
    }

    pub fn linear_index(&self, cell: IVec3) -> usize {
        let d = self.dimensions;
        let c = cell.as_uvec3();
        c.x as usize + d.x as usize * (c.y as usize + d.y as usize * c.z as usize)
    }

    /// Packed word of an in-grid cell; words outside the buffer read as empty
    pub fn word(&self, cell: IVec3) -> u64 {
        self.cells
            .get(self.linear_index(cell))
            .copied()
            .unwrap_or_default()
    }

    /// Baked ambient color of one face of an in-grid cell
    pub fn ambient(&self, cell: IVec3, face: Face) -> Vec3 {
        let index = self.linear_index(cell) * 6 + face.index();
        self.surface
            .get(index)
            .map_or(Vec3::ZERO, |&packed| unpack_rgb(packed))
    }
}

/// The fields of a packed cell word that the kernels look at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub kind: Option<VoxelKind>,
    pub coeff: f32,
    pub color: Vec3,
}

impl Cell {
    pub fn decode(word: u64) -> Self {
        Self {
            kind: VoxelKind::from_tag((word >> 56) as u8),
            coeff: f32::from((word >> 48) as u8) / 255.0,
            color: Rgba8::from_u32(word as u32).to_linear(),
        }
    }
}

/// Axis crossed between two cells, and the face of `hit` it entered through
///
/// Among the axes on which the cells differ, the one with the largest
/// direction component wins. The face normal opposes the ray on that axis.
pub fn hit_face(previous: IVec3, hit: IVec3, direction: Vec3) -> Face {
    let mut axis = 0;
    let mut best = -1.0;
    for candidate in 0..3 {
        if previous[candidate] != hit[candidate] && direction[candidate].abs() > best {
            best = direction[candidate].abs();
            axis = candidate;
        }
    }
    Face::from_axis(axis, direction[axis] <= 0.0)
}

fn normal(face: Face) -> Vec3 {
    face.normal().as_vec3()
}

fn reflect(direction: Vec3, face: Face) -> Vec3 {
    let mut reflected = direction;
    reflected[face.axis()] = -reflected[face.axis()];
    reflected
}

fn cell_of(position: Vec3) -> IVec3 {
    position.floor().as_ivec3()
}

fn void_color(params: &KernelParams) -> Vec3 {
    Vec3::new(params.void_r, params.void_g, params.void_b)
}

/// Path state options that differ between the trace and the bake
#[derive(Debug)]
pub struct PathOptions<'r> {
    pub rng: Option<&'r mut LaneRng>,
    pub bounces: u32,
    pub use_surface_cache: bool,
}

/// Follow one light path and return its radiance in linear RGB
pub fn trace_path(
    params: &KernelParams,
    grid: &GridView<'_>,
    origin: Vec3,
    direction: Vec3,
    options: PathOptions<'_>,
) -> Vec3 {
    let PathOptions {
        mut rng,
        mut bounces,
        use_surface_cache,
    } = options;

    let mut origin = origin;
    let mut direction = direction;
    let mut previous = cell_of(origin);
    let mut tint = Vec3::ONE;
    let mut attenuation = 1.0;

    if !grid.contains(previous) {
        return tint * void_color(params);
    }

    let mut k = 0u32;
    for _ in 0..params.max_steps {
        k += 1;
        attenuation *= params.propagation_length;
        let position = origin + direction * (params.step_length * k as f32);
        let cell = cell_of(position);

        if !grid.contains(cell) {
            return attenuation * tint * void_color(params);
        }
        if cell == previous {
            continue;
        }

        let hit = Cell::decode(grid.word(cell));
        match hit.kind {
            None | Some(VoxelKind::Empty) => {}
            Some(VoxelKind::LocalLight) => return attenuation * tint * hit.color,
            Some(VoxelKind::GlobalLight) => return tint * hit.color,
            Some(VoxelKind::Mirror) => {
                let face = hit_face(previous, cell, direction);
                tint *= hit.coeff;
                origin = position - direction * params.step_length;
                direction = reflect(direction, face);
                k = 0;
                continue;
            }
            Some(VoxelKind::Wall) => {
                let face = hit_face(previous, cell, direction);
                let restart = position - direction * params.step_length;

                if let Some(rng) = rng.as_deref_mut() {
                    if hit.coeff > 0.0 && rng.next_f32() < hit.coeff {
                        origin = restart;
                        direction = reflect(direction, face);
                        k = 0;
                        continue;
                    }
                    if bounces > 0 {
                        bounces -= 1;
                        tint *= hit.color;
                        origin = restart;
                        direction = rng.hemisphere(normal(face));
                        k = 0;
                        continue;
                    }
                }

                let ambient = if use_surface_cache {
                    grid.ambient(cell, face)
                } else {
                    Vec3::ONE
                };
                return attenuation * tint * hit.color * ambient;
            }
        }
        previous = cell;
    }

    Vec3::ZERO
}

/// Distance to the first non-empty cell along a ray
///
/// Rays that leave the grid report the exact distance to the boundary plane
/// they cross. Rays starting outside the grid report zero.
pub fn first_hit_distance(
    params: &KernelParams,
    grid: &GridView<'_>,
    origin: Vec3,
    direction: Vec3,
) -> f32 {
    let mut previous = cell_of(origin);
    if !grid.contains(previous) {
        return 0.0;
    }

    for k in 1..=params.max_steps {
        let distance = params.step_length * k as f32;
        let cell = cell_of(origin + direction * distance);

        if !grid.contains(cell) {
            return exit_distance(origin, direction, grid.dimensions().as_vec3());
        }
        if cell != previous && grid.word(cell) != 0 {
            return distance;
        }
        previous = cell;
    }

    params.step_length * params.max_steps as f32
}

/// Distance from an interior point to the grid box along `direction`
pub fn exit_distance(origin: Vec3, direction: Vec3, extent: Vec3) -> f32 {
    let mut nearest = f32::INFINITY;
    for axis in 0..3 {
        let d = direction[axis];
        if d == 0.0 {
            continue;
        }
        let plane = if d > 0.0 { extent[axis] } else { 0.0 };
        nearest = nearest.min((plane - origin[axis]) / d);
    }
    nearest.max(0.0)
}

/// Pack a linear color as `r | g << 8 | b << 16`, rounding to 8 bits
pub fn pack_rgb(color: Vec3) -> u32 {
    let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u32;
    channel(color.x) | channel(color.y) << 8 | channel(color.z) << 16
}

pub fn unpack_rgb(packed: u32) -> Vec3 {
    Vec3::new(
        (packed & 0xFF) as f32,
        ((packed >> 8) & 0xFF) as f32,
        ((packed >> 16) & 0xFF) as f32,
    ) / 255.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::environment::TraceSettings;
    use approx::assert_relative_eq;
    use voxtrace_core::grid::Grid;
    use voxtrace_core::voxel::Voxel;

    fn params_for(grid: &Grid, settings: &TraceSettings) -> KernelParams {
        let camera = crate::camera::Camera::new(Vec3::ZERO, 1, 1);
        KernelParams::new(
            &camera,
            settings,
            glam::UVec2::ONE,
            grid.dimensions(),
            1,
        )
    }

    fn unlit_path<'r>() -> PathOptions<'r> {
        PathOptions {
            rng: None,
            bounces: 0,
            use_surface_cache: false,
        }
    }

    /// Five cells in a row: a white light at x = 0 and a mirror at x = 4
    fn mirror_corridor(coeff: u8) -> Grid {
        let mut grid = Grid::new(UVec3::new(5, 1, 1)).unwrap();
        grid.set(UVec3::ZERO, Voxel::local_light(Rgba8::WHITE)).unwrap();
        grid.set(UVec3::new(4, 0, 0), Voxel::mirror(coeff)).unwrap();
        grid
    }

    #[test]
    fn test_lidar_adjacent_wall() {
        let grid = voxtrace_core::scene::shell(UVec3::splat(3), Voxel::wall(Rgba8::RED)).unwrap();
        let cells = grid.packed();
        let view = GridView::new(&cells, &[], grid.dimensions());
        let params = params_for(&grid, &TraceSettings::default());

        for direction in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z] {
            let distance = first_hit_distance(&params, &view, Vec3::splat(1.5), direction);
            assert_relative_eq!(distance, 1.0);
        }
    }

    #[test]
    fn test_lidar_open_space_reaches_boundary() {
        let grid = Grid::new(UVec3::new(10, 4, 4)).unwrap();
        let cells = grid.packed();
        let view = GridView::new(&cells, &[], grid.dimensions());
        let params = params_for(&grid, &TraceSettings::default());

        let distance = first_hit_distance(&params, &view, Vec3::new(2.25, 2.0, 2.0), Vec3::X);
        assert_relative_eq!(distance, 7.75);

        let diagonal = Vec3::new(1.0, 1.0, 0.0).normalize();
        let distance = first_hit_distance(&params, &view, Vec3::new(2.0, 2.0, 2.0), diagonal);
        assert_relative_eq!(distance, 2.0 * std::f32::consts::SQRT_2, epsilon = 1e-5);

        // Starting outside sees nothing at all
        let distance = first_hit_distance(&params, &view, Vec3::new(-1.0, 2.0, 2.0), Vec3::X);
        assert_relative_eq!(distance, 0.0);
    }

    #[test]
    fn test_lidar_budget_exhaustion() {
        let grid = Grid::new(UVec3::splat(64)).unwrap();
        let cells = grid.packed();
        let view = GridView::new(&cells, &[], grid.dimensions());
        let settings = TraceSettings {
            propagation_length: 1.0,
            step_cap: 5,
            ..TraceSettings::default()
        };
        let params = params_for(&grid, &settings);

        let distance = first_hit_distance(&params, &view, Vec3::splat(0.5), Vec3::X);
        assert_relative_eq!(distance, 5.0);
    }

    #[test]
    fn test_unlit_trace_returns_wall_color() {
        let grid = voxtrace_core::scene::shell(UVec3::splat(3), Voxel::wall(Rgba8::RED)).unwrap();
        let cells = grid.packed();
        let view = GridView::new(&cells, &[], grid.dimensions());
        let params = params_for(&grid, &TraceSettings::unlit());

        let color = trace_path(&params, &view, Vec3::splat(1.5), Vec3::X, unlit_path());
        assert_eq!(pack_rgb(color), 0xFF);
    }

    #[test]
    fn test_trace_attenuates_with_distance() {
        let mut grid = Grid::new(UVec3::new(8, 1, 1)).unwrap();
        grid.set(UVec3::new(7, 0, 0), Voxel::local_light(Rgba8::WHITE)).unwrap();
        grid.set(UVec3::new(0, 0, 0), Voxel::global_light(Rgba8::WHITE)).unwrap();
        let cells = grid.packed();
        let view = GridView::new(&cells, &[], grid.dimensions());
        let settings = TraceSettings {
            propagation_length: 0.5,
            ..TraceSettings::unlit()
        };
        let params = params_for(&grid, &settings);

        let origin = Vec3::new(4.5, 0.5, 0.5);
        let local = trace_path(&params, &view, origin, Vec3::X, unlit_path());
        assert_relative_eq!(local.x, 0.125);
        let global = trace_path(&params, &view, origin, Vec3::NEG_X, unlit_path());
        assert_relative_eq!(global.x, 1.0);
    }

    #[test]
    fn test_trace_leaving_grid_sees_void() {
        let grid = Grid::new(UVec3::splat(4)).unwrap();
        let cells = grid.packed();
        let view = GridView::new(&cells, &[], grid.dimensions());
        let settings = TraceSettings {
            void_color: [0.0, 0.0, 1.0],
            ..TraceSettings::unlit()
        };
        let params = params_for(&grid, &settings);

        let color = trace_path(&params, &view, Vec3::splat(1.5), Vec3::Z, unlit_path());
        assert_eq!(pack_rgb(color), 0xFF_0000);
    }

    #[test]
    fn test_full_mirror_keeps_light() {
        let grid = mirror_corridor(255);
        let cells = grid.packed();
        let view = GridView::new(&cells, &[], grid.dimensions());
        let params = params_for(&grid, &TraceSettings::unlit());

        let color = trace_path(&params, &view, Vec3::new(2.5, 0.5, 0.5), Vec3::X, unlit_path());
        assert_eq!(pack_rgb(color), 0xFF_FFFF);
    }

    #[test]
    fn test_half_mirror_halves_light() {
        let grid = mirror_corridor(127);
        let cells = grid.packed();
        let view = GridView::new(&cells, &[], grid.dimensions());
        let params = params_for(&grid, &TraceSettings::unlit());

        let color = trace_path(&params, &view, Vec3::new(2.5, 0.5, 0.5), Vec3::X, unlit_path());
        assert_relative_eq!(color.x, 127.0 / 255.0, epsilon = 1e-6);
        assert_eq!(pack_rgb(color) & 0xFF, 127);
    }

    #[test]
    fn test_wall_bounce_is_tinted_by_albedo() {
        // Grey floor under a white global-light ceiling
        let mut grid = Grid::new(UVec3::new(3, 3, 3)).unwrap();
        for x in 0..3 {
            for y in 0..3 {
                grid.set(UVec3::new(x, y, 0), Voxel::wall(Rgba8::GREY)).unwrap();
                grid.set(UVec3::new(x, y, 2), Voxel::global_light(Rgba8::WHITE)).unwrap();
            }
        }
        let cells = grid.packed();
        let view = GridView::new(&cells, &[], grid.dimensions());
        let settings = TraceSettings {
            bounces: 1,
            ..TraceSettings::unlit()
        };
        let params = params_for(&grid, &settings);

        let mut rng = LaneRng::new(7);
        let mut lit = 0;
        for _ in 0..64 {
            let color = trace_path(
                &params,
                &view,
                Vec3::splat(1.5),
                Vec3::NEG_Z,
                PathOptions {
                    rng: Some(&mut rng),
                    bounces: settings.bounces,
                    use_surface_cache: false,
                },
            );
            // The bounce either reaches the ceiling or escapes sideways
            if pack_rgb(color) == 0x7F_7F7F {
                lit += 1;
            }
            assert!(color.x <= 0.5);
        }
        assert!(lit > 0);
    }

    #[test]
    fn test_hit_face_prefers_dominant_axis() {
        let direction = Vec3::new(0.9, 0.3, 0.0);
        assert_eq!(hit_face(IVec3::ZERO, IVec3::X, direction), Face::NegX);
        assert_eq!(hit_face(IVec3::ZERO, IVec3::new(1, 1, 0), direction), Face::NegX);
        assert_eq!(hit_face(IVec3::ZERO, IVec3::Y, direction), Face::NegY);
        assert_eq!(hit_face(IVec3::ONE, IVec3::new(1, 1, 0), Vec3::NEG_Z), Face::PosZ);
    }

    #[test]
    fn test_pack_rgb_rounds_and_clamps() {
        assert_eq!(pack_rgb(Vec3::new(1.0, 0.0, 0.0)), 0xFF);
        assert_eq!(pack_rgb(Vec3::new(2.0, -1.0, 0.5)), 0x80_00FF);
        assert_eq!(unpack_rgb(0x00_FF00), Vec3::Y);
    }
}
