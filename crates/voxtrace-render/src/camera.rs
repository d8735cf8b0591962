//! Camera state, movement and orientation

use glam::{UVec2, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;
use voxtrace_core::grid::Grid;

/// Horizontal span covered by pointer look, centered at forward
pub const LOOK_AZIMUTH_SPAN: f32 = TAU;
/// Vertical span covered by pointer look (±0.4π keeps clear of the poles)
pub const LOOK_ELEVATION_SPAN: f32 = 0.8 * PI;

/// How pixel coordinates map to rays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    /// Angular offsets from the view direction, widened towards the edges
    #[default]
    FishEye = 0,
    /// Pinhole perspective onto a flat image plane
    Flat = 1,
    /// Parallel rays from a flat origin plane (orthographic)
    Infinite = 2,
}

/// Which kernel output feeds the presented image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Stochastic light transport
    #[default]
    Trace,
    /// First-hit distance, shown through the distance blur
    Lidar,
}

impl RenderMode {
    pub const ALL: [Self; 2] = [Self::Trace, Self::Lidar];

    /// The next mode in the fixed cycle
    pub fn next(self) -> Self {
        match self {
            Self::Trace => Self::Lidar,
            Self::Lidar => Self::Trace,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Lidar => "lidar",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RenderMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::InvalidParameter(format!("unknown render mode '{s}'")))
    }
}

impl FromStr for Projection {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fish_eye" | "fisheye" => Ok(Self::FishEye),
            "flat" => Ok(Self::Flat),
            "infinite" | "ortho" => Ok(Self::Infinite),
            _ => Err(crate::Error::InvalidParameter(format!(
                "unknown projection '{s}'"
            ))),
        }
    }
}

/// A free-flying camera inside a voxel grid
///
/// The camera does not own the grid; movement checks collisions against the
/// grid it is handed.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Position in grid space
    pub position: Vec3,
    /// Horizontal view angle in radians, from `+x` towards `+y`
    pub azimuth: f32,
    /// Vertical view angle in radians, positive is up
    pub elevation: f32,
    /// Extra azimuth applied to rays only, never to movement
    pub walk_offset: f32,
    /// Field of view in radians
    pub field_of_view: f32,
    /// Fish-eye falloff, or world units between rays for [`Projection::Infinite`]
    pub ray_spacing: f32,
    pub projection: Projection,
    pub mode: RenderMode,
    /// Image size; also maps pointer coordinates to view angles
    viewport: UVec2,
}

impl Camera {
    pub const DEFAULT_FIELD_OF_VIEW: f32 = PI / 3.0;
    pub const DEFAULT_RAY_SPACING: f32 = 0.1;

    /// Create a camera looking along `+x` with a `width × height` viewport
    pub fn new(position: Vec3, width: u32, height: u32) -> Self {
        Self {
            position,
            azimuth: 0.0,
            elevation: 0.0,
            walk_offset: 0.0,
            field_of_view: Self::DEFAULT_FIELD_OF_VIEW,
            ray_spacing: Self::DEFAULT_RAY_SPACING,
            projection: Projection::default(),
            mode: RenderMode::default(),
            viewport: UVec2::new(width, height),
        }
    }

    pub fn viewport(&self) -> UVec2 {
        self.viewport
    }

    /// Unit vector of the stored view direction
    pub fn view_vector(&self) -> Vec3 {
        spherical(self.azimuth, self.elevation)
    }

    /// Azimuth used when generating rays
    pub fn ray_azimuth(&self) -> f32 {
        self.azimuth + self.walk_offset
    }

    /// Step `magnitude` along the view direction
    ///
    /// The move is committed only if the destination lies inside the grid and
    /// its voxel is empty. Returns whether the camera moved.
    pub fn move_by(&mut self, magnitude: f32, grid: &Grid) -> bool {
        let candidate = self.position + self.view_vector() * magnitude;
        let passable = grid
            .voxel_at(candidate)
            .is_some_and(|voxel| voxel.kind().is_passable());

        if passable {
            self.position = candidate;
        }
        tracing::debug!(
            "position {:.3}, {:.3}, {:.3}{}",
            self.position.x,
            self.position.y,
            self.position.z,
            if passable { "" } else { " (blocked)" }
        );
        passable
    }

    /// Point the camera according to a pointer position in the viewport
    pub fn set_view_direction(&mut self, x: f32, y: f32) {
        let size = self.viewport.as_vec2();
        let rel_azimuth = x / size.x;
        let rel_elevation = y / size.y;
        self.azimuth = (rel_azimuth - 0.5) * LOOK_AZIMUTH_SPAN;
        let limit = 0.5 * LOOK_ELEVATION_SPAN;
        self.elevation = ((0.5 - rel_elevation) * LOOK_ELEVATION_SPAN).clamp(-limit, limit);
    }

    /// Azimuth range reachable through [`Camera::set_view_direction`]
    pub fn azimuth_bounds() -> (f32, f32) {
        (-0.5 * LOOK_AZIMUTH_SPAN, 0.5 * LOOK_AZIMUTH_SPAN)
    }

    pub fn rotate_walk_direction(&mut self, delta: f32) {
        self.walk_offset += delta;
    }

    /// Cycle to the next render mode and return it
    pub fn switch_mode(&mut self) -> RenderMode {
        self.mode = self.mode.next();
        tracing::info!("switching render mode to {}", self.mode);
        self.mode
    }
}

/// Unit vector for an azimuth/elevation pair, `z` up
pub fn spherical(azimuth: f32, elevation: f32) -> Vec3 {
    Vec3::new(
        elevation.cos() * azimuth.cos(),
        elevation.cos() * azimuth.sin(),
        elevation.sin(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::UVec3;
    use voxtrace_core::voxel::{Rgba8, Voxel};

    fn open_grid() -> Grid {
        Grid::new(UVec3::new(10, 10, 10)).unwrap()
    }

    #[test]
    fn test_camera_move_commits_inside_empty_space() {
        let grid = open_grid();
        let mut camera = Camera::new(Vec3::new(2.5, 2.5, 2.5), 100, 50);

        assert!(camera.move_by(1.0, &grid));
        assert_relative_eq!(camera.position.x, 3.5);
        assert!(camera.move_by(-2.0, &grid));
        assert_relative_eq!(camera.position.x, 1.5);
    }

    #[test]
    fn test_camera_move_rejected_outside_grid() {
        let grid = open_grid();
        let mut camera = Camera::new(Vec3::new(0.5, 5.5, 5.5), 100, 50);
        let before = camera.position;

        assert!(!camera.move_by(-1.0, &grid));
        assert_eq!(
            camera.position.to_array().map(f32::to_bits),
            before.to_array().map(f32::to_bits)
        );

        camera.azimuth = PI / 2.0;
        camera.position = Vec3::new(5.5, 9.5, 5.5);
        assert!(!camera.move_by(1.0, &grid));
        assert_eq!(camera.position, Vec3::new(5.5, 9.5, 5.5));
    }

    #[test]
    fn test_camera_move_rejected_into_wall() {
        let mut grid = open_grid();
        grid.set(UVec3::new(4, 2, 2), Voxel::wall(Rgba8::RED)).unwrap();
        let mut camera = Camera::new(Vec3::new(3.5, 2.5, 2.5), 100, 50);

        assert!(!camera.move_by(1.0, &grid));
        assert_eq!(camera.position, Vec3::new(3.5, 2.5, 2.5));
        // Lights block movement too
        grid.set(UVec3::new(2, 2, 2), Voxel::local_light(Rgba8::WHITE)).unwrap();
        assert!(!camera.move_by(-1.0, &grid));
    }

    #[test]
    fn test_camera_move_follows_elevation() {
        let grid = open_grid();
        let mut camera = Camera::new(Vec3::new(5.0, 5.0, 5.0), 100, 50);
        camera.elevation = PI / 2.0;

        assert!(camera.move_by(2.0, &grid));
        assert_relative_eq!(camera.position.z, 7.0, epsilon = 1e-5);
        assert_relative_eq!(camera.position.x, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_view_direction_bounds_are_symmetric() {
        let mut camera = Camera::new(Vec3::ZERO, 720, 450);
        let (min, max) = Camera::azimuth_bounds();

        camera.set_view_direction(0.0, 225.0);
        assert_relative_eq!(camera.azimuth, min);
        assert_relative_eq!(camera.elevation, 0.0);

        camera.set_view_direction(720.0, 225.0);
        assert_relative_eq!(camera.azimuth, max);
        assert_relative_eq!(min, -max);

        camera.set_view_direction(360.0, 0.0);
        assert_relative_eq!(camera.azimuth, 0.0);
        assert_relative_eq!(camera.elevation, 0.4 * PI);

        camera.set_view_direction(360.0, 450.0);
        assert_relative_eq!(camera.elevation, -0.4 * PI);
    }

    #[test]
    fn test_walk_offset_only_affects_rays() {
        let grid = open_grid();
        let mut camera = Camera::new(Vec3::new(5.5, 5.5, 5.5), 100, 50);
        camera.rotate_walk_direction(PI / 2.0);

        assert_relative_eq!(camera.ray_azimuth(), PI / 2.0);
        assert!(camera.move_by(1.0, &grid));
        assert_relative_eq!(camera.position.x, 6.5);
        assert_relative_eq!(camera.position.y, 5.5);
    }

    #[test]
    fn test_switch_mode_cycles() {
        let mut camera = Camera::new(Vec3::ZERO, 4, 4);
        assert_eq!(camera.mode, RenderMode::Trace);
        assert_eq!(camera.switch_mode(), RenderMode::Lidar);
        assert_eq!(camera.switch_mode(), RenderMode::Trace);
    }

    #[test]
    fn test_parse_modes_and_projections() {
        assert_eq!("LIDAR".parse::<RenderMode>().unwrap(), RenderMode::Lidar);
        assert_eq!("fish-eye".parse::<Projection>().unwrap(), Projection::FishEye);
        assert_eq!("infinite".parse::<Projection>().unwrap(), Projection::Infinite);
        assert!("sideways".parse::<Projection>().is_err());
    }
}
