//! Render configuration
//!
//! Stored as JSON in `{config_dir}/voxtrace/config.json`. Every field has a
//! default, so a partial file (or no file at all) is valid.

use crate::backend::{BackendKind, create_backend};
use crate::camera::{Camera, Projection};
use crate::environment::TraceSettings;
use crate::renderer::Renderer;
use crate::session::Session;
use crate::{Error, Result};
use glam::{UVec2, UVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use voxtrace_core::grid::Grid;
use voxtrace_core::scene::SceneKind;
use voxtrace_core::voxel::Voxel;

/// Which scene to generate and how large
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub kind: SceneKind,
    pub dimensions: [u32; 3],
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            kind: SceneKind::Prison,
            dimensions: [40, 40, 40],
        }
    }
}

/// Initial camera state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Start position; `None` places the camera at `(2, Y - 2, 5)`
    pub position: Option<[f32; 3]>,
    pub azimuth: f32,
    pub elevation: f32,
    pub field_of_view: f32,
    pub ray_spacing: f32,
    pub projection: Projection,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: None,
            azimuth: 0.0,
            elevation: 0.0,
            field_of_view: Camera::DEFAULT_FIELD_OF_VIEW,
            ray_spacing: Camera::DEFAULT_RAY_SPACING,
            projection: Projection::default(),
        }
    }
}

/// Everything needed to start a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub scene: SceneConfig,
    pub camera: CameraConfig,
    pub trace: TraceSettings,
    /// Seed for the per-pixel random state and the direction pool
    pub seed: u64,
    pub backend: BackendKind,
    /// Voxel placed by a click
    pub edit_voxel: Voxel,
    /// Directory receiving `snapshot.png`
    pub snapshot_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 450,
            scene: SceneConfig::default(),
            camera: CameraConfig::default(),
            trace: TraceSettings::default(),
            seed: 0x5EED,
            backend: BackendKind::default(),
            edit_voxel: Grid::DEFAULT_EDIT_VOXEL,
            snapshot_dir: PathBuf::from("."),
        }
    }
}

impl RenderConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("voxtrace").join("config.json"))
    }

    /// Load from `path`, or from [`RenderConfig::default_path`] when `None`
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidParameter(format!(
                "image size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.scene.dimensions.contains(&0) {
            return Err(Error::InvalidParameter(format!(
                "scene dimensions must be non-zero, got {:?}",
                self.scene.dimensions
            )));
        }
        if !(self.camera.field_of_view > 0.0 && self.camera.field_of_view.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "field of view must be positive, got {}",
                self.camera.field_of_view
            )));
        }
        if let Some(position) = self.camera.position {
            let inside = position
                .iter()
                .zip(self.scene.dimensions)
                .all(|(&p, d)| p.is_finite() && p >= 0.0 && p < d as f32);
            if !inside {
                return Err(Error::InvalidParameter(format!(
                    "camera position {position:?} is outside the {:?} grid",
                    self.scene.dimensions
                )));
            }
        }
        self.trace.validate_for_image(UVec2::new(self.width, self.height))
    }

    pub fn scene_dimensions(&self) -> UVec3 {
        UVec3::from_array(self.scene.dimensions)
    }

    /// Generate the configured scene with the configured edit voxel
    pub fn build_grid(&self) -> Result<Grid> {
        let mut grid = self.scene.kind.generate(self.scene_dimensions())?;
        grid.set_edit_voxel(self.edit_voxel);
        Ok(grid)
    }

    pub fn build_camera(&self) -> Camera {
        let d = self.scene_dimensions().as_vec3();
        let position = self
            .camera
            .position
            .map_or(Vec3::new(2.0, d.y - 2.0, 5.0), Vec3::from_array);

        let mut camera = Camera::new(position, self.width, self.height);
        camera.azimuth = self.camera.azimuth;
        camera.elevation = self.camera.elevation;
        camera.field_of_view = self.camera.field_of_view;
        camera.ray_spacing = self.camera.ray_spacing;
        camera.projection = self.camera.projection;
        camera
    }

    /// Create the grid, the backend and the renderer, ready for a first frame
    pub fn create_session(&self) -> Result<Session> {
        self.validate()?;
        let grid = self.build_grid()?;
        let camera = self.build_camera();
        match grid.voxel_at(camera.position) {
            Some(voxel) if voxel.is_empty() => {}
            Some(voxel) => {
                return Err(Error::InvalidParameter(format!(
                    "camera starts inside a {:?} voxel at {}",
                    voxel.kind(),
                    camera.position
                )));
            }
            None => {
                return Err(Error::InvalidParameter(format!(
                    "camera start {} is outside the {} grid",
                    camera.position,
                    grid.dimensions()
                )));
            }
        }

        let backend = create_backend(self.backend)?;
        let renderer = Renderer::new(
            camera,
            &grid,
            self.trace.clone(),
            backend,
            self.seed,
        )?;
        Session::new(grid, renderer, &self.snapshot_dir)
    }
}
