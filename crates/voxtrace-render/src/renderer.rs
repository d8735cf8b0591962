//! Frame orchestration
//!
//! The [`Renderer`] owns the camera, the compute backend and everything the
//! backend holds on the grid's behalf. Derived buffers carry explicit dirty
//! state: the grid mirror and the surface cache remember the grid revision
//! they were built from, and ray origins are flagged whenever the camera
//! changes. [`Renderer::dispatch`] brings stale buffers up to date before
//! running the kernels of a mode.

use crate::backend::{BufferId, BufferLayout, ComputeBackend, read_typed, write_typed};
use crate::camera::{Camera, Projection, RenderMode};
use crate::environment::{KernelParams, TraceSettings};
use crate::kernels::{Kernel, RayRecord, pack_rgb, unpack_rgb};
use crate::random::RandomSource;
use crate::{Error, Result};
use glam::{UVec2, UVec3, Vec3};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Instant;
use voxtrace_core::grid::Grid;

/// Name of the file written by [`Renderer::snapshot`]
pub const SNAPSHOT_FILE_NAME: &str = "snapshot.png";

/// Kernel driver for one camera looking into one grid
pub struct Renderer {
    camera: Camera,
    settings: TraceSettings,
    backend: Box<dyn ComputeBackend>,
    image_size: UVec2,
    grid_size: UVec3,
    direction_cursor: u32,
    synced_grid_revision: Option<u64>,
    baked_revision: Option<u64>,
    origins_dirty: bool,
    presented: RenderMode,
}

impl Renderer {
    /// Allocate device buffers, upload random state and mirror the grid
    ///
    /// The image size is the camera viewport. Ray origins and the surface
    /// cache are left dirty until the first dispatch or an explicit call.
    pub fn new(
        camera: Camera,
        grid: &Grid,
        settings: TraceSettings,
        mut backend: Box<dyn ComputeBackend>,
        seed: u64,
    ) -> Result<Self> {
        let image_size = camera.viewport();
        if image_size.cmpeq(UVec2::ZERO).any() {
            return Err(Error::InvalidParameter(format!(
                "image size must be non-zero, got {image_size}"
            )));
        }
        settings.validate_for_image(image_size)?;

        backend.allocate(BufferLayout::for_frame(
            image_size,
            grid.dimensions(),
            settings.direction_pool_size,
        ))?;

        let presented = camera.mode;
        let mut renderer = Self {
            camera,
            settings,
            backend,
            image_size,
            grid_size: grid.dimensions(),
            direction_cursor: 0,
            synced_grid_revision: None,
            baked_revision: None,
            origins_dirty: true,
            presented,
        };

        let mut random = RandomSource::new(seed);
        let seeds = random.seed_table(renderer.pixel_count());
        let directions = random.direction_pool(renderer.settings.direction_pool_size as usize);
        write_typed(renderer.backend.as_mut(), BufferId::Seeds, &seeds)?;
        write_typed(renderer.backend.as_mut(), BufferId::Directions, &directions)?;
        renderer.update_grid_buffer(grid)?;

        tracing::info!(
            "renderer ready: {}x{} image, {} grid, {} backend",
            image_size.x,
            image_size.y,
            renderer.grid_size,
            renderer.backend.name()
        );
        Ok(renderer)
    }

    /// Parameter block for the current camera and settings
    pub fn params(&self) -> KernelParams {
        KernelParams::new(
            &self.camera,
            &self.settings,
            self.image_size,
            self.grid_size,
            self.settings.direction_pool_size,
        )
        .with_cursor(self.direction_cursor)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn settings(&self) -> &TraceSettings {
        &self.settings
    }

    pub fn image_size(&self) -> UVec2 {
        self.image_size
    }

    pub fn pixel_count(&self) -> usize {
        self.image_size.x as usize * self.image_size.y as usize
    }

    pub fn backend_name(&self) -> String {
        self.backend.name()
    }

    /// Position of the next bake sample in the direction pool
    pub fn direction_cursor(&self) -> u32 {
        self.direction_cursor
    }

    /// Whether the device copy of `grid` is current
    pub fn is_grid_synced(&self, grid: &Grid) -> bool {
        self.synced_grid_revision == Some(grid.revision())
    }

    /// Whether the surface cache was baked from the current `grid`
    pub fn is_bake_current(&self, grid: &Grid) -> bool {
        self.baked_revision == Some(grid.revision())
    }

    pub fn origins_dirty(&self) -> bool {
        self.origins_dirty
    }

    /// Upload the packed grid
    pub fn update_grid_buffer(&mut self, grid: &Grid) -> Result<()> {
        if grid.dimensions() != self.grid_size {
            return Err(Error::InvalidParameter(format!(
                "grid is {} but buffers were allocated for {}",
                grid.dimensions(),
                self.grid_size
            )));
        }
        write_typed(self.backend.as_mut(), BufferId::Grid, &grid.packed())?;
        self.synced_grid_revision = Some(grid.revision());
        tracing::debug!("uploaded grid revision {}", grid.revision());
        Ok(())
    }

    /// Regenerate every camera ray
    pub fn recompute_ray_origins(&mut self) -> Result<()> {
        let params = self.params();
        self.backend.dispatch(Kernel::RayOrigins, &params)?;
        self.origins_dirty = false;
        Ok(())
    }

    /// Bake the per-face ambient cache from `grid`
    pub fn bake_surfaces(&mut self, grid: &Grid) -> Result<()> {
        if !self.is_grid_synced(grid) {
            self.update_grid_buffer(grid)?;
        }

        let start = Instant::now();
        let params = self.params();
        self.backend.dispatch(Kernel::Bake, &params)?;

        let lanes = Kernel::Bake.lane_count(&params) as u32;
        self.direction_cursor = self
            .direction_cursor
            .wrapping_add(lanes.wrapping_mul(self.settings.bake_samples));
        self.baked_revision = Some(grid.revision());

        tracing::info!(
            "baked {} faces x {} samples in {:.2?}",
            lanes,
            self.settings.bake_samples,
            start.elapsed()
        );
        Ok(())
    }

    /// Run the kernels of `mode`, resynchronizing stale buffers first
    pub fn dispatch(&mut self, grid: &Grid, mode: RenderMode) -> Result<()> {
        if !self.is_grid_synced(grid) {
            tracing::warn!(
                "grid changed to revision {} without a buffer update, re-uploading",
                grid.revision()
            );
            self.update_grid_buffer(grid)?;
        }
        if self.origins_dirty {
            self.recompute_ray_origins()?;
        }

        let params = self.params();
        match mode {
            RenderMode::Trace => {
                if self.settings.use_surface_cache && !self.is_bake_current(grid) {
                    tracing::warn!("surface cache is stale, baking before trace");
                    self.bake_surfaces(grid)?;
                }
                self.backend.dispatch(Kernel::Trace, &params)?;
            }
            RenderMode::Lidar => {
                self.backend.dispatch(Kernel::Lidar, &params)?;
                self.backend.dispatch(Kernel::DistanceBlur, &params)?;
            }
        }
        self.presented = mode;
        tracing::debug!("dispatched {} frame", mode);
        Ok(())
    }

    /// Read back the output of the last dispatch as an RGB image
    ///
    /// Trace frames show the packed intensity, lidar frames show the blurred
    /// distance as grey.
    pub fn image(&mut self) -> Result<RgbImage> {
        match self.presented {
            RenderMode::Trace => {
                let intensity = self.intensity()?;
                Ok(self.to_image(|index| rgb_bytes(intensity[index])))
            }
            RenderMode::Lidar => {
                let blurred = self.blurred()?;
                Ok(self.to_image(|index| {
                    let grey = (blurred[index].clamp(0.0, 255.0) + 0.5) as u8;
                    [grey; 3]
                }))
            }
        }
    }

    /// Dispatch `mode` and read back the frame
    pub fn render(&mut self, grid: &Grid, mode: RenderMode) -> Result<RgbImage> {
        self.dispatch(grid, mode)?;
        self.image()
    }

    /// Average `samples` trace dispatches into linear RGB per pixel
    pub fn accumulate(&mut self, grid: &Grid, samples: u32) -> Result<Vec<Vec3>> {
        if samples == 0 {
            return Err(Error::InvalidParameter("sample count must be non-zero".into()));
        }
        let mut sum = vec![Vec3::ZERO; self.pixel_count()];
        for _ in 0..samples {
            self.dispatch(grid, RenderMode::Trace)?;
            for (total, packed) in sum.iter_mut().zip(self.intensity()?) {
                *total += unpack_rgb(packed);
            }
        }
        let scale = 1.0 / samples as f32;
        Ok(sum.into_iter().map(|total| total * scale).collect())
    }

    /// Accumulate `samples` trace dispatches into an image
    pub fn accumulated_image(&mut self, grid: &Grid, samples: u32) -> Result<RgbImage> {
        let average = self.accumulate(grid, samples)?;
        Ok(self.to_image(|index| rgb_bytes(pack_rgb(average[index]))))
    }

    /// Write an accumulated trace image to `directory/snapshot.png`
    pub fn snapshot(&mut self, grid: &Grid, samples: u32, directory: &Path) -> Result<PathBuf> {
        let image = self.accumulated_image(grid, samples)?;
        std::fs::create_dir_all(directory)?;
        let path = directory.join(SNAPSHOT_FILE_NAME);
        image.save(&path)?;
        tracing::info!("saved snapshot of {} samples to {}", samples, path.display());
        Ok(path)
    }

    pub fn intensity(&mut self) -> Result<Vec<u32>> {
        read_typed(self.backend.as_mut(), BufferId::Intensity)
    }

    pub fn distances(&mut self) -> Result<Vec<f32>> {
        read_typed(self.backend.as_mut(), BufferId::Distance)
    }

    pub fn blurred(&mut self) -> Result<Vec<f32>> {
        read_typed(self.backend.as_mut(), BufferId::Blurred)
    }

    pub fn rays(&mut self) -> Result<Vec<RayRecord>> {
        read_typed(self.backend.as_mut(), BufferId::Rays)
    }

    pub fn seeds(&mut self) -> Result<Vec<u32>> {
        read_typed(self.backend.as_mut(), BufferId::Seeds)
    }

    /// Replace the per-pixel random state
    pub fn set_seeds(&mut self, seeds: &[u32]) -> Result<()> {
        write_typed(self.backend.as_mut(), BufferId::Seeds, seeds)
    }

    /// Baked per-face colors, indexed `cell * 6 + face`
    pub fn surface_cache(&mut self) -> Result<Vec<u32>> {
        read_typed(self.backend.as_mut(), BufferId::Surface)
    }

    /// Move along the view direction; see [`Camera::move_by`]
    pub fn move_camera(&mut self, magnitude: f32, grid: &Grid) -> bool {
        let moved = self.camera.move_by(magnitude, grid);
        self.origins_dirty |= moved;
        moved
    }

    pub fn set_view_direction(&mut self, x: f32, y: f32) {
        self.camera.set_view_direction(x, y);
        self.origins_dirty = true;
    }

    pub fn rotate_walk_direction(&mut self, delta: f32) {
        self.camera.rotate_walk_direction(delta);
        self.origins_dirty = true;
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.camera.projection = projection;
        self.origins_dirty = true;
    }

    /// Cycle the camera's render mode
    pub fn switch_mode(&mut self) -> RenderMode {
        self.camera.switch_mode()
    }

    /// Apply an arbitrary camera change
    ///
    /// The viewport is fixed for the lifetime of the renderer.
    pub fn update_camera(&mut self, update: impl FnOnce(&mut Camera)) {
        update(&mut self.camera);
        self.origins_dirty = true;
    }

    fn to_image(&self, pixel: impl Fn(usize) -> [u8; 3]) -> RgbImage {
        let width = self.image_size.x;
        RgbImage::from_fn(width, self.image_size.y, |x, y| {
            image::Rgb(pixel(y as usize * width as usize + x as usize))
        })
    }
}

fn rgb_bytes(packed: u32) -> [u8; 3] {
    let [r, g, b, _] = packed.to_le_bytes();
    [r, g, b]
}
