//! Host compute backend
//!
//! Runs the kernels from [`crate::kernels`] with one rayon task per lane.
//! Dispatches execute synchronously, so submission order is trivially kept.

use super::{BufferId, BufferLayout, ComputeBackend};
use crate::environment::KernelParams;
use crate::kernels::march::GridView;
use crate::kernels::{self, Kernel, LaneRng, RayRecord};
use crate::{Error, Result};
use rayon::prelude::*;

#[derive(Debug, Default)]
struct HostBuffers {
    grid: Vec<u64>,
    seeds: Vec<u32>,
    directions: Vec<[f32; 4]>,
    rays: Vec<RayRecord>,
    distance: Vec<f32>,
    intensity: Vec<u32>,
    blurred: Vec<f32>,
    surface: Vec<u32>,
}

impl HostBuffers {
    fn zeroed(layout: &BufferLayout) -> Self {
        Self {
            grid: vec![0; layout.len(BufferId::Grid)],
            seeds: vec![0; layout.len(BufferId::Seeds)],
            directions: vec![[0.0; 4]; layout.len(BufferId::Directions)],
            rays: vec![RayRecord::default(); layout.len(BufferId::Rays)],
            distance: vec![0.0; layout.len(BufferId::Distance)],
            intensity: vec![0; layout.len(BufferId::Intensity)],
            blurred: vec![0.0; layout.len(BufferId::Blurred)],
            surface: vec![0; layout.len(BufferId::Surface)],
        }
    }

    fn bytes(&self, buffer: BufferId) -> &[u8] {
        match buffer {
            BufferId::Grid => bytemuck::cast_slice(&self.grid),
            BufferId::Seeds => bytemuck::cast_slice(&self.seeds),
            BufferId::Directions => bytemuck::cast_slice(&self.directions),
            BufferId::Rays => bytemuck::cast_slice(&self.rays),
            BufferId::Distance => bytemuck::cast_slice(&self.distance),
            BufferId::Intensity => bytemuck::cast_slice(&self.intensity),
            BufferId::Blurred => bytemuck::cast_slice(&self.blurred),
            BufferId::Surface => bytemuck::cast_slice(&self.surface),
        }
    }

    fn bytes_mut(&mut self, buffer: BufferId) -> &mut [u8] {
        match buffer {
            BufferId::Grid => bytemuck::cast_slice_mut(&mut self.grid),
            BufferId::Seeds => bytemuck::cast_slice_mut(&mut self.seeds),
            BufferId::Directions => bytemuck::cast_slice_mut(&mut self.directions),
            BufferId::Rays => bytemuck::cast_slice_mut(&mut self.rays),
            BufferId::Distance => bytemuck::cast_slice_mut(&mut self.distance),
            BufferId::Intensity => bytemuck::cast_slice_mut(&mut self.intensity),
            BufferId::Blurred => bytemuck::cast_slice_mut(&mut self.blurred),
            BufferId::Surface => bytemuck::cast_slice_mut(&mut self.surface),
        }
    }
}

/// Compute backend running on host threads
#[derive(Debug, Default)]
pub struct CpuBackend {
    layout: Option<BufferLayout>,
    buffers: HostBuffers,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_params(&self, params: &KernelParams) -> Result<()> {
        let layout = self.layout.ok_or(Error::NotAllocated)?;
        let required = BufferLayout::new(params);
        if required != layout {
            return Err(Error::InvalidParameter(format!(
                "dispatch parameters need {required:?} but buffers hold {layout:?}"
            )));
        }
        Ok(())
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> String {
        format!("host ({} threads)", rayon::current_num_threads())
    }

    fn allocate(&mut self, layout: BufferLayout) -> Result<()> {
        self.buffers = HostBuffers::zeroed(&layout);
        self.layout = Some(layout);
        Ok(())
    }

    fn layout(&self) -> Option<BufferLayout> {
        self.layout
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()> {
        let layout = self.layout.ok_or(Error::NotAllocated)?;
        layout.check(buffer, data.len())?;
        self.buffers.bytes_mut(buffer).copy_from_slice(data);
        Ok(())
    }

    fn dispatch(&mut self, kernel: Kernel, params: &KernelParams) -> Result<()> {
        self.check_params(params)?;
        let width = params.width as usize;
        let HostBuffers {
            grid,
            seeds,
            directions,
            rays,
            distance,
            intensity,
            blurred,
            surface,
        } = &mut self.buffers;
        let view = GridView::new(grid, surface, params.grid_size());

        match kernel {
            Kernel::RayOrigins => {
                rays.par_iter_mut().enumerate().for_each(|(index, ray)| {
                    let (i, j) = ((index % width) as u32, (index / width) as u32);
                    *ray = kernels::ray_origin(params, i, j);
                });
            }
            Kernel::Trace => {
                intensity
                    .par_iter_mut()
                    .zip(seeds.par_iter_mut())
                    .zip(rays.par_iter())
                    .for_each(|((pixel, seed), ray)| {
                        let mut rng = LaneRng::new(*seed);
                        *pixel = kernels::trace_pixel(params, &view, ray, &mut rng);
                        *seed = rng.state();
                    });
            }
            Kernel::Lidar => {
                distance
                    .par_iter_mut()
                    .zip(rays.par_iter())
                    .for_each(|(d, ray)| {
                        *d = kernels::first_hit_distance(
                            params,
                            &view,
                            ray.origin(),
                            ray.direction(),
                        );
                    });
            }
            Kernel::DistanceBlur => {
                let distance = &*distance;
                blurred.par_iter_mut().enumerate().for_each(|(index, b)| {
                    let (i, j) = ((index % width) as u32, (index / width) as u32);
                    *b = kernels::blur_pixel(params, distance, i, j);
                });
            }
            Kernel::Bake => {
                // The bake reads the grid and writes the surface cache, so
                // lanes compute into a fresh buffer that replaces the old one
                let directions: &[[f32; 4]] = directions;
                let baked: Vec<u32> = (0..surface.len())
                    .into_par_iter()
                    .map(|lane| kernels::bake_lane(params, &view, directions, lane))
                    .collect();
                *surface = baked;
            }
        }

        tracing::trace!("host dispatch {:?}", kernel);
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferId) -> Result<Vec<u8>> {
        if self.layout.is_none() {
            return Err(Error::NotAllocated);
        }
        Ok(self.buffers.bytes(buffer).to_vec())
    }
}
