//! Compute backends
//!
//! A backend owns the device-side buffers and runs [`Kernel`]s over them in
//! submission order. Buffers cross the boundary as raw bytes of fixed-width
//! numeric arrays; [`write_typed`] and [`read_typed`] do the casting.

mod cpu;
#[cfg(feature = "gpu")]
mod gpu;

pub use cpu::CpuBackend;
#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;

use crate::environment::KernelParams;
use crate::kernels::{Kernel, RayRecord};
use crate::{Error, Result};
use bytemuck::Pod;
use glam::{UVec2, UVec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device buffers bound to every kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    /// Packed cells, `u64` each
    Grid,
    /// Per-pixel random state, `u32` each
    Seeds,
    /// Unit direction pool for the bake, `[f32; 4]` each
    Directions,
    /// Per-pixel [`RayRecord`]
    Rays,
    /// Per-pixel first-hit distance, `f32`
    Distance,
    /// Per-pixel packed RGB, `u32`
    Intensity,
    /// Per-pixel blurred distance, `f32`
    Blurred,
    /// Per voxel face packed RGB, `u32`
    Surface,
}

impl BufferId {
    pub const ALL: [Self; 8] = [
        Self::Grid,
        Self::Seeds,
        Self::Directions,
        Self::Rays,
        Self::Distance,
        Self::Intensity,
        Self::Blurred,
        Self::Surface,
    ];

    /// Size of one element in bytes
    pub const fn element_size(self) -> usize {
        match self {
            Self::Grid => 8,
            Self::Directions => 16,
            Self::Rays => std::mem::size_of::<RayRecord>(),
            Self::Seeds | Self::Distance | Self::Intensity | Self::Blurred | Self::Surface => 4,
        }
    }

    /// Binding slot in the kernel bind group (0 is the parameter block)
    pub const fn binding(self) -> u32 {
        self as u32 + 1
    }
}

/// Element counts of every buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub pixels: usize,
    pub cells: usize,
    pub directions: usize,
}

impl BufferLayout {
    pub fn new(params: &KernelParams) -> Self {
        Self::for_frame(
            params.image_size(),
            params.grid_size(),
            params.direction_count,
        )
    }

    pub fn for_frame(image: UVec2, grid: UVec3, directions: u32) -> Self {
        Self {
            pixels: image.x as usize * image.y as usize,
            cells: grid.as_u64vec3().element_product() as usize,
            directions: directions as usize,
        }
    }

    pub fn len(&self, buffer: BufferId) -> usize {
        match buffer {
            BufferId::Grid => self.cells,
            BufferId::Surface => self.cells * 6,
            BufferId::Directions => self.directions,
            BufferId::Seeds
            | BufferId::Rays
            | BufferId::Distance
            | BufferId::Intensity
            | BufferId::Blurred => self.pixels,
        }
    }

    pub fn byte_size(&self, buffer: BufferId) -> usize {
        self.len(buffer) * buffer.element_size()
    }

    pub(crate) fn check(&self, buffer: BufferId, actual: usize) -> Result<()> {
        let expected = self.byte_size(buffer);
        if expected == actual {
            Ok(())
        } else {
            Err(Error::BufferSize {
                buffer,
                expected,
                actual,
            })
        }
    }
}

/// A device that holds the kernel buffers and executes kernels in order
pub trait ComputeBackend: Send {
    /// Human readable device description
    fn name(&self) -> String;

    /// (Re)allocate every buffer for `layout`; contents start zeroed
    fn allocate(&mut self, layout: BufferLayout) -> Result<()>;

    fn layout(&self) -> Option<BufferLayout>;

    /// Replace the whole contents of `buffer`
    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()>;

    /// Run `kernel` over its index space. Later calls observe earlier writes.
    fn dispatch(&mut self, kernel: Kernel, params: &KernelParams) -> Result<()>;

    /// Block until queued work is done and copy `buffer` back to the host
    fn read_buffer(&mut self, buffer: BufferId) -> Result<Vec<u8>>;
}

pub fn write_typed<T: Pod>(
    backend: &mut dyn ComputeBackend,
    buffer: BufferId,
    data: &[T],
) -> Result<()> {
    backend.write_buffer(buffer, bytemuck::cast_slice(data))
}

pub fn read_typed<T: Pod>(backend: &mut dyn ComputeBackend, buffer: BufferId) -> Result<Vec<T>> {
    let bytes = backend.read_buffer(buffer)?;
    if bytes.len() % std::mem::size_of::<T>() != 0 {
        return Err(Error::Readback(format!(
            "{buffer:?} returned {} bytes, not a multiple of {}",
            bytes.len(),
            std::mem::size_of::<T>()
        )));
    }
    Ok(bytemuck::pod_collect_to_vec(&bytes))
}

/// Which backend to run kernels on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Host threads via rayon
    Cpu,
    /// wgpu compute pipelines
    #[default]
    Gpu,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" | "host" => Ok(Self::Cpu),
            "gpu" | "wgpu" => Ok(Self::Gpu),
            _ => Err(Error::InvalidParameter(format!(
                "unknown backend '{s}', expected cpu or gpu"
            ))),
        }
    }
}

/// Initialize the requested backend
///
/// A missing GPU is reported as [`Error::DeviceUnavailable`]; there is no
/// silent fallback to the host backend.
pub fn create_backend(kind: BackendKind) -> Result<Box<dyn ComputeBackend>> {
    let backend: Box<dyn ComputeBackend> = match kind {
        BackendKind::Cpu => Box::new(CpuBackend::new()),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Box::new(GpuBackend::new()?),
        #[cfg(not(feature = "gpu"))]
        BackendKind::Gpu => {
            return Err(Error::DeviceUnavailable(
                "voxtrace-render was built without the `gpu` feature".into(),
            ));
        }
    };
    tracing::info!("using {} backend: {}", kind, backend.name());
    Ok(backend)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_byte_sizes() {
        let layout = BufferLayout {
            pixels: 6,
            cells: 27,
            directions: 10,
        };
        assert_eq!(layout.byte_size(BufferId::Grid), 216);
        assert_eq!(layout.byte_size(BufferId::Surface), 27 * 6 * 4);
        assert_eq!(layout.byte_size(BufferId::Rays), 6 * 32);
        assert_eq!(layout.byte_size(BufferId::Directions), 160);
        assert!(layout.check(BufferId::Seeds, 24).is_ok());
        assert!(matches!(
            layout.check(BufferId::Seeds, 20),
            Err(Error::BufferSize { expected: 24, actual: 20, .. })
        ));
    }

    #[test]
    fn test_bindings_follow_parameter_block() {
        let bindings: Vec<u32> = BufferId::ALL.iter().map(|b| b.binding()).collect();
        assert_eq!(bindings, (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn test_parse_backend_kind() {
        assert_eq!("CPU".parse::<BackendKind>().unwrap(), BackendKind::Cpu);
        assert_eq!("wgpu".parse::<BackendKind>().unwrap(), BackendKind::Gpu);
        assert!("tpu".parse::<BackendKind>().is_err());
    }
}
