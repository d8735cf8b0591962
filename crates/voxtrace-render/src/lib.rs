//! voxtrace render - ray-marched light transport through a voxel grid
//!
//! This crate turns a [`voxtrace_core::grid::Grid`] and a [`Camera`] into
//! images, using data-parallel kernels that run either through wgpu compute
//! pipelines or on host threads.
//!
//! ## Features
//!
//! - Stochastic trace with diffuse bounces, mirrors and distance attenuation
//! - Lidar distance view with an inverse-square blur
//! - Per-face ambient surface cache baked from a fixed direction pool
//! - Fish-eye, flat and orthographic projections
//! - Monte-Carlo accumulation and PNG snapshots
//! - Scriptable input sessions for headless replays
//!
//! ## Example
//!
//! ```rust,no_run
//! use voxtrace_render::{BackendKind, RenderConfig, RenderMode};
//!
//! let mut config = RenderConfig::default();
//! config.backend = BackendKind::Cpu;
//! let mut session = config.create_session()?;
//! session.renderer_mut().switch_mode();
//! assert_eq!(session.mode(), RenderMode::Lidar);
//! session.frame()?.save("lidar.png")?;
//! # Ok::<(), voxtrace_render::Error>(())
//! ```

pub mod backend;
pub mod camera;
pub mod config;
pub mod environment;
pub mod kernels;
pub mod random;
pub mod renderer;
pub mod session;

mod error;

pub use error::{Error, Result};

#[cfg(feature = "gpu")]
pub use backend::GpuBackend;
pub use backend::{BackendKind, BufferId, ComputeBackend, CpuBackend, create_backend};
pub use camera::{Camera, Projection, RenderMode};
pub use config::RenderConfig;
pub use environment::{KernelParams, TraceSettings};
pub use kernels::{Kernel, RayRecord};
pub use renderer::{Renderer, SNAPSHOT_FILE_NAME};
pub use session::{Control, InputEvent, Key, Session};
