//! Error types for voxtrace-render

use crate::backend::BufferId;
use thiserror::Error;

/// Result type alias using voxtrace-render's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering
#[derive(Error, Debug)]
pub enum Error {
    /// No usable compute device could be initialized
    #[error("Compute device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A kernel program failed to build
    #[error("Kernel compilation failed: {0}")]
    KernelCompileFailure(String),

    /// Reading a device buffer back to the host failed
    #[error("Buffer readback failed: {0}")]
    Readback(String),

    /// Data written to a device buffer does not match its allocated size
    #[error("Buffer {buffer:?} expects {expected} bytes, got {actual}")]
    BufferSize {
        buffer: BufferId,
        expected: usize,
        actual: usize,
    },

    /// Dispatch or readback before buffers were allocated
    #[error("Device buffers have not been allocated")]
    NotAllocated,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Grid or voxel error
    #[error(transparent)]
    Core(#[from] voxtrace_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
