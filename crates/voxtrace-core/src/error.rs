//! Error types for voxtrace-core

use thiserror::Error;

/// Result type alias using voxtrace-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in grid and voxel operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Index or position outside the grid extent
    #[error("Position {position:?} is outside grid of size {dimensions:?}")]
    OutOfBounds {
        position: [f32; 3],
        dimensions: [u32; 3],
    },

    /// A packed cell word that does not decode to a valid voxel
    #[error("Invalid voxel word {word:#018x}: {reason}")]
    InvalidVoxel { word: u64, reason: &'static str },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    pub(crate) fn out_of_bounds(position: impl Into<[f32; 3]>, dimensions: glam::UVec3) -> Self {
        Self::OutOfBounds {
            position: position.into(),
            dimensions: dimensions.to_array(),
        }
    }
}
