use thiserror::Error;

/// Errors from building volumes and parsing render settings.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A setting or dimension outside its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Volume needs {expected} voxels, got {actual}")]
    VoxelCountMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
