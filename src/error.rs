use thiserror::Error;

use crate::axes::AxisRole;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("neighbourhood extent along axis {axis} must be >= 1 voxel, got {extent}")]
    InvalidNeighbourhood { axis: usize, extent: i64 },

    #[error("required axis {0:?} is not present in the volume")]
    MissingAxis(AxisRole),

    #[error("dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("unable to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("skeleton extraction failed: {0}")]
    Extractor(String),

    #[error("worker panicked: {0}")]
    WorkerPanic(String),

    #[error("{path}: expected {expected} bytes, found {got}")]
    RawSize {
        path: String,
        expected: usize,
        got: usize,
    },

    #[error("unable to infer output format for {0}")]
    UnknownFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
}
