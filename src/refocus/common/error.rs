use thiserror::Error;

use crate::refocus::core::boundary::BoundaryMode;

#[derive(Error, Debug)]
pub enum RefocusError {
    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to encode image: {0}")]
    EncodeError(String),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(usize, usize),

    #[error("Dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Boundary mismatch: lambda field uses {field}, solver uses {solver}")]
    BoundaryMismatch {
        field: BoundaryMode,
        solver: BoundaryMode,
    },

    #[error("Out of memory allocating {0} elements")]
    AllocationFailure(usize),

    #[error("Parameter '{name}' out of range: {value} not in [{min}, {max}]")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Cancelled after {0} iterations")]
    Cancelled(usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RefocusError>;
