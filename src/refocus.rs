//! Iterative refocus
//!
//! Restores images degraded by defocus, Gaussian or motion blur by minimizing
//! a regularized least-squares energy with a stochastic Hopfield network.

pub mod common;
pub mod core;
pub mod config;
pub mod io;
pub mod pipeline;

pub use common::{
    RefocusError,
    Result,
};

pub use self::core::{
    BoundaryMode,
    EnergyThreshold,
    EnergyWeights,
    HopfieldSolver,
    Kernel,
    LambdaField,
    PassStats,
    Raster,
    SolverState,
};

pub use config::{
    OutputFormat,
    RefocusConfig,
    RefocusConfigBuilder,
    TiffCompression,
};

pub use io::{
    AutoReader,
    ChannelImage,
    PnmReader,
    PnmWriter,
    RasterReader,
    RasterWriter,
    StandardTiffWriter,
    StandardWriter,
    TiffReader,
};

pub use pipeline::{
    PipelineTimings,
    RefocusOutcome,
    RefocusPipeline,
    Refocuser,
};
