//! Restoration core
//!
//! Rasters, blur masks and the Hopfield relaxation that inverts them.

pub mod boundary;
pub mod raster;
pub mod kernel;
mod blur;
pub mod weights;
pub mod threshold;
pub mod lambda;
pub mod hopfield;

pub use boundary::{Boundary, BoundaryMode, Mirror, Periodic};
pub use raster::Raster;
pub use kernel::Kernel;
pub use weights::EnergyWeights;
pub use threshold::EnergyThreshold;
pub use lambda::{LambdaField, VarianceRange};
pub use hopfield::{
    AdaptiveStencil, ConstantStencil, HopfieldSolver, PassStats, SmoothingStencil, SolverState,
};
