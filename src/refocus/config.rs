//! Run configuration module
//!
//! Parameters of a refocus run, their valid ranges and the quantities derived from them.

pub mod types;

pub use types::{OutputFormat, RefocusConfig, RefocusConfigBuilder, TiffCompression};
