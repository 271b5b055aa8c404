//! Run orchestration module
//!
//! Drives decoding, the per-channel relaxation and encoding, with stage timings
//! and optional intermediate saves.

mod refocuser;
mod refocus_pipeline;
mod timing;


pub use refocuser::Refocuser;
pub use refocus_pipeline::{intermediate_path, RefocusOutcome, RefocusPipeline};
pub use timing::{PipelineTimings, StepTiming, Timer};
