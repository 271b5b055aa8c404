//! Common utilities module
//!
//! This module contains shared utilities used across the refocus crate.

pub mod error;
pub(crate) mod buffer;

pub use error::{RefocusError, Result};
