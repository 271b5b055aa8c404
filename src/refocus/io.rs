//! Raster I/O module
//!
//! Decoding of PNM and TIFF inputs into channel rasters and encoding of the
//! restored result.

mod reader;
mod writer;
pub mod types;
mod pnm_reader;
mod pnm_writer;
mod tiff_reader;
mod standard_tiff_writer;
mod auto_reader;
mod standard_writer;

pub use reader::RasterReader;
pub use writer::RasterWriter;
pub use types::{quantize, ChannelImage};
pub use pnm_reader::PnmReader;
pub use pnm_writer::PnmWriter;
pub use tiff_reader::TiffReader;
pub use standard_tiff_writer::StandardTiffWriter;
pub use auto_reader::AutoReader;
pub use standard_writer::StandardWriter;
