use std::io::Write;

use crate::refocus::common::error::Result;
use crate::refocus::config::{OutputFormat, RefocusConfig};
use crate::refocus::io::pnm_writer::PnmWriter;
use crate::refocus::io::standard_tiff_writer::StandardTiffWriter;
use crate::refocus::io::types::ChannelImage;
use crate::refocus::io::writer::RasterWriter;

/// Encodes in whichever container `RefocusConfig::output_format` names.
pub struct StandardWriter;

impl RasterWriter for StandardWriter {
    fn write_image(&self, image: &ChannelImage, output: &mut dyn Write, config: &RefocusConfig) -> Result<()> {
        match config.output_format {
            OutputFormat::Pnm => PnmWriter.write_image(image, output, config),
            OutputFormat::Tiff => StandardTiffWriter.write_image(image, output, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refocus::core::Raster;

    #[test]
    fn test_format_selection() {
        let image = ChannelImage::gray(Raster::filled(2, 2, 9.0).unwrap());
        let mut pnm = Vec::new();
        StandardWriter.write_image(&image, &mut pnm, &RefocusConfig::default()).unwrap();
        assert!(pnm.starts_with(b"P5"));

        let config = RefocusConfig::builder().output_format(OutputFormat::Tiff).build();
        let mut tif = Vec::new();
        StandardWriter.write_image(&image, &mut tif, &config).unwrap();
        assert!(tif.starts_with(b"II*\0") || tif.starts_with(b"MM\0*"));
    }
}
