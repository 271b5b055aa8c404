use std::io::Cursor;

use image::{ImageFormat, ImageReader};
use tracing::debug;

use crate::refocus::common::error::{RefocusError, Result};
use crate::refocus::io::pnm_reader::PnmReader;
use crate::refocus::io::reader::RasterReader;
use crate::refocus::io::tiff_reader::TiffReader;
use crate::refocus::io::types::ChannelImage;

/// Picks the PNM or TIFF decoder from the leading magic bytes.
pub struct AutoReader;

impl RasterReader for AutoReader {
    fn read_image(&self, data: &[u8]) -> Result<ChannelImage> {
        let format = ImageReader::new(Cursor::new(data))
            .with_guessed_format()?
            .format();
        debug!(?format, "Detected input format");
        match format {
            Some(ImageFormat::Pnm) => PnmReader.read_image(data),
            Some(ImageFormat::Tiff) => TiffReader.read_image(data),
            Some(other) => Err(RefocusError::UnsupportedFormat(format!(
                "{other:?} input; expected PNM or TIFF"
            ))),
            None => Err(RefocusError::UnsupportedFormat(
                "input is neither PNM nor TIFF".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatches_pnm() {
        let image = AutoReader.read_image(b"P2\n1 1\n255\n42\n").unwrap();
        assert_eq!(image.channels[0].get(0, 0), 42.0);
    }

    #[test]
    fn test_dispatches_tiff() {
        use crate::refocus::config::RefocusConfig;
        use crate::refocus::core::Raster;
        use crate::refocus::io::{RasterWriter, StandardTiffWriter};

        let image = ChannelImage::gray(Raster::filled(3, 2, 64.0).unwrap());
        let mut data = Vec::new();
        StandardTiffWriter
            .write_image(&image, &mut data, &RefocusConfig::default())
            .unwrap();
        let decoded = AutoReader.read_image(&data).unwrap();
        assert_eq!(decoded.channels[0].get(2, 1), 64.0);
    }

    #[test]
    fn test_known_but_unsupported_format() {
        let png_magic = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert!(matches!(
            AutoReader.read_image(png_magic),
            Err(RefocusError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_unknown_magic() {
        assert!(matches!(
            AutoReader.read_image(b"\x89PNG\r\n"),
            Err(RefocusError::UnsupportedFormat(_))
        ));
        assert!(AutoReader.read_image(b"").is_err());
    }
}
