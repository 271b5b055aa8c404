use std::io::Cursor;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;
use tracing::debug;

use crate::refocus::common::error::{RefocusError, Result};
use crate::refocus::io::reader::RasterReader;
use crate::refocus::io::types::ChannelImage;

/// Reads the first page of 8 or 16 bit gray, RGB and RGBA TIFF files.
///
/// Alpha is dropped; 16 bit samples are scaled into `[0, 255]`.
pub struct TiffReader;

impl RasterReader for TiffReader {
    fn read_image(&self, data: &[u8]) -> Result<ChannelImage> {
        debug!("Decoding TIFF image, {} bytes", data.len());

        let mut decoder =
            Decoder::new(Cursor::new(data)).map_err(|e| RefocusError::DecodeError(e.to_string()))?;
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| RefocusError::DecodeError(e.to_string()))?;
        let color = decoder
            .colortype()
            .map_err(|e| RefocusError::DecodeError(e.to_string()))?;
        let (width, height) = (width as usize, height as usize);

        let (stride, channels) = match color {
            ColorType::Gray(8 | 16) => (1, 1),
            ColorType::GrayA(8 | 16) => (2, 1),
            ColorType::RGB(8 | 16) => (3, 3),
            ColorType::RGBA(8 | 16) => (4, 3),
            other => {
                return Err(RefocusError::UnsupportedFormat(format!("TIFF color type {other:?}")));
            }
        };

        let image = match decoder
            .read_image()
            .map_err(|e| RefocusError::DecodeError(e.to_string()))?
        {
            DecodingResult::U8(samples) => {
                ChannelImage::from_interleaved(width, height, &samples, stride, channels, 1.0)?
            }
            DecodingResult::U16(samples) => ChannelImage::from_interleaved(
                width,
                height,
                &samples,
                stride,
                channels,
                255.0 / u16::MAX as f64,
            )?,
            _ => {
                return Err(RefocusError::UnsupportedFormat(
                    "TIFF sample type other than u8/u16".to_string(),
                ));
            }
        };

        debug!(width, height, channels, "TIFF decoding complete");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refocus::config::{OutputFormat, RefocusConfig, TiffCompression};
    use crate::refocus::core::Raster;
    use crate::refocus::io::standard_tiff_writer::StandardTiffWriter;
    use crate::refocus::io::writer::RasterWriter;

    #[test]
    fn test_reads_sixteen_bit_gray() {
        let mut buffer = Vec::new();
        {
            let mut encoder = tiff::encoder::TiffEncoder::new(Cursor::new(&mut buffer)).unwrap();
            encoder
                .write_image::<tiff::encoder::colortype::Gray16>(2, 1, &[0u16, 65535])
                .unwrap();
        }
        let image = TiffReader.read_image(&buffer).unwrap();
        assert_eq!(image.channel_count(), 1);
        assert_eq!(image.channels[0].get(0, 0), 0.0);
        assert!((image.channels[0].get(1, 0) - 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_rgba_drops_alpha() {
        let mut buffer = Vec::new();
        {
            let mut encoder = tiff::encoder::TiffEncoder::new(Cursor::new(&mut buffer)).unwrap();
            encoder
                .write_image::<tiff::encoder::colortype::RGBA8>(1, 1, &[10u8, 20, 30, 40])
                .unwrap();
        }
        let image = TiffReader.read_image(&buffer).unwrap();
        assert!(image.is_color());
        assert_eq!(image.channels[2].get(0, 0), 30.0);
    }

    #[test]
    fn test_round_trip_through_writer() {
        let image = ChannelImage::gray(Raster::from_vec(3, 2, vec![0.0, 50.0, 100.0, 150.0, 200.0, 250.0]).unwrap());
        for compression in [TiffCompression::None, TiffCompression::Lzw, TiffCompression::DeflateBalanced] {
            let config = RefocusConfig::builder()
                .output_format(OutputFormat::Tiff)
                .compression(compression)
                .predictor(Some(2))
                .build();
            let mut out = Vec::new();
            StandardTiffWriter.write_image(&image, &mut out, &config).unwrap();
            let decoded = TiffReader.read_image(&out).unwrap();
            assert_eq!(decoded.channels, image.channels);
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            TiffReader.read_image(b"II*\0garbage"),
            Err(RefocusError::DecodeError(_))
        ));
    }
}
