use std::io::{Cursor, Write};

use tiff::encoder::colortype::{Gray8, RGB8};
use tiff::encoder::compression::DeflateLevel;
use tiff::encoder::{Compression, TiffEncoder};
use tiff::tags::Predictor;
use tracing::debug;

use crate::refocus::common::error::{RefocusError, Result};
use crate::refocus::config::{RefocusConfig, TiffCompression};
use crate::refocus::io::types::ChannelImage;
use crate::refocus::io::writer::RasterWriter;

/// Writes the restored channels as 8-bit gray or RGB TIFF.
pub struct StandardTiffWriter;

fn compression_for(compression: TiffCompression) -> Compression {
    match compression {
        TiffCompression::None => Compression::Uncompressed,
        TiffCompression::Lzw => Compression::Lzw,
        TiffCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
        TiffCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
        TiffCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
    }
}

/// TIFF predictor tag value 2 is horizontal differencing; anything else disables it.
fn predictor_for(tag: u16) -> Predictor {
    match tag {
        2 => Predictor::Horizontal,
        _ => Predictor::None,
    }
}

fn tiff_extent(image: &ChannelImage) -> Result<(u32, u32)> {
    match (u32::try_from(image.width), u32::try_from(image.height)) {
        (Ok(width), Ok(height)) => Ok((width, height)),
        _ => Err(RefocusError::InvalidDimensions(image.width, image.height)),
    }
}

impl RasterWriter for StandardTiffWriter {
    fn write_image(&self, image: &ChannelImage, output: &mut dyn Write, config: &RefocusConfig) -> Result<()> {
        let (width, height) = tiff_extent(image)?;
        debug!(
            width,
            height,
            channels = image.channel_count(),
            compression = ?config.compression,
            "Encoding TIFF image"
        );

        let samples = image.to_interleaved_u8();
        let mut buffer = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
                .map_err(|e| RefocusError::EncodeError(e.to_string()))?
                .with_compression(compression_for(config.compression));
            if let Some(tag) = config.predictor {
                encoder = encoder.with_predictor(predictor_for(tag));
            }

            let written = match image.channel_count() {
                1 => encoder.write_image::<Gray8>(width, height, &samples),
                3 => encoder.write_image::<RGB8>(width, height, &samples),
                n => {
                    return Err(RefocusError::EncodeError(format!(
                        "cannot store {n} channels as TIFF"
                    )));
                }
            };
            written.map_err(|e| RefocusError::EncodeError(e.to_string()))?;
        }

        output.write_all(&buffer)?;
        debug!(bytes = buffer.len(), "TIFF encoding complete");
        Ok(())
    }
}
