//! Netpbm gray and color map reader.
//!
//! Header parsing and raster decoding go through the `image` crate's PNM
//! codec. Graymaps and pixmaps (`P2`, `P3`, `P5`, `P6`) with any maximum value
//! up to 65535 are accepted; samples land in `[0, 255]`.

use std::io::Cursor;

use image::codecs::pnm::{PnmDecoder, PnmHeader, PnmSubtype, SampleEncoding};
use image::{DynamicImage, ImageError};
use tracing::debug;

use crate::refocus::common::error::{RefocusError, Result};
use crate::refocus::io::reader::RasterReader;
use crate::refocus::io::types::ChannelImage;

pub struct PnmReader;

fn decode_error(err: ImageError) -> RefocusError {
    match err {
        ImageError::Unsupported(e) => RefocusError::UnsupportedFormat(e.to_string()),
        ImageError::IoError(e) => RefocusError::DecodeError(e.to_string()),
        other => RefocusError::DecodeError(other.to_string()),
    }
}

fn channels_of(subtype: PnmSubtype) -> Result<(usize, SampleEncoding)> {
    match subtype {
        PnmSubtype::Graymap(encoding) => Ok((1, encoding)),
        PnmSubtype::Pixmap(encoding) => Ok((3, encoding)),
        PnmSubtype::Bitmap(_) => Err(RefocusError::UnsupportedFormat("PBM bitmap".to_string())),
        PnmSubtype::ArbitraryMap => Err(RefocusError::UnsupportedFormat("PAM arbitrary map".to_string())),
    }
}

/// The codec stretches samples to the full 8 or 16 bit range without
/// rejecting values above maxval, so the raw raster is checked first.
fn check_samples(raster: &[u8], encoding: SampleEncoding, count: usize, maxval: u32) -> Result<()> {
    let out_of_range = |value: u32| {
        RefocusError::DecodeError(format!("sample {value} exceeds maxval {maxval}"))
    };
    match encoding {
        SampleEncoding::Binary => {
            let width = if maxval > 255 { 2 } else { 1 };
            let bytes = count
                .checked_mul(width)
                .ok_or_else(|| RefocusError::DecodeError("raster too large".to_string()))?;
            let raster = raster.get(..bytes).ok_or_else(|| {
                RefocusError::DecodeError(format!("truncated raster: expected {} bytes, got {}", bytes, raster.len()))
            })?;
            let too_big = if width == 2 {
                raster
                    .chunks_exact(2)
                    .map(|pair| u32::from(u16::from_be_bytes([pair[0], pair[1]])))
                    .find(|&v| v > maxval)
            } else {
                raster.iter().map(|&b| u32::from(b)).find(|&v| v > maxval)
            };
            match too_big {
                Some(value) => Err(out_of_range(value)),
                None => Ok(()),
            }
        }
        SampleEncoding::Ascii => {
            let text = std::str::from_utf8(raster)
                .map_err(|_| RefocusError::DecodeError("non-ASCII raster".to_string()))?;
            let mut seen = 0;
            for token in text.split_ascii_whitespace().take(count) {
                let value: u32 = token
                    .parse()
                    .map_err(|_| RefocusError::DecodeError(format!("bad sample '{token}'")))?;
                if value > maxval {
                    return Err(out_of_range(value));
                }
                seen += 1;
            }
            if seen < count {
                return Err(RefocusError::DecodeError(format!(
                    "truncated raster: expected {count} samples, got {seen}"
                )));
            }
            Ok(())
        }
    }
}

fn read_header(data: &[u8]) -> Result<(PnmHeader, usize)> {
    let decoder = PnmDecoder::new(Cursor::new(data)).map_err(decode_error)?;
    let (cursor, header) = decoder.into_inner();
    let offset = usize::try_from(cursor.position())
        .map_err(|_| RefocusError::DecodeError("header offset out of range".to_string()))?;
    Ok((header, offset))
}

impl RasterReader for PnmReader {
    fn read_image(&self, data: &[u8]) -> Result<ChannelImage> {
        let (header, offset) = read_header(data)?;
        let (channels, encoding) = channels_of(header.subtype())?;
        let (width, height) = (header.width() as usize, header.height() as usize);
        let maxval = header.maximal_sample();
        if width == 0 || height == 0 {
            return Err(RefocusError::InvalidDimensions(width, height));
        }
        let count = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(channels))
            .ok_or(RefocusError::InvalidDimensions(width, height))?;

        debug!(width, height, maxval, channels, ?encoding, "Decoding PNM image");
        check_samples(&data[offset..], encoding, count, maxval)?;

        let decoder = PnmDecoder::new(Cursor::new(data)).map_err(decode_error)?;
        let decoded = DynamicImage::from_decoder(decoder).map_err(decode_error)?;

        let mut image = match decoded {
            DynamicImage::ImageLuma8(buf) => {
                ChannelImage::from_interleaved(width, height, buf.as_raw().as_slice(), 1, 1, 1.0)
            }
            DynamicImage::ImageRgb8(buf) => {
                ChannelImage::from_interleaved(width, height, buf.as_raw().as_slice(), 3, 3, 1.0)
            }
            DynamicImage::ImageLuma16(buf) => {
                ChannelImage::from_interleaved(width, height, buf.as_raw().as_slice(), 1, 1, 255.0 / 65535.0)
            }
            DynamicImage::ImageRgb16(buf) => {
                ChannelImage::from_interleaved(width, height, buf.as_raw().as_slice(), 3, 3, 255.0 / 65535.0)
            }
            other => Err(RefocusError::UnsupportedFormat(format!(
                "PNM color type {:?}",
                other.color()
            ))),
        }?;
        image.scale = 255.0 / maxval as f64;
        Ok(image)
    }
}
