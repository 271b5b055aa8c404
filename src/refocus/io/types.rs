//! Decoded image data types

use crate::refocus::common::error::{RefocusError, Result};
use crate::refocus::core::Raster;

/// One gray or three RGB channels of equal size, intensities in `[0, 255]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelImage {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
    /// Gray, or red/green/blue in that order
    pub channels: Vec<Raster>,
    /// Factor that mapped the stored samples into `[0, 255]` on load
    pub scale: f64,
}

impl ChannelImage {
    pub fn new(channels: Vec<Raster>, scale: f64) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(RefocusError::UnsupportedFormat("image without channels".to_string()));
        };
        if channels.len() != 1 && channels.len() != 3 {
            return Err(RefocusError::UnsupportedFormat(format!(
                "{} channels, expected 1 or 3",
                channels.len()
            )));
        }
        let (width, height) = first.dimensions();
        for channel in &channels[1..] {
            channel.ensure_same_size(width, height)?;
        }
        Ok(Self {
            width,
            height,
            channels,
            scale,
        })
    }

    pub fn gray(raster: Raster) -> Self {
        let (width, height) = raster.dimensions();
        Self {
            width,
            height,
            channels: vec![raster],
            scale: 1.0,
        }
    }

    /// Splits interleaved samples into channel rasters, multiplying by `scale`.
    ///
    /// `stride` samples make one pixel; the first `channels` of them are kept.
    pub fn from_interleaved<T: Copy + Into<f64>>(
        width: usize,
        height: usize,
        samples: &[T],
        stride: usize,
        channels: usize,
        scale: f64,
    ) -> Result<Self> {
        let pixels = width
            .checked_mul(height)
            .ok_or(RefocusError::InvalidDimensions(width, height))?;
        let needed = pixels
            .checked_mul(stride)
            .ok_or(RefocusError::InvalidDimensions(width, height))?;
        if samples.len() < needed {
            return Err(RefocusError::DecodeError(format!(
                "expected {} samples, got {}",
                needed,
                samples.len()
            )));
        }

        let mut rasters = Vec::with_capacity(channels);
        for c in 0..channels {
            let mut raster = Raster::new(width, height)?;
            for (dst, pixel) in raster.data_mut().iter_mut().zip(samples.chunks_exact(stride)) {
                *dst = pixel[c].into() * scale;
            }
            rasters.push(raster);
        }
        Self::new(rasters, scale)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_color(&self) -> bool {
        self.channels.len() == 3
    }

    /// Interleaved 8-bit samples, rounded to nearest and clamped.
    pub fn to_interleaved_u8(&self) -> Vec<u8> {
        let count = self.channels.len();
        let mut out = vec![0u8; self.width * self.height * count];
        for (c, channel) in self.channels.iter().enumerate() {
            for (i, &value) in channel.data().iter().enumerate() {
                out[i * count + c] = quantize(value);
            }
        }
        out
    }
}

/// Nearest 8-bit level of an intensity.
#[inline]
pub fn quantize(value: f64) -> u8 {
    (value + 0.5).floor().clamp(0.0, 255.0) as u8
}
