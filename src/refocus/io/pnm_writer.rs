use std::io::Write;
use tracing::debug;

use crate::refocus::common::error::{RefocusError, Result};
use crate::refocus::config::RefocusConfig;
use crate::refocus::io::types::ChannelImage;
use crate::refocus::io::writer::RasterWriter;

/// Writes PGM/PPM with maxval 255, binary or ASCII per `RefocusConfig::binary_pnm`.
pub struct PnmWriter;

/// ASCII rows are broken once they grow past these widths.
const LINE_BREAK_PGM: usize = 64;
const LINE_BREAK_PPM: usize = 56;

impl RasterWriter for PnmWriter {
    fn write_image(&self, image: &ChannelImage, output: &mut dyn Write, config: &RefocusConfig) -> Result<()> {
        let channels = image.channel_count();
        let magic = match (channels, config.binary_pnm) {
            (1, false) => 2,
            (3, false) => 3,
            (1, true) => 5,
            (3, true) => 6,
            _ => {
                return Err(RefocusError::EncodeError(format!(
                    "cannot write {channels} channels as PNM"
                )))
            }
        };
        debug!("Encoding PNM image: P{} {}x{}", magic, image.width, image.height);

        let samples = image.to_interleaved_u8();
        let mut buffer = Vec::with_capacity(samples.len() * if config.binary_pnm { 1 } else { 4 } + 64);
        write!(buffer, "P{}\n# Deblur output\n{} {}\n255", magic, image.width, image.height)?;

        if config.binary_pnm {
            buffer.push(b'\n');
            buffer.extend_from_slice(&samples);
        } else {
            let border = if channels == 1 { LINE_BREAK_PGM } else { LINE_BREAK_PPM };
            let mut line_len = border + 1;
            for pixel in samples.chunks_exact(channels) {
                let text = pixel
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                if line_len > border {
                    buffer.push(b'\n');
                    line_len = 0;
                } else {
                    buffer.push(b' ');
                    line_len += 1;
                }
                buffer.extend_from_slice(text.as_bytes());
                line_len += text.len();
            }
            buffer.push(b'\n');
        }

        output.write_all(&buffer)?;
        debug!("PNM encoding complete");
        Ok(())
    }
}
