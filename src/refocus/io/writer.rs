use std::io::Write;
use crate::refocus::common::error::Result;
use crate::refocus::config::RefocusConfig;
use crate::refocus::io::types::ChannelImage;

pub trait RasterWriter {
    fn write_image(&self, image: &ChannelImage, output: &mut dyn Write, config: &RefocusConfig) -> Result<()>;
}
