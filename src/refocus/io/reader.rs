use crate::refocus::common::error::Result;
use crate::refocus::io::types::ChannelImage;

pub trait RasterReader {
    fn read_image(&self, data: &[u8]) -> Result<ChannelImage>;
}
