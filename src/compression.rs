pub use color::{ChannelCount, PackedColor, PixelGrid};
pub use color_table::ColorTable;
pub use error::{CompressionError, DecompressionError};
pub use format::{
    AlphaBits, Kim1BlockHeader, Kim1FlatHeader, Kim2Header, KIM1_BLOCK_MAX_COLORS,
    KIM1_BLOCK_MAX_DIMENSION, KIM1_FLAT_LIMIT, KIM1_MAX_COLORS_PER_BLOCK, KIM2_MAX_SIZE,
};
use image::RgbaImage;
pub use kim1::{Kim1Compressor, Kim1Decompressor};
pub use kim1_blocks::{BlockSize, Kim1BlockCompressor, Kim1BlockDecompressor};
pub use kim2::{Kim2Compressor, Kim2Decompressor};
pub use traits::SampleColor;

mod color;
mod color_table;
mod error;
mod format;
pub mod kim1;
pub mod kim1_blocks;
pub mod kim2;
mod traits;

/// Decodes every pixel of a compressed image into an `RgbaImage`.
pub fn decompress_image<S>(image: &S) -> Result<RgbaImage, DecompressionError>
where
    S: SampleColor,
{
    let (width, height) = (image.width(), image.height());
    let pixels = image.decompress()?;

    let mut decompressed = RgbaImage::new(width, height);
    for (pixel, color) in decompressed.pixels_mut().zip(pixels) {
        *pixel = color.into();
    }
    Ok(decompressed)
}
