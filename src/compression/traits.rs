use super::color::PackedColor;
use super::error::DecompressionError;

/// This trait is implemented by every decoder of a compressed image.
///
/// Decoders look up single pixels directly in the compressed data, so sampling
/// a pixel never requires decoding the rest of the image.
pub trait SampleColor {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Returns the color of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` lies outside the image.
    fn color_at(&self, x: u32, y: u32) -> PackedColor;

    /// Decodes every pixel, in row-major order.
    fn decompress(&self) -> Result<Vec<PackedColor>, DecompressionError> {
        let mut pixels = Vec::with_capacity(self.width() as usize * self.height() as usize);
        for y in 0..self.height() {
            for x in 0..self.width() {
                pixels.push(self.color_at(x, y));
            }
        }
        Ok(pixels)
    }
}
