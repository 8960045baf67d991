//! The kim2 format, for images where every pixel has roughly the same color
//! but a different opacity: one base color for the whole image, followed by a
//! quantized alpha value per pixel.

use super::color::{PackedColor, PixelGrid};
use super::error::{CompressionError, DecompressionError};
use super::format::{read_header_words, AlphaBits, Kim2Header, KIM2_MAX_SIZE};
use super::traits::SampleColor;
use crate::bitpack::{BitPacker, PackedWords};
use bitstream_io::{BitRead, BitReader, LittleEndian};
use std::convert::TryFrom;
use std::io::{self, Write};

const BITS_PER_WORD: usize = 32;

fn validate(width: u32, height: u32, bits_per_pixel: u32) -> Result<AlphaBits, CompressionError> {
    CompressionError::check_below("the width", width, KIM2_MAX_SIZE + 1)?;
    CompressionError::check_below("the height", height, KIM2_MAX_SIZE + 1)?;
    AlphaBits::try_from(bits_per_pixel)
}

fn int_size(width: u32, height: u32, alpha_bits: AlphaBits) -> usize {
    let data_bits = width as usize * height as usize * alpha_bits.bits() as usize;
    Kim2Header::WORDS + data_bits.div_ceil(BITS_PER_WORD)
}

/// Returns the number of words needed to store a kim2 image.
///
/// Fails when `bits_per_pixel` is not 1, 2, 4 or 8, or when the width or height
/// is larger than 32767.
pub fn predict_int_size(
    width: u32,
    height: u32,
    bits_per_pixel: u32,
) -> Result<usize, CompressionError> {
    let alpha_bits = validate(width, height, bits_per_pixel)?;
    Ok(int_size(width, height, alpha_bits))
}

/// Returns the number of bytes needed to store a kim2 image.
pub fn predict_byte_size(
    width: u32,
    height: u32,
    bits_per_pixel: u32,
) -> Result<usize, CompressionError> {
    Ok(4 * predict_int_size(width, height, bits_per_pixel)?)
}

/// Averages the colors of all pixels, weighted by the square of their alpha.
///
/// Nearly transparent pixels barely influence the result, and a fully
/// transparent image yields black.
pub fn base_color(pixels: &[PackedColor]) -> PackedColor {
    let mut total_weight: u64 = 0;
    let (mut red, mut green, mut blue): (u64, u64, u64) = (0, 0, 0);
    for color in pixels {
        let alpha = u64::from(color.alpha());
        let weight = alpha * alpha;
        total_weight += weight;
        red += weight * u64::from(color.red());
        green += weight * u64::from(color.green());
        blue += weight * u64::from(color.blue());
    }

    if total_weight == 0 {
        return PackedColor(0);
    }
    // A rounded weighted average of 8-bit values never exceeds 255.
    let average = |total: u64| ((total + total_weight / 2) / total_weight) as u8;
    PackedColor::rgba(average(red), average(green), average(blue), 0)
}

/// Maps `alpha` to the nearest of the levels that `alpha_bits` can express.
pub fn quantize_alpha(alpha: u8, alpha_bits: AlphaBits) -> u32 {
    let step_size = alpha_bits.step_size();
    (u32::from(alpha) + step_size / 2) / step_size
}

/// Compresses an image to the kim2 format.
pub struct Kim2Compressor<'a> {
    pixels: &'a [PackedColor],
    header: Kim2Header,
}

impl<'a> Kim2Compressor<'a> {
    /// Prepares the compression of the first `width * height` colors of
    /// `pixels`, which are stored in row-major order.
    ///
    /// Unlike kim1, kim2 supports images without pixels.
    pub fn new(
        pixels: &'a [PackedColor],
        width: u32,
        height: u32,
        bits_per_pixel: u32,
    ) -> Result<Kim2Compressor<'a>, CompressionError> {
        let alpha_bits = validate(width, height, bits_per_pixel)?;
        let num_pixels = width as usize * height as usize;
        if pixels.len() < num_pixels {
            return Err(CompressionError::BufferUnderflow {
                required: num_pixels,
                actual: pixels.len(),
            });
        }
        let pixels = &pixels[..num_pixels];

        let header = Kim2Header {
            width,
            height,
            alpha_bits,
            base_color: base_color(pixels),
        };
        log::debug!(
            "kim2 {}x{} at {} bits per pixel, base color {:?}",
            width,
            height,
            bits_per_pixel,
            header.base_color
        );
        Ok(Kim2Compressor { pixels, header })
    }

    pub fn from_grid(
        grid: &'a PixelGrid,
        bits_per_pixel: u32,
    ) -> Result<Kim2Compressor<'a>, CompressionError> {
        Kim2Compressor::new(grid.pixels(), grid.width(), grid.height(), bits_per_pixel)
    }

    pub fn header(&self) -> &Kim2Header {
        &self.header
    }

    /// The size of the compressed image, in words (4 bytes).
    pub fn int_size(&self) -> usize {
        let header = &self.header;
        int_size(header.width, header.height, header.alpha_bits)
    }

    /// The size of the compressed image, in bytes.
    pub fn byte_size(&self) -> usize {
        4 * self.int_size()
    }

    /// Writes the compressed image to `to`.
    pub fn compress<W>(&self, to: W) -> io::Result<()>
    where
        W: Write,
    {
        let mut packer = BitPacker::new(to);
        for word in self.header.pack() {
            packer.write(word, 32)?;
        }

        let alpha_bits = self.header.alpha_bits;
        for color in self.pixels {
            packer.write(quantize_alpha(color.alpha(), alpha_bits), alpha_bits.bits())?;
        }
        packer.flush()?;

        debug_assert_eq!(packer.words_written(), self.int_size());
        Ok(())
    }

    /// Writes the compressed image to the start of `destination`, and returns
    /// the number of bytes written.
    pub fn compress_into(&self, destination: &mut [u8]) -> Result<usize, CompressionError> {
        let required = self.byte_size();
        if destination.len() < required {
            return Err(CompressionError::BufferUnderflow {
                required,
                actual: destination.len(),
            });
        }
        self.compress(&mut destination[..required])?;
        Ok(required)
    }

    pub fn compress_to_vec(&self) -> Result<Vec<u8>, CompressionError> {
        let mut compressed = vec![0; self.byte_size()];
        self.compress_into(&mut compressed)?;
        Ok(compressed)
    }
}

/// Reads pixels from a compressed kim2 image.
pub struct Kim2Decompressor<'a> {
    data: &'a [u8],
    header: Kim2Header,
}

impl<'a> Kim2Decompressor<'a> {
    pub fn new(data: &'a [u8]) -> Result<Kim2Decompressor<'a>, DecompressionError> {
        let header = Kim2Header::unpack(read_header_words::<2>(data)?);
        let required = 4 * int_size(header.width, header.height, header.alpha_bits);
        if data.len() < required {
            return Err(DecompressionError::BufferUnderflow {
                required,
                actual: data.len(),
            });
        }
        Ok(Kim2Decompressor { data, header })
    }

    pub fn header(&self) -> &Kim2Header {
        &self.header
    }

    /// Decodes every pixel in row-major order into `output`, and returns the
    /// number of pixels written.
    pub fn decompress_into(&self, output: &mut [PackedColor]) -> Result<usize, DecompressionError> {
        let num_pixels = self.header.width as usize * self.header.height as usize;
        if output.len() < num_pixels {
            return Err(DecompressionError::BufferUnderflow {
                required: num_pixels,
                actual: output.len(),
            });
        }

        let alpha_bits = self.header.alpha_bits;
        let step_size = alpha_bits.step_size();
        let data = &self.data[4 * Kim2Header::WORDS..];
        let base_color = self.header.base_color;
        let mut bitreader: BitReader<&[u8], LittleEndian> = BitReader::new(data);
        for pixel in &mut output[..num_pixels] {
            let stored: u32 = bitreader.read(alpha_bits.bits())?;
            *pixel = base_color.with_alpha((stored * step_size) as u8);
        }
        Ok(num_pixels)
    }
}

impl SampleColor for Kim2Decompressor<'_> {
    fn width(&self) -> u32 {
        self.header.width
    }

    fn height(&self) -> u32 {
        self.header.height
    }

    fn color_at(&self, x: u32, y: u32) -> PackedColor {
        assert!(
            x < self.header.width && y < self.header.height,
            "({}, {}) is out of bounds",
            x, y
        );
        let alpha_bits = self.header.alpha_bits;
        let pixel = x as usize + y as usize * self.header.width as usize;
        let bit_index = BITS_PER_WORD * Kim2Header::WORDS + pixel * alpha_bits.bits() as usize;
        let stored = PackedWords::new(self.data).read(bit_index, alpha_bits.bits());
        let alpha = stored * alpha_bits.step_size();
        self.header.base_color.with_alpha(alpha as u8)
    }

    fn decompress(&self) -> Result<Vec<PackedColor>, DecompressionError> {
        let num_pixels = self.header.width as usize * self.header.height as usize;
        let mut pixels = vec![PackedColor::default(); num_pixels];
        self.decompress_into(&mut pixels)?;
        Ok(pixels)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn compress(pixels: &[PackedColor], width: u32, height: u32, bits_per_pixel: u32) -> Vec<u8> {
        let compressor = Kim2Compressor::new(pixels, width, height, bits_per_pixel).unwrap();
        let compressed = compressor.compress_to_vec().unwrap();
        assert_eq!(
            compressed.len(),
            predict_byte_size(width, height, bits_per_pixel).unwrap()
        );
        compressed
    }

    // Decodes with both the sequential and the random-access path, and checks
    // that they agree.
    fn decompress(compressed: &[u8]) -> Vec<PackedColor> {
        let decompressor = Kim2Decompressor::new(compressed).unwrap();
        let pixels = decompressor.decompress().unwrap();
        let width = decompressor.width();
        for (i, &color) in pixels.iter().enumerate() {
            let (x, y) = (i as u32 % width, i as u32 / width);
            assert_eq!(decompressor.color_at(x, y), color);
        }
        pixels
    }

    #[test]
    fn test_predict_size() {
        assert_eq!(predict_byte_size(0, 0, 8).unwrap(), 8);
        assert_eq!(predict_int_size(0, 0, 8).unwrap(), 2);
        assert_eq!(predict_byte_size(1, 1, 8).unwrap(), 12);
        assert_eq!(predict_int_size(1, 1, 8).unwrap(), 3);
        assert_eq!(predict_int_size(1, 1, 1).unwrap(), 3);
        assert_eq!(predict_int_size(100, 10, 4).unwrap(), 127);
        assert_eq!(predict_int_size(32, 1, 1).unwrap(), 3);
        assert_eq!(predict_int_size(33, 1, 1).unwrap(), 4);
    }

    #[test]
    fn test_invalid_size() {
        assert!(matches!(
            predict_byte_size(KIM2_MAX_SIZE + 1, 10, 2),
            Err(CompressionError::SizeLimitExceeded { .. })
        ));
        assert!(matches!(
            predict_byte_size(100, KIM2_MAX_SIZE + 1, 4),
            Err(CompressionError::SizeLimitExceeded { .. })
        ));
        assert!(matches!(
            predict_int_size(12, 34, 5),
            Err(CompressionError::InvalidParameter(_))
        ));

        let dummy = [PackedColor::default(); 1];
        assert!(matches!(
            Kim2Compressor::new(&dummy, KIM2_MAX_SIZE + 1, 10, 2),
            Err(CompressionError::SizeLimitExceeded { .. })
        ));
        assert!(matches!(
            Kim2Compressor::new(&dummy, 1000, KIM2_MAX_SIZE + 1, 2),
            Err(CompressionError::SizeLimitExceeded { .. })
        ));
        assert!(matches!(
            Kim2Compressor::new(&dummy, 1, 1, 5),
            Err(CompressionError::InvalidParameter(_))
        ));
        assert!(matches!(
            Kim2Compressor::new(&dummy, 2, 1, 4),
            Err(CompressionError::BufferUnderflow {
                required: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_exact_8_bit_reconstruction() {
        let input: Vec<PackedColor> = (0..=255)
            .map(|alpha| PackedColor::rgba(12, 34, 56, alpha))
            .collect();
        let compressed = compress(&input, 4, 64, 8);
        assert_eq!(decompress(&compressed), input);
    }

    #[test]
    fn test_binary_purple_mix() {
        let input = [
            PackedColor::rgba(0, 255, 0, 0),
            PackedColor::rgb(200, 0, 100),
            PackedColor::rgb(100, 0, 200),
            PackedColor::rgba(0, 255, 0, 0),
        ];
        let compressed = compress(&input, 2, 2, 1);
        let decompressor = Kim2Decompressor::new(&compressed).unwrap();
        assert_eq!(
            decompressor.header().base_color,
            PackedColor::rgba(150, 0, 150, 0)
        );

        let recovered = decompress(&compressed);
        assert_eq!(recovered[0].alpha(), 0);
        assert_eq!(recovered[1], PackedColor::rgb(150, 0, 150));
        assert_eq!(recovered[2], PackedColor::rgb(150, 0, 150));
        assert_eq!(recovered[3].alpha(), 0);
    }

    #[test]
    fn test_2_bit_gradient() {
        let alphas = [0, 42, 43, 127, 128, 212, 213, 255];
        let expected = [0, 0, 85, 85, 170, 170, 255, 255];
        let input: Vec<PackedColor> = alphas
            .iter()
            .map(|&alpha| PackedColor::rgba(255, 0, 0, alpha))
            .collect();

        let recovered = decompress(&compress(&input, 4, 2, 2));
        for (color, &alpha) in recovered.iter().zip(expected.iter()) {
            assert_eq!(*color, PackedColor::rgba(255, 0, 0, alpha));
        }
    }

    #[test]
    fn test_quantize_alpha() {
        assert_eq!(quantize_alpha(127, AlphaBits::One), 0);
        assert_eq!(quantize_alpha(128, AlphaBits::One), 1);
        assert_eq!(quantize_alpha(255, AlphaBits::Four), 15);
        assert_eq!(quantize_alpha(8, AlphaBits::Four), 0);
        assert_eq!(quantize_alpha(9, AlphaBits::Four), 1);
        for alpha in 0..=255 {
            assert_eq!(quantize_alpha(alpha, AlphaBits::Eight), alpha as u32);
        }
    }

    #[test]
    fn test_base_color_rounding() {
        let pixels = [PackedColor::rgb(1, 0, 0), PackedColor::rgb(2, 0, 255)];
        assert_eq!(base_color(&pixels), PackedColor::rgba(2, 0, 128, 0));

        // The alpha weighs quadratically.
        let pixels = [
            PackedColor::rgba(0, 0, 0, 255),
            PackedColor::rgba(255, 255, 255, 51),
        ];
        assert_eq!(base_color(&pixels), PackedColor::rgba(10, 10, 10, 0));
    }

    #[test]
    fn test_width_of_0() {
        let compressed = compress(&[], 0, 10, 4);
        assert_eq!(compressed.len(), 8);

        let decompressor = Kim2Decompressor::new(&compressed).unwrap();
        assert_eq!(decompressor.width(), 0);
        assert_eq!(decompressor.height(), 10);

        let mut output = [PackedColor(1234)];
        assert_eq!(decompressor.decompress_into(&mut output).unwrap(), 0);
        assert_eq!(output[0], PackedColor(1234));
    }

    #[test]
    fn test_transparent_image() {
        let compressed = compress(&[PackedColor::default()], 1, 1, 4);
        assert_eq!(compressed.len(), 12);
        assert_eq!(decompress(&compressed), vec![PackedColor(0)]);
    }

    #[test]
    fn test_large_width() {
        let input: Vec<PackedColor> = (0..10 * KIM2_MAX_SIZE)
            .map(|i| PackedColor::rgba(100, 200, 250, (i % 256) as u8))
            .collect();
        let compressed = compress(&input, KIM2_MAX_SIZE, 10, 8);
        let decompressor = Kim2Decompressor::new(&compressed).unwrap();
        assert_eq!(decompressor.width(), KIM2_MAX_SIZE);
        assert_eq!(decompressor.decompress().unwrap(), input);
        assert_eq!(
            decompressor.color_at(KIM2_MAX_SIZE - 1, 9),
            input[input.len() - 1]
        );
    }

    #[test]
    fn test_header_accessors() {
        let input = vec![PackedColor::rgba(1, 2, 3, 200); 240 * 3];
        for bits_per_pixel in [1, 2, 4, 8] {
            let compressed = compress(&input, 240, 3, bits_per_pixel);
            let header = PackedWords::new(&compressed).word(0);
            assert_eq!(Kim2Header::width(header), 240);
            assert_eq!(Kim2Header::height(header), 3);
            assert_eq!(Kim2Header::alpha_bits(header).bits(), bits_per_pixel);
        }
    }

    #[test]
    fn test_buffer_underflow() {
        let input = [PackedColor::rgb(1, 2, 3); 4];
        let compressor = Kim2Compressor::new(&input, 2, 2, 8).unwrap();
        let mut destination = [0; 11];
        assert!(matches!(
            compressor.compress_into(&mut destination),
            Err(CompressionError::BufferUnderflow {
                required: 12,
                actual: 11
            })
        ));

        let compressed = compressor.compress_to_vec().unwrap();
        assert!(matches!(
            Kim2Decompressor::new(&compressed[..8]),
            Err(DecompressionError::BufferUnderflow {
                required: 12,
                actual: 8
            })
        ));

        let decompressor = Kim2Decompressor::new(&compressed).unwrap();
        let mut output = [PackedColor::default(); 3];
        assert!(matches!(
            decompressor.decompress_into(&mut output),
            Err(DecompressionError::BufferUnderflow { .. })
        ));
    }
}
