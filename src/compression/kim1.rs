//! The flat kim1 format: one palette for the whole image, followed by one
//! palette index per pixel.

use super::color::{ChannelCount, PackedColor, PixelGrid};
use super::color_table::ColorTable;
use super::error::{CompressionError, DecompressionError};
use super::format::{read_header_words, Kim1FlatHeader, KIM1_FLAT_LIMIT};
use super::traits::SampleColor;
use crate::bitpack::{compute_bits_per_pixel, BitPacker, PackedWords};
use std::io::{self, Write};

const BITS_PER_WORD: usize = 32;

/// Returns the number of words of a flat kim1 image.
pub fn predict_int_size(
    width: u32,
    height: u32,
    num_colors: u32,
    num_channels: ChannelCount,
) -> usize {
    let palette_bits = 8 * num_colors as usize * num_channels.get() as usize;
    let index_bits = compute_bits_per_pixel(num_colors) as usize * width as usize * height as usize;
    Kim1FlatHeader::WORDS + (palette_bits + index_bits).div_ceil(BITS_PER_WORD)
}

/// Returns the number of bytes of a flat kim1 image.
pub fn predict_byte_size(
    width: u32,
    height: u32,
    num_colors: u32,
    num_channels: ChannelCount,
) -> usize {
    4 * predict_int_size(width, height, num_colors, num_channels)
}

/// Writes every palette entry, `num_channels` bytes each, in index order.
pub(super) fn write_palette<W>(
    packer: &mut BitPacker<W>,
    color_table: &ColorTable,
    num_channels: ChannelCount,
) -> io::Result<()>
where
    W: Write,
{
    for (color, _) in color_table.iter() {
        packer.write(color.0, 8 * num_channels.get())?;
    }
    Ok(())
}

/// Reads palette entry `index` of a palette that starts at bit `palette_offset`.
pub(super) fn read_palette_color(
    words: &PackedWords,
    palette_offset: usize,
    index: u32,
    num_channels: ChannelCount,
) -> PackedColor {
    let entry_bits = 8 * num_channels.get();
    let bit_index = palette_offset + index as usize * entry_bits as usize;
    let stored = words.read(bit_index, entry_bits);
    num_channels.widen(stored)
}

/// Scans an image once, and can then compress it to the flat kim1 format.
///
/// The size of the result is known right after construction.
pub struct Kim1Compressor {
    header: Kim1FlatHeader,
    color_table: ColorTable,
    indices: Vec<u32>,
}

impl Kim1Compressor {
    /// Builds the palette of `grid`.
    ///
    /// Fails when the width, height or number of distinct colors is 1024 or
    /// more.
    pub fn new(grid: &PixelGrid) -> Result<Kim1Compressor, CompressionError> {
        CompressionError::check_below("the width", grid.width(), KIM1_FLAT_LIMIT)?;
        CompressionError::check_below("the height", grid.height(), KIM1_FLAT_LIMIT)?;

        let mut color_table = ColorTable::with_limit(KIM1_FLAT_LIMIT as usize);
        let indices = grid
            .pixels()
            .iter()
            .map(|&color| color_table.observe(color))
            .collect::<Result<Vec<u32>, CompressionError>>()?;

        let header = Kim1FlatHeader {
            width: grid.width(),
            height: grid.height(),
            num_colors: color_table.len() as u32,
            num_channels: grid.channel_count(),
        };
        log::debug!(
            "kim1 {}x{}: {} colors, {} channels",
            header.width,
            header.height,
            header.num_colors,
            header.num_channels.get()
        );

        Ok(Kim1Compressor {
            header,
            color_table,
            indices,
        })
    }

    pub fn header(&self) -> &Kim1FlatHeader {
        &self.header
    }

    /// The size of the compressed image, in words (4 bytes).
    pub fn int_size(&self) -> usize {
        predict_int_size(
            self.header.width,
            self.header.height,
            self.header.num_colors,
            self.header.num_channels,
        )
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
        packer.write(self.header.pack(), 32)?;
        write_palette(&mut packer, &self.color_table, self.header.num_channels)?;

        let bits_per_pixel = compute_bits_per_pixel(self.header.num_colors);
        for &index in &self.indices {
            packer.write(index, bits_per_pixel)?;
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

/// Reads pixels straight from a compressed flat kim1 image.
pub struct Kim1Decompressor<'a> {
    words: PackedWords<'a>,
    header: Kim1FlatHeader,
    bits_per_pixel: u32,
    indices_offset: usize,
}

impl<'a> Kim1Decompressor<'a> {
    pub fn new(data: &'a [u8]) -> Result<Kim1Decompressor<'a>, DecompressionError> {
        let [word] = read_header_words::<1>(data)?;
        let header = Kim1FlatHeader::unpack(word);
        if header.width == 0 || header.height == 0 {
            return Err(DecompressionError::InvalidHeader("the image has no pixels"));
        }
        if header.num_colors == 0 {
            return Err(DecompressionError::InvalidHeader("the palette is empty"));
        }

        let required = predict_byte_size(
            header.width,
            header.height,
            header.num_colors,
            header.num_channels,
        );
        if data.len() < required {
            return Err(DecompressionError::BufferUnderflow {
                required,
                actual: data.len(),
            });
        }

        Ok(Kim1Decompressor {
            words: PackedWords::new(data),
            header,
            bits_per_pixel: compute_bits_per_pixel(header.num_colors),
            indices_offset: BITS_PER_WORD * Kim1FlatHeader::WORDS
                + 8 * header.num_colors as usize * header.num_channels.get() as usize,
        })
    }

    pub fn header(&self) -> &Kim1FlatHeader {
        &self.header
    }
}

impl SampleColor for Kim1Decompressor<'_> {
    fn width(&self) -> u32 {
        self.header.width
    }

    fn height(&self) -> u32 {
        self.header.height
    }

    /// Indices past the end of the palette, which only corrupt data holds,
    /// yield the last palette entry.
    fn color_at(&self, x: u32, y: u32) -> PackedColor {
        assert!(
            x < self.header.width && y < self.header.height,
            "({}, {}) is out of bounds",
            x, y
        );
        let pixel = x as usize + y as usize * self.header.width as usize;
        let bit_index = self.indices_offset + pixel * self.bits_per_pixel as usize;
        let index = self.words.read(bit_index, self.bits_per_pixel);
        read_palette_color(
            &self.words,
            BITS_PER_WORD * Kim1FlatHeader::WORDS,
            index.min(self.header.num_colors - 1),
            self.header.num_channels,
        )
    }
}
