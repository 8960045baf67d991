//! The block-partitioned kim1 format.
//!
//! The image is split into equally sized blocks. Every block has a local
//! palette of indices into the global palette, so the pixels of a block only
//! need enough bits to address the few colors that the block actually uses.
//!
//! All local palettes have the same number of slots: the largest number of
//! distinct colors in any block. Unused slots are zero.

use super::color::{PackedColor, PixelGrid};
use super::color_table::ColorTable;
use super::error::{CompressionError, DecompressionError};
use super::format::{
    read_header_words, Kim1BlockHeader, KIM1_BLOCK_MAX_COLORS, KIM1_BLOCK_MAX_DIMENSION,
    KIM1_MAX_COLORS_PER_BLOCK,
};
use super::kim1::{read_palette_color, write_palette};
use super::traits::SampleColor;
use crate::bitpack::{compute_bits_per_pixel, BitPacker, PackedWords};
use std::io::{self, Write};

const BITS_PER_WORD: usize = 32;
const MAX_BLOCK_DIMENSION: u32 = u8::MAX as u32;

/// The dimensions of one block, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSize {
    pub width: u32,
    pub height: u32,
}

impl BlockSize {
    pub fn new(width: u32, height: u32) -> BlockSize {
        BlockSize { width, height }
    }

    /// Checks that blocks of this size tile a `width` x `height` image.
    fn validate(&self, width: u32, height: u32) -> Result<(), CompressionError> {
        for (name, block, image) in [
            ("width", self.width, width),
            ("height", self.height, height),
        ] {
            if block == 0 || block > MAX_BLOCK_DIMENSION {
                return Err(CompressionError::InvalidParameter(format!(
                    "the block {} must be between 1 and {}, got {}",
                    name, MAX_BLOCK_DIMENSION, block
                )));
            }
            if image % block != 0 {
                return Err(CompressionError::InvalidParameter(format!(
                    "the block {} {} does not divide the image {} {}",
                    name, block, name, image
                )));
            }
        }
        Ok(())
    }
}

// The global palette is padded to a whole word.
fn palette_bytes(header: &Kim1BlockHeader) -> usize {
    let palette_bytes = header.num_colors as usize * header.num_channels.get() as usize;
    palette_bytes.next_multiple_of(4)
}

// A block holds its local palette followed by the local index of every pixel.
fn block_bits(header: &Kim1BlockHeader) -> usize {
    let bits_per_pixel = compute_bits_per_pixel(header.num_colors) as usize;
    let local_bits_per_pixel = compute_bits_per_pixel(header.num_colors_per_block) as usize;
    let block_pixels = header.block_width as usize * header.block_height as usize;
    header.num_colors_per_block as usize * bits_per_pixel + block_pixels * local_bits_per_pixel
}

/// Returns the number of bytes of a block-partitioned kim1 image.
///
/// # Panics
///
/// Panics if the block width or height is zero.
pub fn predict_byte_size(header: &Kim1BlockHeader) -> usize {
    let blocks_bits = header.num_blocks() as usize * block_bits(header);
    let blocks_bytes = blocks_bits.next_multiple_of(BITS_PER_WORD) / 8;
    4 * Kim1BlockHeader::WORDS + palette_bytes(header) + blocks_bytes
}

/// Returns the number of words of a block-partitioned kim1 image.
///
/// # Panics
///
/// Panics if the block width or height is zero.
pub fn predict_int_size(header: &Kim1BlockHeader) -> usize {
    predict_byte_size(header) / 4
}

/// The local palette of one block, and the local index of each of its pixels.
struct Block {
    palette: Vec<u32>,
    indices: Vec<u32>,
}

impl Block {
    fn local_index(&mut self, global_index: u32) -> Result<u32, CompressionError> {
        if let Some(local) = self.palette.iter().position(|&slot| slot == global_index) {
            return Ok(local as u32);
        }
        let local = self.palette.len() as u32;
        CompressionError::check_below(
            "the number of distinct colors in a block",
            local + 1,
            KIM1_MAX_COLORS_PER_BLOCK,
        )?;
        self.palette.push(global_index);
        Ok(local)
    }
}

/// Scans an image once, and can then compress it to the block-partitioned
/// kim1 format.
pub struct Kim1BlockCompressor {
    header: Kim1BlockHeader,
    color_table: ColorTable,
    blocks: Vec<Block>,
}

impl Kim1BlockCompressor {
    /// Builds the global palette and the local palette of every block.
    ///
    /// Fails when the image is 8192 pixels or more in either dimension, when it
    /// has 16384 distinct colors or more, when a block has 64 distinct colors or
    /// more, or when `block_size` does not tile the image.
    pub fn new(
        grid: &PixelGrid,
        block_size: BlockSize,
    ) -> Result<Kim1BlockCompressor, CompressionError> {
        let (width, height) = (grid.width(), grid.height());
        CompressionError::check_below("the width", width, KIM1_BLOCK_MAX_DIMENSION)?;
        CompressionError::check_below("the height", height, KIM1_BLOCK_MAX_DIMENSION)?;
        block_size.validate(width, height)?;

        let mut color_table = ColorTable::with_limit(KIM1_BLOCK_MAX_COLORS as usize);
        let global_indices = grid
            .pixels()
            .iter()
            .map(|&color| color_table.observe(color))
            .collect::<Result<Vec<u32>, CompressionError>>()?;

        let (blocks_x, blocks_y) = (width / block_size.width, height / block_size.height);
        let block_pixels = block_size.width as usize * block_size.height as usize;
        let mut blocks = Vec::with_capacity(blocks_x as usize * blocks_y as usize);
        for block_y in 0..blocks_y {
            for block_x in 0..blocks_x {
                let mut block = Block {
                    palette: Vec::new(),
                    indices: Vec::with_capacity(block_pixels),
                };
                for local_y in 0..block_size.height {
                    let y = block_y * block_size.height + local_y;
                    for local_x in 0..block_size.width {
                        let x = block_x * block_size.width + local_x;
                        let global_index = global_indices[x as usize + y as usize * width as usize];
                        let local_index = block.local_index(global_index)?;
                        block.indices.push(local_index);
                    }
                }
                log::trace!(
                    "block ({}, {}) uses {} colors",
                    block_x,
                    block_y,
                    block.palette.len()
                );
                blocks.push(block);
            }
        }

        let num_colors_per_block = blocks
            .iter()
            .map(|block| block.palette.len() as u32)
            .max()
            .unwrap_or(0);

        let header = Kim1BlockHeader {
            width,
            height,
            num_colors_per_block,
            block_width: block_size.width,
            block_height: block_size.height,
            num_colors: color_table.len() as u32,
            num_channels: grid.channel_count(),
        };
        log::debug!(
            "kim1 {}x{}: {} colors, at most {} per block, {} channels",
            width,
            height,
            header.num_colors,
            num_colors_per_block,
            header.num_channels.get()
        );

        Ok(Kim1BlockCompressor {
            header,
            color_table,
            blocks,
        })
    }

    pub fn header(&self) -> &Kim1BlockHeader {
        &self.header
    }

    /// The size of the compressed image, in words (4 bytes).
    pub fn int_size(&self) -> usize {
        predict_int_size(&self.header)
    }

    /// The size of the compressed image, in bytes.
    pub fn byte_size(&self) -> usize {
        predict_byte_size(&self.header)
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
        write_palette(&mut packer, &self.color_table, self.header.num_channels)?;
        packer.flush()?;

        let bits_per_pixel = compute_bits_per_pixel(self.header.num_colors);
        let local_bits_per_pixel = compute_bits_per_pixel(self.header.num_colors_per_block);
        for block in &self.blocks {
            for slot in 0..self.header.num_colors_per_block as usize {
                let global_index = block.palette.get(slot).copied().unwrap_or(0);
                packer.write(global_index, bits_per_pixel)?;
            }
            for &local_index in &block.indices {
                packer.write(local_index, local_bits_per_pixel)?;
            }
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

/// Reads pixels straight from a compressed block-partitioned kim1 image.
pub struct Kim1BlockDecompressor<'a> {
    words: PackedWords<'a>,
    header: Kim1BlockHeader,
    bits_per_pixel: u32,
    local_bits_per_pixel: u32,
    blocks_offset: usize,
    block_bits: usize,
}

impl<'a> Kim1BlockDecompressor<'a> {
    pub fn new(data: &'a [u8]) -> Result<Kim1BlockDecompressor<'a>, DecompressionError> {
        let header = Kim1BlockHeader::unpack(read_header_words::<2>(data)?);
        if header.width == 0 || header.height == 0 {
            return Err(DecompressionError::InvalidHeader("the image has no pixels"));
        }
        if header.block_width == 0 || header.block_height == 0 {
            return Err(DecompressionError::InvalidHeader("the blocks have no pixels"));
        }
        if header.width % header.block_width != 0 || header.height % header.block_height != 0 {
            return Err(DecompressionError::InvalidHeader("the blocks do not tile the image"));
        }
        if header.num_colors == 0 || header.num_colors_per_block == 0 {
            return Err(DecompressionError::InvalidHeader("the palette is empty"));
        }

        let required = predict_byte_size(&header);
        if data.len() < required {
            return Err(DecompressionError::BufferUnderflow {
                required,
                actual: data.len(),
            });
        }

        Ok(Kim1BlockDecompressor {
            words: PackedWords::new(data),
            header,
            bits_per_pixel: compute_bits_per_pixel(header.num_colors),
            local_bits_per_pixel: compute_bits_per_pixel(header.num_colors_per_block),
            blocks_offset: 8 * (4 * Kim1BlockHeader::WORDS + palette_bytes(&header)),
            block_bits: block_bits(&header),
        })
    }

    pub fn header(&self) -> &Kim1BlockHeader {
        &self.header
    }
}

impl SampleColor for Kim1BlockDecompressor<'_> {
    fn width(&self) -> u32 {
        self.header.width
    }

    fn height(&self) -> u32 {
        self.header.height
    }

    /// Indices past the end of a palette, which only corrupt data holds, yield
    /// the last entry of that palette.
    fn color_at(&self, x: u32, y: u32) -> PackedColor {
        let header = &self.header;
        assert!(
            x < header.width && y < header.height,
            "({}, {}) is out of bounds",
            x, y
        );
        let (block_x, local_x) = (x / header.block_width, x % header.block_width);
        let (block_y, local_y) = (y / header.block_height, y % header.block_height);
        let blocks_per_row = (header.width / header.block_width) as usize;
        let block_index = block_x as usize + block_y as usize * blocks_per_row;

        let block_offset = self.blocks_offset + block_index * self.block_bits;
        let local_pixel = local_x as usize + local_y as usize * header.block_width as usize;
        let local_offset = block_offset
            + header.num_colors_per_block as usize * self.bits_per_pixel as usize
            + local_pixel * self.local_bits_per_pixel as usize;

        let local_index = self.words.read(local_offset, self.local_bits_per_pixel);
        let local_index = local_index.min(header.num_colors_per_block - 1);
        let global_offset = block_offset + local_index as usize * self.bits_per_pixel as usize;
        let global_index = self.words.read(global_offset, self.bits_per_pixel);
        read_palette_color(
            &self.words,
            BITS_PER_WORD * Kim1BlockHeader::WORDS,
            global_index.min(header.num_colors - 1),
            header.num_channels,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::color::ChannelCount;

    fn round_trip(grid: &PixelGrid, block_size: BlockSize) -> Vec<u8> {
        let compressor = Kim1BlockCompressor::new(grid, block_size).unwrap();
        let compressed = compressor.compress_to_vec().unwrap();
        assert_eq!(compressed.len(), 4 * compressor.int_size());

        let decompressor = Kim1BlockDecompressor::new(&compressed).unwrap();
        assert_eq!(decompressor.header(), compressor.header());
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                assert_eq!(
                    decompressor.color_at(x, y),
                    grid.get(x, y),
                    "at ({}, {})",
                    x, y
                );
            }
        }
        compressed
    }

    // Two 2x2 blocks: the left one uses four colors, the right one only C.
    //
    // A B | C C
    // C D | C C
    fn two_blocks() -> PixelGrid {
        let a = PackedColor::rgb(10, 0, 0);
        let b = PackedColor::rgb(0, 20, 0);
        let c = PackedColor::rgb(0, 0, 30);
        let d = PackedColor::rgb(40, 40, 0);
        PixelGrid::new(4, 2, vec![a, b, c, c, c, d, c, c]).unwrap()
    }

    #[test]
    fn test_two_blocks() {
        let grid = two_blocks();
        let compressor = Kim1BlockCompressor::new(&grid, BlockSize::new(2, 2)).unwrap();
        let header = *compressor.header();
        assert_eq!(header.num_colors, 4);
        assert_eq!(header.num_colors_per_block, 4);
        assert_eq!(header.num_channels, ChannelCount::Three);

        // 8 header bytes, 12 palette bytes and 2 blocks of 16 bits.
        assert_eq!(compressor.byte_size(), 24);
        assert_eq!(compressor.int_size(), 6);

        let compressed = round_trip(&grid, BlockSize::new(2, 2));

        // The left block stores palette [0, 1, 2, 3] and pixels [0, 1, 2, 3],
        // the right block stores palette [2, 0, 0, 0] and pixels [0, 0, 0, 0].
        assert_eq!(&compressed[20..], &[0xE4, 0xE4, 0x02, 0x00]);
    }

    #[test]
    fn test_exact_header() {
        let compressed = Kim1BlockCompressor::new(&two_blocks(), BlockSize::new(2, 2))
            .unwrap()
            .compress_to_vec()
            .unwrap();
        let words = PackedWords::new(&compressed);
        assert_eq!(words.word(0), 4 | 2 << 13 | 4 << 26);
        assert_eq!(words.word(1), 2 | 2 << 8 | 4 << 16 | 2 << 30);
        assert_eq!(&compressed[8..11], &[10, 0, 0]);
    }

    #[test]
    fn test_whole_image_block() {
        let grid = two_blocks();
        let compressed = round_trip(&grid, BlockSize::new(4, 2));
        let header = *Kim1BlockDecompressor::new(&compressed).unwrap().header();
        assert_eq!(header.num_colors_per_block, 4);
    }

    #[test]
    fn test_single_pixel_blocks() {
        let grid = two_blocks();
        let compressed = round_trip(&grid, BlockSize::new(1, 1));
        let header = *Kim1BlockDecompressor::new(&compressed).unwrap().header();
        assert_eq!(header.num_colors_per_block, 1);
        // Every pixel only stores its 2-bit global index.
        assert_eq!(compressed.len(), 8 + 12 + 4);
    }

    #[test]
    fn test_block_color_limit() {
        let colors: Vec<PackedColor> = (0..64).map(|i| PackedColor::rgb(i, 0, 0)).collect();
        let grid = PixelGrid::new(8, 8, colors.clone()).unwrap();
        assert!(matches!(
            Kim1BlockCompressor::new(&grid, BlockSize::new(8, 8)),
            Err(CompressionError::SizeLimitExceeded {
                value: 64,
                max: 63,
                ..
            })
        ));

        // Splitting the same image into smaller blocks works.
        round_trip(&grid, BlockSize::new(4, 8));

        let mut colors = colors;
        colors[63] = colors[0];
        let grid = PixelGrid::new(8, 8, colors).unwrap();
        let compressed = round_trip(&grid, BlockSize::new(8, 8));
        let header = *Kim1BlockDecompressor::new(&compressed).unwrap().header();
        assert_eq!(header.num_colors_per_block, 63);
    }

    #[test]
    fn test_global_color_limit() {
        let colors: Vec<PackedColor> = (0..16383).map(PackedColor).collect();
        let grid = PixelGrid::new(127, 129, colors).unwrap();
        let compressed = round_trip(&grid, BlockSize::new(1, 1));
        let header = *Kim1BlockDecompressor::new(&compressed).unwrap().header();
        assert_eq!(header.num_colors, KIM1_BLOCK_MAX_COLORS - 1);
        assert_eq!(header.num_colors_per_block, 1);

        let colors: Vec<PackedColor> = (0..16384).map(PackedColor).collect();
        let grid = PixelGrid::new(128, 128, colors).unwrap();
        assert!(matches!(
            Kim1BlockCompressor::new(&grid, BlockSize::new(1, 1)),
            Err(CompressionError::SizeLimitExceeded {
                what: "the number of distinct colors",
                value: 16384,
                max: 16383
            })
        ));
    }

    #[test]
    fn test_index_past_palette() {
        let colors: Vec<PackedColor> = (1..=3).map(|i| PackedColor::rgba(i, i, i, i)).collect();
        let grid = PixelGrid::new(3, 1, colors).unwrap();
        let mut compressed = round_trip(&grid, BlockSize::new(3, 1));
        // 8 header bytes, 12 palette bytes and one block of 12 bits.
        assert_eq!(compressed.len(), 24);

        // The block starts at byte 20 with the 2-bit slots [0, 1, 2], followed
        // by the 2-bit local indices [0, 1, 2]. Raise the last local index to 3.
        compressed[21] |= 0b11 << 2;
        let decompressor = Kim1BlockDecompressor::new(&compressed).unwrap();
        assert_eq!(decompressor.color_at(2, 0), PackedColor::rgba(3, 3, 3, 3));

        // Raise the last slot to 3.
        compressed[20] |= 0b11 << 4;
        let decompressor = Kim1BlockDecompressor::new(&compressed).unwrap();
        assert_eq!(decompressor.color_at(0, 0), PackedColor::rgba(1, 1, 1, 1));
        assert_eq!(decompressor.color_at(2, 0), PackedColor::rgba(3, 3, 3, 3));
    }

    #[test]
    fn test_invalid_block_size() {
        let grid = PixelGrid::new(510, 2, vec![PackedColor::default(); 1020]).unwrap();
        for block_size in [
            BlockSize::new(0, 2),
            BlockSize::new(2, 0),
            BlockSize::new(510, 2),
            BlockSize::new(4, 2),
            BlockSize::new(2, 3),
        ] {
            assert!(
                matches!(
                    Kim1BlockCompressor::new(&grid, block_size),
                    Err(CompressionError::InvalidParameter(_))
                ),
                "{:?}",
                block_size
            );
        }
        round_trip(&grid, BlockSize::new(255, 2));
    }

    #[test]
    fn test_dimension_limit() {
        let grid = PixelGrid::new(8192, 1, vec![PackedColor::default(); 8192]).unwrap();
        assert!(matches!(
            Kim1BlockCompressor::new(&grid, BlockSize::new(8, 1)),
            Err(CompressionError::SizeLimitExceeded {
                what: "the width",
                max: 8191,
                ..
            })
        ));

        let grid = PixelGrid::new(1, 8192, vec![PackedColor::default(); 8192]).unwrap();
        assert!(matches!(
            Kim1BlockCompressor::new(&grid, BlockSize::new(1, 8)),
            Err(CompressionError::SizeLimitExceeded {
                what: "the height",
                value: 8192,
                max: 8191
            })
        ));
    }

    #[test]
    fn test_predict_byte_size() {
        let header = Kim1BlockHeader {
            width: 16,
            height: 8,
            num_colors_per_block: 5,
            block_width: 4,
            block_height: 4,
            num_colors: 9,
            num_channels: ChannelCount::Four,
        };
        // 8 blocks of 5 * 4 + 16 * 3 = 68 bits each.
        assert_eq!(predict_byte_size(&header), 8 + 36 + 68);
        assert_eq!(predict_int_size(&header), 28);

        let header = Kim1BlockHeader {
            num_channels: ChannelCount::Three,
            ..header
        };
        assert_eq!(predict_byte_size(&header), 8 + 28 + 68);
    }

    #[test]
    fn test_decompressor_validation() {
        let compressed = Kim1BlockCompressor::new(&two_blocks(), BlockSize::new(2, 2))
            .unwrap()
            .compress_to_vec()
            .unwrap();
        assert!(matches!(
            Kim1BlockDecompressor::new(&compressed[..20]),
            Err(DecompressionError::BufferUnderflow {
                required: 24,
                actual: 20
            })
        ));

        let mut corrupt = compressed.clone();
        corrupt[4] = 3;
        assert!(matches!(
            Kim1BlockDecompressor::new(&corrupt),
            Err(DecompressionError::InvalidHeader(_))
        ));

        corrupt[4] = 0;
        assert!(matches!(
            Kim1BlockDecompressor::new(&corrupt),
            Err(DecompressionError::InvalidHeader(_))
        ));
    }
}
