use super::color::{ChannelCount, PackedColor};
use super::error::{CompressionError, DecompressionError};
use crate::bitpack::{pack, unpack, PackedWords};
use std::convert::TryFrom;

/// Flat kim1 images are smaller than this in both dimensions, and have fewer
/// distinct colors than this.
pub const KIM1_FLAT_LIMIT: u32 = 1 << 10;
/// Block kim1 images are smaller than this in both dimensions.
pub const KIM1_BLOCK_MAX_DIMENSION: u32 = 1 << 13;
/// Block kim1 images have fewer distinct colors than this.
pub const KIM1_BLOCK_MAX_COLORS: u32 = 1 << 14;
/// Every block of a block kim1 image has fewer distinct colors than this.
pub const KIM1_MAX_COLORS_PER_BLOCK: u32 = 1 << 6;
/// The largest width or height of a kim2 image.
pub const KIM2_MAX_SIZE: u32 = (1 << 15) - 1;

fn channel_count(raw: u32) -> ChannelCount {
    // Two bits always hold a valid count minus one.
    match raw & 3 {
        0 => ChannelCount::One,
        1 => ChannelCount::Two,
        2 => ChannelCount::Three,
        _ => ChannelCount::Four,
    }
}

/// The single header word of a flat kim1 image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Kim1FlatHeader {
    pub width: u32,
    pub height: u32,
    pub num_colors: u32,
    pub num_channels: ChannelCount,
}

impl Kim1FlatHeader {
    pub const WORDS: usize = 1;

    pub fn pack(&self) -> u32 {
        pack(self.width, 0)
            | pack(self.height, 10)
            | pack(self.num_colors, 20)
            | pack(self.num_channels.get() - 1, 30)
    }

    pub fn unpack(word: u32) -> Kim1FlatHeader {
        Kim1FlatHeader {
            width: unpack(word, 0, 10),
            height: unpack(word, 10, 10),
            num_colors: unpack(word, 20, 10),
            num_channels: channel_count(unpack(word, 30, 2)),
        }
    }
}

/// The two header words of a block-partitioned kim1 image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Kim1BlockHeader {
    pub width: u32,
    pub height: u32,
    pub num_colors_per_block: u32,
    pub block_width: u32,
    pub block_height: u32,
    pub num_colors: u32,
    pub num_channels: ChannelCount,
}

impl Kim1BlockHeader {
    pub const WORDS: usize = 2;

    pub fn pack(&self) -> [u32; 2] {
        [
            pack(self.width, 0) | pack(self.height, 13) | pack(self.num_colors_per_block, 26),
            pack(self.block_width, 0)
                | pack(self.block_height, 8)
                | pack(self.num_colors, 16)
                | pack(self.num_channels.get() - 1, 30),
        ]
    }

    pub fn unpack([first, second]: [u32; 2]) -> Kim1BlockHeader {
        Kim1BlockHeader {
            width: unpack(first, 0, 13),
            height: unpack(first, 13, 13),
            num_colors_per_block: unpack(first, 26, 6),
            block_width: unpack(second, 0, 8),
            block_height: unpack(second, 8, 8),
            num_colors: unpack(second, 16, 14),
            num_channels: channel_count(unpack(second, 30, 2)),
        }
    }

    pub fn num_blocks(&self) -> u32 {
        (self.width / self.block_width) * (self.height / self.block_height)
    }
}

/// The number of bits that a kim2 image uses to store the alpha of one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlphaBits {
    One = 0,
    Two = 1,
    Four = 2,
    Eight = 3,
}

impl AlphaBits {
    pub fn bits(self) -> u32 {
        1 << self as u32
    }

    /// The largest quantized alpha value.
    pub fn num_steps(self) -> u32 {
        (1 << self.bits()) - 1
    }

    /// The distance between two neighbouring alpha levels.
    pub fn step_size(self) -> u32 {
        u8::MAX as u32 / self.num_steps()
    }

    fn from_code(code: u32) -> AlphaBits {
        match code & 3 {
            0 => AlphaBits::One,
            1 => AlphaBits::Two,
            2 => AlphaBits::Four,
            _ => AlphaBits::Eight,
        }
    }
}

impl TryFrom<u32> for AlphaBits {
    type Error = CompressionError;

    fn try_from(bits_per_pixel: u32) -> Result<Self, Self::Error> {
        match bits_per_pixel {
            1 => Ok(AlphaBits::One),
            2 => Ok(AlphaBits::Two),
            4 => Ok(AlphaBits::Four),
            8 => Ok(AlphaBits::Eight),
            _ => Err(CompressionError::InvalidParameter(format!(
                "bits per pixel must be 1, 2, 4, or 8, got {}",
                bits_per_pixel
            ))),
        }
    }
}

/// The two header words of a kim2 image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Kim2Header {
    pub width: u32,
    pub height: u32,
    pub alpha_bits: AlphaBits,
    /// Only the red, green and blue channels are meaningful.
    pub base_color: PackedColor,
}

impl Kim2Header {
    pub const WORDS: usize = 2;

    pub fn pack(&self) -> [u32; 2] {
        [
            pack(self.width, 0) | pack(self.height, 15) | pack(self.alpha_bits as u32, 30),
            self.base_color.with_alpha(0).0,
        ]
    }

    pub fn unpack([first, second]: [u32; 2]) -> Kim2Header {
        Kim2Header {
            width: Kim2Header::width(first),
            height: Kim2Header::height(first),
            alpha_bits: Kim2Header::alpha_bits(first),
            base_color: PackedColor(second).with_alpha(0),
        }
    }

    /// Extracts the width from the first header word.
    pub fn width(header: u32) -> u32 {
        unpack(header, 0, 15)
    }

    /// Extracts the height from the first header word.
    pub fn height(header: u32) -> u32 {
        unpack(header, 15, 15)
    }

    /// Extracts the alpha precision from the first header word.
    pub fn alpha_bits(header: u32) -> AlphaBits {
        AlphaBits::from_code(unpack(header, 30, 2))
    }
}

/// Reads the first `N` words of `data`.
pub(crate) fn read_header_words<const N: usize>(
    data: &[u8],
) -> Result<[u32; N], DecompressionError> {
    let required = 4 * N;
    if data.len() < required {
        return Err(DecompressionError::BufferUnderflow {
            required,
            actual: data.len(),
        });
    }
    let words = PackedWords::new(data);
    let mut header = [0; N];
    for (i, word) in header.iter_mut().enumerate() {
        *word = words.word(i);
    }
    Ok(header)
}
