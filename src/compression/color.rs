use super::error::CompressionError;
use image::{Rgba, RgbaImage};
use std::convert::TryFrom;
use std::fmt;

/// A color with four 8-bit channels packed into one word:
/// `red | green << 8 | blue << 16 | alpha << 24`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedColor(pub u32);

impl PackedColor {
    pub const fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> PackedColor {
        PackedColor(
            red as u32 | (green as u32) << 8 | (blue as u32) << 16 | (alpha as u32) << 24,
        )
    }

    /// A fully opaque color.
    pub const fn rgb(red: u8, green: u8, blue: u8) -> PackedColor {
        PackedColor::rgba(red, green, blue, u8::MAX)
    }

    pub const fn red(self) -> u8 {
        self.0 as u8
    }

    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn blue(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the same color with its alpha channel replaced.
    pub const fn with_alpha(self, alpha: u8) -> PackedColor {
        PackedColor(self.0 & 0x00FF_FFFF | (alpha as u32) << 24)
    }
}

impl fmt::Debug for PackedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rgba({}, {}, {}, {})",
            self.red(),
            self.green(),
            self.blue(),
            self.alpha()
        )
    }
}

impl From<Rgba<u8>> for PackedColor {
    fn from(Rgba([red, green, blue, alpha]): Rgba<u8>) -> PackedColor {
        PackedColor::rgba(red, green, blue, alpha)
    }
}

impl From<PackedColor> for Rgba<u8> {
    fn from(color: PackedColor) -> Rgba<u8> {
        Rgba([color.red(), color.green(), color.blue(), color.alpha()])
    }
}

/// The number of channels a kim1 palette stores per color.
///
/// The channels that are not stored are reconstructed on decode: green copies
/// red, blue copies green and alpha is fully opaque.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelCount {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
}

impl ChannelCount {
    /// Returns the smallest channel count that can store `color` losslessly.
    pub fn required_for(color: PackedColor) -> ChannelCount {
        if color.alpha() != u8::MAX {
            ChannelCount::Four
        } else if color.blue() != color.green() {
            ChannelCount::Three
        } else if color.green() != color.red() {
            ChannelCount::Two
        } else {
            ChannelCount::One
        }
    }

    pub fn get(self) -> u32 {
        self as u32
    }

    /// Rebuilds a full color from the `self.get()` bytes stored in `stored`.
    pub fn widen(self, stored: u32) -> PackedColor {
        let red = stored as u8;
        let green = if self >= ChannelCount::Two {
            (stored >> 8) as u8
        } else {
            red
        };
        let blue = if self >= ChannelCount::Three {
            (stored >> 16) as u8
        } else {
            green
        };
        let alpha = if self == ChannelCount::Four {
            (stored >> 24) as u8
        } else {
            u8::MAX
        };
        PackedColor::rgba(red, green, blue, alpha)
    }
}

impl TryFrom<u32> for ChannelCount {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ChannelCount::One),
            2 => Ok(ChannelCount::Two),
            3 => Ok(ChannelCount::Three),
            4 => Ok(ChannelCount::Four),
            _ => Err(value),
        }
    }
}

/// An immutable, row-major image with at least one pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<PackedColor>,
}

fn pixel_count(width: u32, height: u32) -> Result<usize, CompressionError> {
    if width == 0 || height == 0 {
        return Err(CompressionError::InvalidParameter(format!(
            "both width and height must be positive, got {}x{}",
            width, height
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| {
            CompressionError::InvalidParameter(format!("{}x{} overflows", width, height))
        })
}

impl PixelGrid {
    /// Wraps `pixels`, which must hold exactly `width * height` colors.
    pub fn new(
        width: u32,
        height: u32,
        pixels: Vec<PackedColor>,
    ) -> Result<PixelGrid, CompressionError> {
        let expected = pixel_count(width, height)?;
        if pixels.len() < expected {
            return Err(CompressionError::BufferUnderflow {
                required: expected,
                actual: pixels.len(),
            });
        }
        if pixels.len() > expected {
            return Err(CompressionError::InvalidParameter(format!(
                "expected {} pixels, got {}",
                expected,
                pixels.len()
            )));
        }
        Ok(PixelGrid {
            width,
            height,
            pixels,
        })
    }

    /// Reads an image that stores `num_data_channels` bytes per pixel.
    ///
    /// - 4: RGBA
    /// - 3: RGB, fully opaque
    /// - 2: RG, fully opaque, blue equals green
    /// - 1: greyscale, fully opaque
    ///
    /// Bytes after the last pixel are ignored.
    pub fn from_raw_channels(
        bytes: &[u8],
        width: u32,
        height: u32,
        num_data_channels: u32,
    ) -> Result<PixelGrid, CompressionError> {
        let channels = ChannelCount::try_from(num_data_channels).map_err(|value| {
            CompressionError::InvalidParameter(format!(
                "the number of data channels must be between 1 and 4, got {}",
                value
            ))
        })?;
        let num_pixels = pixel_count(width, height)?;
        let stride = channels.get() as usize;
        let required = num_pixels * stride;
        if bytes.len() < required {
            return Err(CompressionError::BufferUnderflow {
                required,
                actual: bytes.len(),
            });
        }

        let pixels = bytes[..required]
            .chunks_exact(stride)
            .map(|chunk| {
                let stored = chunk
                    .iter()
                    .enumerate()
                    .fold(0u32, |word, (i, &byte)| word | u32::from(byte) << (8 * i));
                channels.widen(stored)
            })
            .collect();

        PixelGrid::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns all pixels in row-major order.
    pub fn pixels(&self) -> &[PackedColor] {
        &self.pixels
    }

    /// Returns the color at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` lies outside the grid.
    pub fn get(&self, x: u32, y: u32) -> PackedColor {
        assert!(
            x < self.width && y < self.height,
            "({}, {}) is out of bounds",
            x, y
        );
        self.pixels[x as usize + y as usize * self.width as usize]
    }

    /// Returns the smallest channel count that stores every pixel losslessly.
    pub fn channel_count(&self) -> ChannelCount {
        self.pixels
            .iter()
            .map(|&color| ChannelCount::required_for(color))
            .max()
            .unwrap_or(ChannelCount::One)
    }
}

impl TryFrom<&RgbaImage> for PixelGrid {
    type Error = CompressionError;

    fn try_from(image: &RgbaImage) -> Result<Self, Self::Error> {
        let pixels = image.pixels().map(|&pixel| pixel.into()).collect();
        PixelGrid::new(image.width(), image.height(), pixels)
    }
}

impl From<&PixelGrid> for RgbaImage {
    fn from(grid: &PixelGrid) -> RgbaImage {
        RgbaImage::from_fn(grid.width(), grid.height(), |x, y| grid.get(x, y).into())
    }
}
