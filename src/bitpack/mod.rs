use bitstream_io::{BitWrite, BitWriter, LittleEndian};
use byteorder::ByteOrder;
use std::io::{self, Write};

const BITS_PER_WORD: u32 = 32;
const BYTES_PER_WORD: usize = 4;

/// Returns the number of bits needed to store any index in `[0, num_colors)`.
///
/// A single color needs no bits at all.
pub fn compute_bits_per_pixel(num_colors: u32) -> u32 {
    if num_colors <= 1 {
        0
    } else {
        u32::BITS - (num_colors - 1).leading_zeros()
    }
}

/// Returns a mask that keeps the lowest `bits` bits of a word.
pub fn mask(bits: u32) -> u32 {
    if bits >= BITS_PER_WORD {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Shifts `value` to `bit_offset`, ready to be or-ed into a packed word.
///
/// # Panics
///
/// Panics in debug builds if `bit_offset` is 32 or more.
pub fn pack(value: u32, bit_offset: u32) -> u32 {
    value << bit_offset
}

/// Extracts the `bit_length` bits that start at `bit_offset` from `packed`.
pub fn unpack(packed: u32, bit_offset: u32, bit_length: u32) -> u32 {
    (packed >> bit_offset) & mask(bit_length)
}

/// Writes unsigned values of 0 to 32 bits into a stream of little-endian
/// 32-bit words, least significant bit first.
pub struct BitPacker<W>
where
    W: Write,
{
    bitwriter: BitWriter<W, LittleEndian>,
    bits_written: usize,
}

impl<W> BitPacker<W>
where
    W: Write,
{
    /// Constructs a new `BitPacker` that emits its words to `to`.
    pub fn new(to: W) -> BitPacker<W> {
        BitPacker {
            bitwriter: BitWriter::new(to),
            bits_written: 0,
        }
    }

    /// Appends the lowest `num_bits` bits of `value`.
    pub fn write(&mut self, value: u32, num_bits: u32) -> io::Result<()> {
        debug_assert!(num_bits <= BITS_PER_WORD);
        if num_bits == 0 {
            return Ok(());
        }
        self.bitwriter.write(num_bits, value & mask(num_bits))?;
        self.bits_written += num_bits as usize;
        Ok(())
    }

    /// Pads the pending bits with zeros up to a word boundary, so the next
    /// value starts in a fresh word.
    pub fn flush(&mut self) -> io::Result<()> {
        let partial = (self.bits_written % BITS_PER_WORD as usize) as u32;
        if partial > 0 {
            let padding = BITS_PER_WORD - partial;
            self.bitwriter.write(padding, 0u32)?;
            self.bits_written += padding as usize;
        }
        Ok(())
    }

    /// Returns the number of complete words emitted so far.
    pub fn words_written(&self) -> usize {
        self.bits_written / BITS_PER_WORD as usize
    }

    /// Returns the underlying writer. Bits that were not flushed are lost.
    pub fn into_inner(self) -> W {
        self.bitwriter.into_writer()
    }
}

/// A read-only view over a buffer of little-endian 32-bit words that supports
/// reading any bit field in constant time.
#[derive(Clone, Copy)]
pub struct PackedWords<'a> {
    data: &'a [u8],
}

impl<'a> PackedWords<'a> {
    pub fn new(data: &'a [u8]) -> PackedWords<'a> {
        PackedWords { data }
    }

    /// Returns the number of complete words in the buffer.
    pub fn len(&self) -> usize {
        self.data.len() / BYTES_PER_WORD
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the word at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the buffer holds no complete word at `index`.
    pub fn word(&self, index: usize) -> u32 {
        let start = index * BYTES_PER_WORD;
        byteorder::LittleEndian::read_u32(&self.data[start..start + BYTES_PER_WORD])
    }

    /// Reads the `bit_length` bits that start at bit `bit_index` of the buffer.
    ///
    /// A field may cross one word boundary. Reading 0 bits always yields 0.
    ///
    /// # Panics
    ///
    /// Panics if the field ends beyond the last complete word.
    pub fn read(&self, bit_index: usize, bit_length: u32) -> u32 {
        if bit_length == 0 {
            return 0;
        }
        debug_assert!(bit_length <= BITS_PER_WORD);

        let word_index = bit_index / BITS_PER_WORD as usize;
        let bit_offset = (bit_index % BITS_PER_WORD as usize) as u32;
        let low_word = self.word(word_index);

        let end = bit_offset + bit_length;
        if end > BITS_PER_WORD {
            let high_length = end - BITS_PER_WORD;
            let low_length = bit_length - high_length;
            let high_word = self.word(word_index + 1);
            unpack(low_word, bit_offset, low_length)
                | pack(unpack(high_word, 0, high_length), low_length)
        } else {
            unpack(low_word, bit_offset, bit_length)
        }
    }
}
