//! Raw MSB-first bit I/O around the arithmetic coder
//!
//! The arithmetic encoder emits its output through [`BitWriter`]. Raw
//! sections inside a segment (PCM samples after `pcm_flag`) are written with
//! the same writer and read back with [`BitReader`].

use alloc::vec::Vec;

use crate::error::CabacError;

type Result<T> = core::result::Result<T, CabacError>;

/// MSB-first bit writer
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    /// Partially filled byte, left-aligned
    current: u8,
    /// Number of valid bits in `current` (0-7)
    bit_offset: u8,
}

impl BitWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer with room for `bytes` bytes
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            current: 0,
            bit_offset: 0,
        }
    }

    /// Append a single bit (only the lowest bit of `bit` is used)
    #[inline]
    pub fn put_bit(&mut self, bit: u32) {
        self.current |= ((bit & 1) as u8) << (7 - self.bit_offset);
        self.bit_offset += 1;
        if self.bit_offset == 8 {
            self.data.push(self.current);
            self.current = 0;
            self.bit_offset = 0;
        }
    }

    /// Append the low `n` bits of `value`, most significant first
    pub fn write_bits(&mut self, value: u32, n: u8) {
        debug_assert!(n <= 32);
        for i in (0..n).rev() {
            self.put_bit(value >> i);
        }
    }

    /// Check if at byte boundary
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset == 0
    }

    /// Pad with zero bits up to the next byte boundary
    pub fn align_zero(&mut self) {
        if self.bit_offset != 0 {
            self.data.push(self.current);
            self.current = 0;
            self.bit_offset = 0;
        }
    }

    /// Total number of bits written so far
    pub fn bit_len(&self) -> u64 {
        self.data.len() as u64 * 8 + u64::from(self.bit_offset)
    }

    /// Complete bytes written so far
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Byte-align with zeros and return the buffer
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.align_zero();
        self.data
    }
}

/// MSB-first bit reader for raw sections of a segment
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Skip to next byte boundary
    pub fn byte_align(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    /// Read a single bit
    pub fn read_bit(&mut self) -> Result<u8> {
        let Some(&byte) = self.data.get(self.byte_offset) else {
            return Err(CabacError::BitstreamCorrupt("raw section runs past end of segment"));
        };

        let bit = (byte >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;
        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit)
    }

    /// Read up to 32 bits
    pub fn read_bits(&mut self, n: u8) -> Result<u32> {
        debug_assert!(n <= 32);
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Current byte position, rounded up to the next whole byte
    pub fn byte_position(&self) -> usize {
        self.byte_offset + usize::from(self.bit_offset != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3);
        w.write_bits(0b11110, 5);
        w.put_bit(1);
        assert_eq!(w.bit_len(), 9);
        assert_eq!(w.into_bytes(), [0b1011_1110, 0b1000_0000]);
    }

    #[test]
    fn test_reader_matches_writer() {
        let mut w = BitWriter::new();
        w.write_bits(0x2a5, 10);
        w.write_bits(3, 2);
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(10).unwrap(), 0x2a5);
        assert_eq!(r.read_bits(2).unwrap(), 3);
        r.byte_align();
        assert_eq!(r.byte_position(), 2);
        assert!(r.read_bit().is_err());
    }
}
