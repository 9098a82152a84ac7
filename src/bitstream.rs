//! Bit-level reading over a compressed buffer
//!
//! The Golomb-Rice coder consumes the slice payload bit by bit, MSB first.
//! Reads past the end of the buffer are a hard error: a truncated stream
//! must surface as corruption, never as silent zero-fill.

use crate::error::{Error, Result};

/// Bitstream reader over a byte buffer, MSB first
pub struct BitReader<'a> {
    /// Input data
    data: &'a [u8],
    /// Current byte position
    byte_pos: usize,
    /// Current bit position within byte (0-7)
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Create a new bit reader over a buffer
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Read a single bit
    #[inline]
    pub fn read_bit(&mut self) -> Result<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(Error::EndOfBuffer);
        }

        let bit = u32::from((self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1);
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        Ok(bit)
    }

    /// Read `n` bits, up to 32, as an unsigned value
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(Error::corrupt(format!("cannot read {} bits at once", n)));
        }

        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()?;
        }
        Ok(value)
    }

    /// Peek `n` bits without advancing the cursor
    pub fn peek_bits(&mut self, n: u32) -> Result<u32> {
        let byte_pos = self.byte_pos;
        let bit_pos = self.bit_pos;
        let value = self.read_bits(n);
        self.byte_pos = byte_pos;
        self.bit_pos = bit_pos;
        value
    }

    /// Skip forward to the next byte boundary
    pub fn align(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// Number of bits left in the buffer
    pub fn remaining_bits(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos
    }

    /// Current position in bytes (rounded down)
    pub fn position(&self) -> usize {
        self.byte_pos
    }
}
