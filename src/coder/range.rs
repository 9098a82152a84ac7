//! Adaptive binary range coder (decode side)
//!
//! FFV1's range coder keeps a normalized 16-bit interval and one mutable
//! probability state byte per context cell. Decoding a bit narrows the
//! interval and moves the state through a fixed transition table; there is
//! no separate training pass.

use crate::coder::tables::DEFAULT_STATE_TRANSITION;
use crate::error::{Error, Result};

/// Number of probability state bytes per context
pub const CONTEXT_SIZE: usize = 32;

/// Range coder over one compressed byte range
pub struct RangeCoder<'a> {
    buf: &'a [u8],
    pos: usize,
    low: u16,
    rng: u16,
    zero_state: [u8; 256],
    one_state: [u8; 256],
}

impl<'a> RangeCoder<'a> {
    /// Create a range coder positioned at the start of `buf`.
    ///
    /// The first two bytes seed the interval; a shorter buffer cannot
    /// contain a coded symbol.
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::EndOfBuffer);
        }

        let mut pos = 2;
        let mut low = u16::from(buf[0]) << 8 | u16::from(buf[1]);
        let rng = 0xFF00;

        if low >= rng {
            low = rng;
            pos = buf.len().saturating_sub(1);
        }

        let mut coder = RangeCoder {
            buf,
            pos,
            low,
            rng,
            zero_state: [0; 256],
            one_state: [0; 256],
        };
        coder.set_state_transition(&DEFAULT_STATE_TRANSITION);
        Ok(coder)
    }

    /// Install a state transition table (default or per-stream adjusted)
    pub fn set_state_transition(&mut self, table: &[u8; 256]) {
        self.one_state.copy_from_slice(table);
        for i in 1..255 {
            self.zero_state[i] = (256 - u16::from(self.one_state[256 - i])) as u8;
        }
    }

    /// Renormalize the interval, pulling in the next byte when needed.
    /// Past the end of the buffer the low bits stay zero; range mode has
    /// no in-band end marker, truncation is caught by the slice CRC.
    #[inline]
    fn refill(&mut self) {
        if self.rng < 0x100 {
            self.rng <<= 8;
            self.low <<= 8;
            if self.pos < self.buf.len() {
                self.low += u16::from(self.buf[self.pos]);
                self.pos += 1;
            }
        }
    }

    /// Decode one bit against the probability state cell, updating it in place
    #[inline]
    pub fn decode_bit(&mut self, state: &mut u8) -> bool {
        let split = ((u32::from(self.rng) * u32::from(*state)) >> 8) as u16;
        self.rng -= split;
        if self.low < self.rng {
            *state = self.zero_state[*state as usize];
            self.refill();
            false
        } else {
            self.low -= self.rng;
            self.rng = split;
            *state = self.one_state[*state as usize];
            self.refill();
            true
        }
    }

    /// Decode a Boolean header field
    pub fn decode_bool(&mut self, states: &mut [u8; CONTEXT_SIZE]) -> bool {
        self.decode_bit(&mut states[0])
    }

    /// Decode an unsigned scalar symbol
    pub fn decode_uint(&mut self, states: &mut [u8; CONTEXT_SIZE]) -> Result<u32> {
        Ok(self.decode_symbol(states, false)? as u32)
    }

    /// Decode a signed scalar symbol
    pub fn decode_sint(&mut self, states: &mut [u8; CONTEXT_SIZE]) -> Result<i32> {
        self.decode_symbol(states, true)
    }

    /// Decode a non-binary symbol: a zero flag, a unary exponent, the
    /// mantissa bits, and for signed symbols a sign bit, each with its own
    /// state cell inside the 32-byte context.
    pub fn decode_symbol(&mut self, states: &mut [u8], signed: bool) -> Result<i32> {
        if self.decode_bit(&mut states[0]) {
            return Ok(0);
        }

        let mut e = 0usize;
        while self.decode_bit(&mut states[1 + e.min(9)]) {
            e += 1;
            if e > 31 {
                return Err(Error::corrupt("range-coded exponent out of range"));
            }
        }

        let mut a: u32 = 1;
        for i in (0..e).rev() {
            a *= 2;
            if self.decode_bit(&mut states[22 + i.min(9)]) {
                a += 1;
            }
        }

        if signed && self.decode_bit(&mut states[11 + e.min(10)]) {
            Ok(-(a as i32))
        } else {
            Ok(a as i32)
        }
    }

    /// Consume the sentinel bit that terminates a range-coded section
    /// ahead of a Golomb-Rice payload.
    pub fn sentinel_end(&mut self) {
        let mut state: u8 = 129;
        self.decode_bit(&mut state);
    }

    /// Byte position of the next unconsumed input byte
    pub fn position(&self) -> usize {
        if self.rng < 0x100 {
            self.pos.saturating_sub(1)
        } else {
            self.pos
        }
    }
}
