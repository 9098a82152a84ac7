//! Golomb-Rice entropy coder (decode side)
//!
//! The simpler of FFV1's two symbol-coding modes, selected once per stream.
//! Residuals come straight out of the bit reader as adaptive-k Rice codes
//! with an escape for large magnitudes; flat regions use run-length coding.
//! The only adaptive state is a small per-context counter set.

use crate::bitstream::BitReader;
use crate::coder::tables::LOG2_RUN;
use crate::error::Result;

/// Adaptive per-context state of the Golomb-Rice coder.
///
/// `drift` and `error_sum` drive the Rice parameter selection, `bias`
/// recenters the residual distribution, `count` ages the statistics.
#[derive(Debug, Clone)]
pub struct VlcState {
    drift: i32,
    error_sum: i32,
    bias: i32,
    count: i32,
}

impl Default for VlcState {
    fn default() -> Self {
        VlcState {
            drift: 0,
            error_sum: 4,
            bias: 0,
            count: 1,
        }
    }
}

/// Sign-extend the low `bits` bits of `n`
pub fn sign_extend(n: i32, bits: u32) -> i32 {
    if bits == 8 {
        n as i8 as i32
    } else {
        (n << (32 - bits)) >> (32 - bits)
    }
}

/// Golomb-Rice coder over one slice payload
pub struct GolombCoder<'a> {
    reader: BitReader<'a>,
    run_mode: i32,
    run_count: i32,
    run_index: usize,
    x: u32,
    width: u32,
}

impl<'a> GolombCoder<'a> {
    /// Create a Golomb-Rice coder over a byte range
    pub fn new(buf: &'a [u8]) -> Self {
        GolombCoder {
            reader: BitReader::new(buf),
            run_mode: 0,
            run_count: 0,
            run_index: 0,
            x: 0,
            width: 0,
        }
    }

    /// Reset the run index for a new plane of the given width
    pub fn new_plane(&mut self, width: u32) {
        self.width = width;
        self.run_index = 0;
    }

    /// Reset the horizontal position; runs never span lines
    pub fn new_line(&mut self) {
        self.new_run();
        self.x = 0;
    }

    fn new_run(&mut self) {
        self.run_mode = 0;
        self.run_count = 0;
    }

    /// Decode the next signed residual for a pixel with the given context.
    ///
    /// A zero context switches the coder into run mode; inside a run the
    /// residual is zero by definition.
    pub fn decode_residual(
        &mut self,
        context: i32,
        state: &mut VlcState,
        bits: u32,
    ) -> Result<i32> {
        if context == 0 && self.run_mode == 0 {
            self.run_mode = 1;
        }

        if self.run_mode != 0 {
            if self.run_count == 0 && self.run_mode == 1 {
                if self.reader.read_bit()? == 1 {
                    self.run_count = 1 << LOG2_RUN[self.run_index];
                    if self.x + self.run_count as u32 <= self.width {
                        self.run_index += 1;
                    }
                } else {
                    if LOG2_RUN[self.run_index] != 0 {
                        self.run_count = self.reader.read_bits(LOG2_RUN[self.run_index])? as i32;
                    } else {
                        self.run_count = 0;
                    }
                    if self.run_index != 0 {
                        self.run_index -= 1;
                    }
                    // A partial run is terminated by a coded symbol.
                    self.run_mode = 2;
                }
            }

            self.run_count -= 1;
            if self.run_count < 0 {
                // The run is over; read the symbol that broke it.
                self.new_run();
                let mut diff = self.decode_vlc_symbol(state, bits)?;
                // Level coding skips the zero that would have extended the run.
                if diff >= 0 {
                    diff += 1;
                }
                self.x += 1;
                Ok(diff)
            } else {
                self.x += 1;
                Ok(0)
            }
        } else {
            self.x += 1;
            self.decode_vlc_symbol(state, bits)
        }
    }

    /// Decode one scalar symbol and update the adaptive state
    fn decode_vlc_symbol(&mut self, state: &mut VlcState, bits: u32) -> Result<i32> {
        let mut i = state.count;
        let mut k = 0u32;
        while i < state.error_sum {
            k += 1;
            i += i;
        }

        let mut v = self.read_signed_golomb(k, bits)?;
        if 2 * state.drift < -state.count {
            v = -1 - v;
        }

        let ret = sign_extend(v + state.bias, bits);

        state.error_sum += v.abs();
        state.drift += v;

        if state.count == 128 {
            state.count >>= 1;
            state.drift >>= 1;
            state.error_sum >>= 1;
        }
        state.count += 1;
        if state.drift <= -state.count {
            state.bias = (state.bias - 1).max(-128);
            state.drift = (state.drift + state.count).max(-state.count + 1);
        } else if state.drift > 0 {
            state.bias = (state.bias + 1).min(127);
            state.drift = (state.drift - state.count).min(0);
        }

        Ok(ret)
    }

    /// Read a signed Golomb-Rice code with parameter `k`
    fn read_signed_golomb(&mut self, k: u32, bits: u32) -> Result<i32> {
        let v = self.read_unsigned_golomb(k, bits)?;
        if v & 1 == 1 {
            Ok(-(v >> 1) - 1)
        } else {
            Ok(v >> 1)
        }
    }

    /// Read an unsigned Golomb-Rice code with parameter `k`.
    ///
    /// Twelve zero prefix bits escape to a raw `bits`-wide value.
    fn read_unsigned_golomb(&mut self, k: u32, bits: u32) -> Result<i32> {
        for prefix in 0..12 {
            if self.reader.read_bit()? == 1 {
                return Ok(self.reader.read_bits(k)? as i32 + (prefix << k));
            }
        }
        Ok(self.reader.read_bits(bits)? as i32 + 11)
    }
}
