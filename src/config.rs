//! Stream configuration ("extradata") parsing
//!
//! FFV1 carries its codec parameters out of band in a range-coded
//! configuration record: coder selection, color space, bit depth, the slice
//! grid, and the quantization table sets that drive context modeling. The
//! record is parsed once per session and is immutable afterwards; every
//! frame and slice decode reads it through a shared reference.
//!
//! See `Decoder::new` for the caller-side contract on where these bytes
//! come from.

use crate::coder::tables::DEFAULT_STATE_TRANSITION;
use crate::coder::{RangeCoder, CONTEXT_SIZE};
use crate::crc::crc32;
use crate::error::{Error, Result};

/// Maximum number of quantization table sets in one stream
pub const MAX_QUANT_TABLE_SETS: usize = 8;

/// Number of quantized neighbour differences feeding the context model
pub const MAX_CONTEXT_INPUTS: usize = 5;

/// Format ceiling on contexts per quantization table set
pub const MAX_CONTEXT_COUNT: u32 = 32768;

/// Color space coded in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// Planar YCbCr, planes coded independently
    YCbCr,
    /// RGB via the reversible JPEG2000-RCT transform, lines interleaved
    Rgb,
}

/// Symbol-coding mode, fixed for the whole stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoderKind {
    /// Golomb-Rice codes read directly from the bit reader
    GolombRice,
    /// Range coder with the default state transition table
    Range,
    /// Range coder with per-stream state transition deltas
    RangeCustom,
}

/// One quantization table set: five per-difference tables plus everything
/// derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTableSet {
    /// Quantized lookup per signed difference, one table per context input
    pub tables: [[i16; 256]; MAX_CONTEXT_INPUTS],
    /// Product of per-difference quantization levels, folded for sign
    pub context_count: u32,
    /// Initial range-coder states per context, 128s unless coded
    pub initial_states: Vec<[u8; CONTEXT_SIZE]>,
}

/// Parsed, immutable codec configuration for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Bitstream version (only 3 is supported)
    pub version: u8,
    pub micro_version: u8,
    pub coder: CoderKind,
    /// Effective state transition table (defaults plus stream deltas)
    pub state_transition: [u8; 256],
    pub color_space: ColorSpace,
    /// Bits per sample, 8 to 16
    pub bits_per_raw_sample: u8,
    /// Whether Cb/Cr planes are present
    pub chroma_planes: bool,
    /// Log2 horizontal chroma subsampling factor
    pub log2_chroma_h: u8,
    /// Log2 vertical chroma subsampling factor
    pub log2_chroma_v: u8,
    /// Whether a full-resolution alpha plane is present
    pub extra_plane: bool,
    /// Slice grid columns
    pub num_h_slices: u32,
    /// Slice grid rows
    pub num_v_slices: u32,
    pub quant_table_sets: Vec<QuantTableSet>,
    /// Per-slice error detection (footer error status and CRC)
    pub error_correction: bool,
    /// All frames are keyframes
    pub intra: bool,
    /// Frame width in luma samples, from the container
    pub width: u32,
    /// Frame height in luma samples, from the container
    pub height: u32,
}

impl StreamConfig {
    /// Parse a configuration record.
    ///
    /// `extradata` must be the raw codec-private bytes with any container
    /// framing already stripped; `width` and `height` come from the
    /// container. Any inconsistency is fatal: no frame can be decoded
    /// without a valid configuration.
    pub fn parse(extradata: &[u8], width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_input(format!(
                "invalid dimensions: {}x{}",
                width, height
            )));
        }
        if extradata.len() < 4 {
            return Err(Error::config("configuration record too short"));
        }

        // The record includes its own CRC parity and must hash to zero.
        if crc32(extradata) != 0 {
            return Err(Error::config(
                "configuration record failed its CRC check",
            ));
        }

        let mut coder = RangeCoder::new(extradata)?;
        let mut state = [128u8; CONTEXT_SIZE];

        let version = coder.decode_uint(&mut state)?;
        if version != 3 {
            return Err(Error::unsupported(format!(
                "FFV1 version {} (only version 3 is implemented)",
                version
            )));
        }

        let micro_version = coder.decode_uint(&mut state)?;
        if micro_version < 1 {
            return Err(Error::unsupported(
                "FFV1 version 3 micro versions below 1",
            ));
        }

        let coder_type = coder.decode_uint(&mut state)?;
        let kind = match coder_type {
            0 => CoderKind::GolombRice,
            1 => CoderKind::Range,
            2 => CoderKind::RangeCustom,
            other => {
                return Err(Error::config(format!("invalid coder_type: {}", other)))
            }
        };

        let mut state_transition = DEFAULT_STATE_TRANSITION;
        if kind == CoderKind::RangeCustom {
            for i in 1..256 {
                let delta = coder.decode_sint(&mut state)?;
                let value = i32::from(DEFAULT_STATE_TRANSITION[i]) + delta;
                if !(0..=255).contains(&value) {
                    return Err(Error::config(format!(
                        "state_transition_delta[{}] out of range",
                        i
                    )));
                }
                state_transition[i] = value as u8;
            }
        }

        let color_space = match coder.decode_uint(&mut state)? {
            0 => ColorSpace::YCbCr,
            1 => ColorSpace::Rgb,
            other => {
                return Err(Error::config(format!(
                    "invalid colorspace_type: {}",
                    other
                )))
            }
        };

        let mut bits_per_raw_sample = coder.decode_uint(&mut state)? as u8;
        if bits_per_raw_sample == 0 {
            bits_per_raw_sample = 8;
        }
        if !(8..=16).contains(&bits_per_raw_sample) {
            return Err(Error::unsupported(format!(
                "{} bits per raw sample",
                bits_per_raw_sample
            )));
        }
        if kind == CoderKind::GolombRice && bits_per_raw_sample != 8 {
            return Err(Error::config(
                "Golomb-Rice mode requires 8 bits per sample",
            ));
        }

        let chroma_planes = coder.decode_bool(&mut state);
        if color_space == ColorSpace::Rgb && !chroma_planes {
            return Err(Error::config("RGB streams must carry chroma planes"));
        }

        let log2_chroma_h = coder.decode_uint(&mut state)? as u8;
        let log2_chroma_v = coder.decode_uint(&mut state)? as u8;
        if color_space == ColorSpace::Rgb && (log2_chroma_h != 0 || log2_chroma_v != 0) {
            return Err(Error::config("RGB streams cannot be subsampled"));
        }
        if log2_chroma_h > 2 || log2_chroma_v > 2 {
            return Err(Error::unsupported(format!(
                "chroma subsampling {}x{}",
                log2_chroma_h, log2_chroma_v
            )));
        }

        let extra_plane = coder.decode_bool(&mut state);
        let num_h_slices = coder.decode_uint(&mut state)? + 1;
        let num_v_slices = coder.decode_uint(&mut state)? + 1;
        if num_h_slices > width || num_v_slices > height {
            return Err(Error::config(format!(
                "slice grid {}x{} does not tile a {}x{} frame",
                num_h_slices, num_v_slices, width, height
            )));
        }

        let quant_table_set_count = coder.decode_uint(&mut state)? as usize;
        if quant_table_set_count == 0 {
            return Err(Error::config("quant_table_set_count may not be zero"));
        }
        if quant_table_set_count > MAX_QUANT_TABLE_SETS {
            return Err(Error::config(format!(
                "too many quant table sets: {} > {}",
                quant_table_set_count, MAX_QUANT_TABLE_SETS
            )));
        }

        let mut quant_table_sets = Vec::with_capacity(quant_table_set_count);
        for _ in 0..quant_table_set_count {
            quant_table_sets.push(parse_quant_table_set(&mut coder)?);
        }

        // Initial context states follow the tables, delta-coded against the
        // previous context's states.
        for set in quant_table_sets.iter_mut() {
            let states_coded = coder.decode_bool(&mut state);
            if !states_coded {
                continue;
            }
            for j in 0..set.initial_states.len() {
                for k in 0..CONTEXT_SIZE {
                    let pred = if j != 0 {
                        i32::from(set.initial_states[j - 1][k])
                    } else {
                        128
                    };
                    let delta = coder.decode_sint(&mut state)?;
                    set.initial_states[j][k] = ((pred + delta) & 255) as u8;
                }
            }
        }

        let error_correction = match coder.decode_uint(&mut state)? {
            0 => false,
            1 => true,
            other => {
                return Err(Error::unsupported(format!("ec type {}", other)))
            }
        };
        let intra = coder.decode_uint(&mut state)? != 0;

        Ok(StreamConfig {
            version: version as u8,
            micro_version: micro_version as u8,
            coder: kind,
            state_transition,
            color_space,
            bits_per_raw_sample,
            chroma_planes,
            log2_chroma_h,
            log2_chroma_v,
            extra_plane,
            num_h_slices,
            num_v_slices,
            quant_table_sets,
            error_correction,
            intra,
            width,
            height,
        })
    }

    /// Number of coded planes
    pub fn plane_count(&self) -> usize {
        let mut planes = 1;
        if self.chroma_planes {
            planes += 2;
        }
        if self.extra_plane {
            planes += 1;
        }
        planes
    }

    /// Number of per-slice quant-table-set indexes: one for luma, one for
    /// the chroma pair, one for the alpha plane. Version 3 always codes
    /// the chroma slot, even when no chroma planes are present.
    pub fn quant_index_count(&self) -> usize {
        2 + self.extra_plane as usize
    }

    /// Total number of slices per frame
    pub fn slice_count(&self) -> usize {
        (self.num_h_slices * self.num_v_slices) as usize
    }

    /// Whether the stream uses the range coder (with either table)
    pub fn is_range_coded(&self) -> bool {
        self.coder != CoderKind::GolombRice
    }
}

/// Parse one quantization table set.
///
/// Each of the five tables is run-length coded as quantization-level
/// lengths over the non-negative half; the negative half mirrors it.
fn parse_quant_table_set(coder: &mut RangeCoder<'_>) -> Result<QuantTableSet> {
    let mut tables = [[0i16; 256]; MAX_CONTEXT_INPUTS];
    let mut scale: u32 = 1;

    for table in tables.iter_mut() {
        // Each table is coded with its own fresh context.
        let mut quant_state = [128u8; CONTEXT_SIZE];
        let mut v: i32 = 0;
        let mut k: usize = 0;
        while k < 128 {
            let len = coder.decode_uint(&mut quant_state)? as usize + 1;
            if k + len > 128 {
                return Err(Error::config(
                    "quantization table runs exceed the sample range",
                ));
            }
            for _ in 0..len {
                table[k] = (scale as i32 * v) as i16;
                k += 1;
            }
            v += 1;
        }
        for k in 1..128 {
            table[256 - k] = -table[k];
        }
        table[128] = -table[127];
        scale = scale
            .checked_mul(2 * v as u32 - 1)
            .filter(|&s| (s + 1) / 2 <= MAX_CONTEXT_COUNT)
            .ok_or_else(|| {
                Error::config(format!(
                    "context count exceeds the format ceiling of {}",
                    MAX_CONTEXT_COUNT
                ))
            })?;
    }

    let context_count = (scale + 1) / 2;
    Ok(QuantTableSet {
        tables,
        context_count,
        initial_states: vec![[128u8; CONTEXT_SIZE]; context_count as usize],
    })
}
