//! Slice layout and decoding
//!
//! A frame payload carries one slice per cell of the configured grid, each
//! independently entropy coded and followed by a footer holding its byte
//! size (plus an error status and CRC when error correction is on). Slices
//! are located by walking the footers back from the end of the payload,
//! then decoded in isolation into slice-local plane buffers.

use byteorder::{BigEndian, ByteOrder};
use num_traits::AsPrimitive;

use crate::coder::{GolombCoder, RangeCoder, VlcState, CONTEXT_SIZE};
use crate::config::{CoderKind, ColorSpace, StreamConfig, MAX_CONTEXT_INPUTS};
use crate::crc::crc32;
use crate::error::{Error, Result};
use crate::frame::{ceil_shift, PlaneSamples, Rect};
use crate::prediction::{classify, neighbourhood, predict, reconstruct};
use crate::rct;

/// Footer bytes per slice: 3-byte size, plus error status and CRC when
/// error correction is enabled
fn footer_len(error_correction: bool) -> usize {
    if error_correction {
        8
    } else {
        3
    }
}

/// Position and footer data of one slice within a frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SliceInfo {
    /// Offset of the slice's first coded byte within the payload
    pub pos: usize,
    /// Coded byte size, excluding the footer
    pub size: usize,
    /// Error status from the footer; nonzero means damaged upstream
    pub error_status: u8,
}

/// Locate every slice in a frame payload by walking the footers from the
/// end. Returns the slices in coded order (first slice first).
pub(crate) fn parse_slice_footers(payload: &[u8], error_correction: bool) -> Result<Vec<SliceInfo>> {
    let footer = footer_len(error_correction);
    let mut end = payload.len();
    let mut infos = Vec::new();

    while end > 0 {
        let footer_start = end
            .checked_sub(footer)
            .ok_or_else(|| Error::corrupt("slice footer extends past start of payload"))?;
        let size = BigEndian::read_u24(&payload[footer_start..]) as usize;
        let error_status = if error_correction {
            payload[footer_start + 3]
        } else {
            0
        };
        let pos = footer_start
            .checked_sub(size)
            .ok_or_else(|| Error::corrupt("slice size extends past start of payload"))?;

        infos.push(SliceInfo { pos, size, error_status });
        end = pos;
    }

    infos.reverse();
    Ok(infos)
}

/// Read the keyframe flag, the first range-coded bit of a frame payload
pub(crate) fn is_keyframe(payload: &[u8]) -> Result<bool> {
    let mut coder = RangeCoder::new(payload)?;
    let mut state = 128u8;
    Ok(coder.decode_bit(&mut state))
}

/// Per-slice header, range coded at the start of each slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SliceHeader {
    /// Grid column of the slice
    pub slice_x: u32,
    /// Grid row of the slice
    pub slice_y: u32,
    /// Width in grid cells
    pub width_units: u32,
    /// Height in grid cells
    pub height_units: u32,
    /// Quant table set per plane type: luma, chroma, alpha
    pub quant_set_index: Vec<usize>,
    pub picture_structure: u32,
    pub sar_num: u32,
    pub sar_den: u32,
}

fn parse_slice_header(coder: &mut RangeCoder<'_>, config: &StreamConfig) -> Result<SliceHeader> {
    let mut state = [128u8; CONTEXT_SIZE];

    let slice_x = coder.decode_uint(&mut state)?;
    let slice_y = coder.decode_uint(&mut state)?;
    let width_units = coder.decode_uint(&mut state)? + 1;
    let height_units = coder.decode_uint(&mut state)? + 1;

    if slice_x >= config.num_h_slices
        || slice_y >= config.num_v_slices
        || width_units > config.num_h_slices - slice_x
        || height_units > config.num_v_slices - slice_y
    {
        return Err(Error::corrupt("slice position outside the slice grid"));
    }

    let mut quant_set_index = Vec::with_capacity(config.quant_index_count());
    for _ in 0..config.quant_index_count() {
        let index = coder.decode_uint(&mut state)? as usize;
        if index >= config.quant_table_sets.len() {
            return Err(Error::corrupt("slice references an undefined quant table set"));
        }
        quant_set_index.push(index);
    }

    let picture_structure = coder.decode_uint(&mut state)?;
    let mut sar_num = coder.decode_uint(&mut state)?;
    let mut sar_den = coder.decode_uint(&mut state)?;
    if (sar_num == 0) != (sar_den == 0) {
        tracing::warn!(sar_num, sar_den, "ignoring invalid sample aspect ratio");
        sar_num = 0;
        sar_den = 0;
    }

    Ok(SliceHeader {
        slice_x,
        slice_y,
        width_units,
        height_units,
        quant_set_index,
        picture_structure,
        sar_num,
        sar_den,
    })
}

/// Luma rectangle of a slice spanning the given grid cells.
///
/// Cell edges sit at `i * frame_dim / grid_dim`, so slices tile the frame
/// exactly whatever the rounding.
pub(crate) fn grid_rect(
    frame_width: u32,
    frame_height: u32,
    num_h: u32,
    num_v: u32,
    slice_x: u32,
    slice_y: u32,
    width_units: u32,
    height_units: u32,
) -> Rect {
    let edge = |cell: u32, dim: u32, cells: u32| -> u32 {
        (u64::from(cell) * u64::from(dim) / u64::from(cells)) as u32
    };
    let x0 = edge(slice_x, frame_width, num_h);
    let x1 = edge(slice_x + width_units, frame_width, num_h);
    let y0 = edge(slice_y, frame_height, num_v);
    let y1 = edge(slice_y + height_units, frame_height, num_v);
    Rect { x: x0, y: y0, width: x1 - x0, height: y1 - y0 }
}

/// Geometry of one plane's portion of a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlaneGeom {
    /// Offset into the frame plane, in plane samples
    pub start_x: u32,
    pub start_y: u32,
    /// Slice extent within the plane, in plane samples
    pub width: u32,
    pub height: u32,
    /// Plane type: 0 luma, 1 chroma, 2 alpha. Indexes the slice header's
    /// quant table choices and the persistent context states.
    pub slot: usize,
}

fn plane_geometry(config: &StreamConfig, rect: Rect) -> Vec<PlaneGeom> {
    let luma = PlaneGeom {
        start_x: rect.x,
        start_y: rect.y,
        width: rect.width,
        height: rect.height,
        slot: 0,
    };

    let mut geoms = vec![luma];
    if config.chroma_planes {
        // Chroma slices start at the floor of the subsampled origin and
        // cover the ceiling of the subsampled extent.
        let chroma = PlaneGeom {
            start_x: rect.x >> config.log2_chroma_h,
            start_y: rect.y >> config.log2_chroma_v,
            width: ceil_shift(rect.width, config.log2_chroma_h),
            height: ceil_shift(rect.height, config.log2_chroma_v),
            slot: 1,
        };
        geoms.push(chroma);
        geoms.push(chroma);
    }
    if config.extra_plane {
        geoms.push(PlaneGeom { slot: 2, ..luma });
    }
    geoms
}

/// Adaptive entropy state for one slice, persisted across frames so that
/// non-keyframes can continue from where the previous frame left off.
#[derive(Debug, Clone, Default)]
pub(crate) struct SliceCoderState {
    /// Range coder contexts per plane type
    range: Vec<Vec<[u8; CONTEXT_SIZE]>>,
    /// Golomb-Rice contexts per plane type
    vlc: Vec<Vec<VlcState>>,
}

impl SliceCoderState {
    /// Reinitialize for a keyframe from the configured initial states
    fn reset(&mut self, config: &StreamConfig, header: &SliceHeader) {
        self.range.clear();
        self.vlc.clear();
        for &set_index in &header.quant_set_index {
            let set = &config.quant_table_sets[set_index];
            let contexts = set.context_count as usize;
            if config.is_range_coded() {
                let mut states = vec![[128u8; CONTEXT_SIZE]; contexts];
                for (state, initial) in states.iter_mut().zip(set.initial_states.iter()) {
                    *state = *initial;
                }
                self.range.push(states);
            } else {
                self.vlc.push(vec![VlcState::default(); contexts]);
            }
        }
    }

    /// Verify that carried-over state matches this frame's header; a
    /// non-keyframe is undecodable without the states of a prior keyframe
    fn check(&self, config: &StreamConfig, header: &SliceHeader) -> Result<()> {
        let states_len = if config.is_range_coded() {
            self.range.len()
        } else {
            self.vlc.len()
        };
        if states_len != header.quant_set_index.len() {
            return Err(Error::corrupt("no keyframe state to continue from"));
        }
        for (slot, &set_index) in header.quant_set_index.iter().enumerate() {
            let expected = config.quant_table_sets[set_index].context_count as usize;
            let actual = if config.is_range_coded() {
                self.range[slot].len()
            } else {
                self.vlc[slot].len()
            };
            if actual != expected {
                return Err(Error::corrupt("slice state does not match the previous keyframe"));
            }
        }
        Ok(())
    }
}

/// Decoded output of one slice: slice-local plane buffers ready to be
/// blitted into the frame
pub(crate) struct SliceOutput {
    pub rect: Rect,
    pub sar_num: u32,
    pub sar_den: u32,
    pub planes: Vec<(PlaneGeom, PlaneSamples)>,
}

/// A slice decode failure, with the affected rectangle when the header
/// got far enough to establish one
#[derive(Debug, Clone)]
pub(crate) struct SliceError {
    pub rect: Option<Rect>,
    pub error: Error,
}

/// Either entropy coder, fixed for the pixel payload of one slice
enum Coder<'a> {
    Range(RangeCoder<'a>),
    Golomb(GolombCoder<'a>),
}

/// Decode one slice of a frame payload into slice-local buffers.
///
/// Verifies the footer CRC when error correction is on, parses the slice
/// header, resets or carries the adaptive state depending on `keyframe`,
/// and entropy decodes every plane. Errors never touch anything outside
/// this slice.
pub(crate) fn decode_slice(
    config: &StreamConfig,
    states: &mut SliceCoderState,
    payload: &[u8],
    info: &SliceInfo,
    slice_index: usize,
    keyframe: bool,
) -> std::result::Result<SliceOutput, SliceError> {
    let fail = |error: Error| SliceError { rect: None, error };

    let footer = footer_len(config.error_correction);
    let data = payload
        .get(info.pos..info.pos + info.size + footer)
        .ok_or_else(|| fail(Error::EndOfBuffer))?;

    if config.error_correction {
        if info.error_status != 0 {
            return Err(fail(Error::corrupt("slice flagged as damaged by the encoder")));
        }
        if crc32(data) != 0 {
            return Err(fail(Error::CrcMismatch { slice: slice_index }));
        }
    }

    let slice_buf = &data[..info.size];
    let mut range = RangeCoder::new(slice_buf).map_err(fail)?;
    if slice_index == 0 {
        // The keyframe flag leads the first slice; the caller has already
        // read it through `is_keyframe`.
        let mut state = 128u8;
        range.decode_bit(&mut state);
    }
    if config.coder == CoderKind::RangeCustom {
        range.set_state_transition(&config.state_transition);
    }

    let header = parse_slice_header(&mut range, config).map_err(fail)?;
    let rect = grid_rect(
        config.width,
        config.height,
        config.num_h_slices,
        config.num_v_slices,
        header.slice_x,
        header.slice_y,
        header.width_units,
        header.height_units,
    );

    decode_slice_content(config, states, &header, rect, slice_buf, range, keyframe)
        .map_err(|error| SliceError { rect: Some(rect), error })
}

/// Entropy decode a slice's planes once its header and geometry are known
fn decode_slice_content(
    config: &StreamConfig,
    states: &mut SliceCoderState,
    header: &SliceHeader,
    rect: Rect,
    slice_buf: &[u8],
    mut range: RangeCoder<'_>,
    keyframe: bool,
) -> Result<SliceOutput> {
    let geoms = plane_geometry(config, rect);

    if keyframe {
        states.reset(config, header);
    } else {
        states.check(config, header)?;
    }

    let mut coder = if config.is_range_coded() {
        Coder::Range(range)
    } else {
        range.sentinel_end();
        let offset = range.position().saturating_sub(1);
        Coder::Golomb(GolombCoder::new(slice_buf.get(offset..).unwrap_or(&[])))
    };

    let bits = u32::from(config.bits_per_raw_sample);
    let planes: Vec<PlaneSamples> = match (config.color_space, config.bits_per_raw_sample) {
        (ColorSpace::YCbCr, 8) => {
            let bufs =
                decode_yuv_planes::<u8>(&mut coder, config, header, states, &geoms, bits)?;
            bufs.into_iter().map(PlaneSamples::B8).collect()
        }
        (ColorSpace::YCbCr, _) => {
            let bufs =
                decode_yuv_planes::<u16>(&mut coder, config, header, states, &geoms, bits)?;
            bufs.into_iter().map(PlaneSamples::B16).collect()
        }
        (ColorSpace::Rgb, 8) => {
            // 9-bit coded samples through a u16 scratch, folded to 8-bit GBR
            let src =
                decode_rct_planes::<u16>(&mut coder, config, header, states, &geoms, bits + 1)?;
            let (w, h) = (rect.width as usize, rect.height as usize);
            let mut dst = vec![vec![0u8; w * h]; src.len()];
            rct::rct_to_gbr8(&mut dst, &src, w, h);
            dst.into_iter().map(PlaneSamples::B8).collect()
        }
        (ColorSpace::Rgb, depth) if depth < 16 && !config.extra_plane => {
            let mut bufs =
                decode_rct_planes::<u16>(&mut coder, config, header, states, &geoms, bits + 1)?;
            rct::rct_to_gbr16_in_place(&mut bufs, rect.width as usize, rect.height as usize, bits);
            bufs.into_iter().map(PlaneSamples::B16).collect()
        }
        (ColorSpace::Rgb, _) => {
            // 17-bit intermediates (or an alpha plane alongside mid-depth
            // samples) need the u32 scratch
            let src =
                decode_rct_planes::<u32>(&mut coder, config, header, states, &geoms, bits + 1)?;
            let (w, h) = (rect.width as usize, rect.height as usize);
            let mut dst = vec![vec![0u16; w * h]; src.len()];
            rct::rct_to_gbr16(&mut dst, &src, w, h, bits);
            dst.into_iter().map(PlaneSamples::B16).collect()
        }
    };

    let planes = geoms.into_iter().zip(planes).collect();
    Ok(SliceOutput {
        rect,
        sar_num: header.sar_num,
        sar_den: header.sar_den,
        planes,
    })
}

/// Decode YCbCr planes sequentially: all of luma, then each chroma plane,
/// then alpha
fn decode_yuv_planes<T>(
    coder: &mut Coder<'_>,
    config: &StreamConfig,
    header: &SliceHeader,
    states: &mut SliceCoderState,
    geoms: &[PlaneGeom],
    bits: u32,
) -> Result<Vec<Vec<T>>>
where
    T: Copy + 'static + AsPrimitive<i32>,
    u32: AsPrimitive<T>,
{
    let zero: T = 0u32.as_();
    let mut bufs = Vec::with_capacity(geoms.len());
    for geom in geoms {
        let (w, h) = (geom.width as usize, geom.height as usize);
        let mut buf = vec![zero; w * h];
        if let Coder::Golomb(golomb) = coder {
            golomb.new_plane(geom.width);
        }
        let tables = &config.quant_table_sets[header.quant_set_index[geom.slot]].tables;
        for y in 0..h {
            decode_line(coder, states, geom.slot, tables, &mut buf, w, y, bits)?;
        }
        bufs.push(buf);
    }
    Ok(bufs)
}

/// Decode RCT planes line-interleaved: for each row, one line of every
/// plane in turn
fn decode_rct_planes<T>(
    coder: &mut Coder<'_>,
    config: &StreamConfig,
    header: &SliceHeader,
    states: &mut SliceCoderState,
    geoms: &[PlaneGeom],
    shift: u32,
) -> Result<Vec<Vec<T>>>
where
    T: Copy + 'static + AsPrimitive<i32>,
    u32: AsPrimitive<T>,
{
    let zero: T = 0u32.as_();
    let (w, h) = (geoms[0].width as usize, geoms[0].height as usize);
    let mut bufs = vec![vec![zero; w * h]; geoms.len()];
    if let Coder::Golomb(golomb) = coder {
        golomb.new_plane(geoms[0].width);
    }
    for y in 0..h {
        for (geom, buf) in geoms.iter().zip(bufs.iter_mut()) {
            // Alpha is coded at the sample depth, not the widened RCT depth
            let line_shift = if geom.slot == 2 { shift - 1 } else { shift };
            let tables = &config.quant_table_sets[header.quant_set_index[geom.slot]].tables;
            decode_line(coder, states, geom.slot, tables, buf, w, y, line_shift)?;
        }
    }
    Ok(bufs)
}

/// Decode one line of one plane into a slice-local buffer
#[allow(clippy::too_many_arguments)]
fn decode_line<T>(
    coder: &mut Coder<'_>,
    states: &mut SliceCoderState,
    slot: usize,
    tables: &[[i16; 256]; MAX_CONTEXT_INPUTS],
    buf: &mut [T],
    width: usize,
    y: usize,
    shift: u32,
) -> Result<()>
where
    T: Copy + 'static + AsPrimitive<i32>,
    u32: AsPrimitive<T>,
{
    if let Coder::Golomb(golomb) = coder {
        golomb.new_line();
    }

    for x in 0..width {
        let n = neighbourhood(buf, x, y, width, width);
        let mut context = classify(tables, &n);
        let sign = context < 0;
        if sign {
            context = -context;
        }

        let mut diff = match coder {
            Coder::Range(range) => {
                range.decode_sint(&mut states.range[slot][context as usize])?
            }
            Coder::Golomb(golomb) => {
                golomb.decode_residual(context, &mut states.vlc[slot][context as usize], shift)?
            }
        };
        if sign {
            diff = -diff;
        }

        let value = reconstruct(predict(&n), diff, shift);
        buf[y * width + x] = value.as_();
    }
    Ok(())
}
