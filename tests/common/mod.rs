//! Test-side FFV1 encoder.
//!
//! The decoder cannot be exercised against real capture files from unit
//! tests, so these helpers build conformant version 3 streams: the
//! configuration record, slice payloads in both entropy-coding modes, and
//! the slice footers. Every routine mirrors the corresponding decode path
//! exactly; a frame that encodes here must decode back bit for bit.

use ffv1dec::coder::golomb::sign_extend;
use ffv1dec::coder::tables::{DEFAULT_STATE_TRANSITION, LOG2_RUN};
use ffv1dec::coder::CONTEXT_SIZE;
use ffv1dec::config::{CoderKind, ColorSpace, StreamConfig};
use ffv1dec::crc::crc32;
use ffv1dec::frame::{Plane, PlaneSamples};
use ffv1dec::prediction::{classify, neighbourhood, predict};

/// Encode-side range coder, the mirror of `RangeCoder`
pub struct RangeEncoder {
    low: u32,
    rng: u32,
    out: Vec<u8>,
    outstanding_count: usize,
    outstanding_byte: i32,
    zero_state: [u8; 256],
    one_state: [u8; 256],
}

impl RangeEncoder {
    pub fn new() -> Self {
        let mut enc = RangeEncoder {
            low: 0,
            rng: 0xFF00,
            out: Vec::new(),
            outstanding_count: 0,
            outstanding_byte: -1,
            zero_state: [0; 256],
            one_state: [0; 256],
        };
        enc.set_state_transition(&DEFAULT_STATE_TRANSITION);
        enc
    }

    pub fn set_state_transition(&mut self, table: &[u8; 256]) {
        self.one_state.copy_from_slice(table);
        for i in 1..255 {
            self.zero_state[i] = (256 - u16::from(self.one_state[256 - i])) as u8;
        }
    }

    fn renorm(&mut self) {
        while self.rng < 0x100 {
            if self.outstanding_byte < 0 {
                self.outstanding_byte = (self.low >> 8) as i32;
            } else if self.low <= 0xFF00 {
                self.out.push(self.outstanding_byte as u8);
                self.out.extend(std::iter::repeat(0xFF).take(self.outstanding_count));
                self.outstanding_count = 0;
                self.outstanding_byte = (self.low >> 8) as i32;
            } else if self.low >= 0x10000 {
                self.out.push((self.outstanding_byte + 1) as u8);
                self.out.extend(std::iter::repeat(0x00).take(self.outstanding_count));
                self.outstanding_count = 0;
                self.outstanding_byte = ((self.low >> 8) & 0xFF) as i32;
            } else {
                self.outstanding_count += 1;
            }
            self.low = (self.low & 0xFF) << 8;
            self.rng <<= 8;
        }
    }

    pub fn put_bit(&mut self, state: &mut u8, bit: bool) {
        let r1 = (self.rng * u32::from(*state)) >> 8;
        if bit {
            self.low += self.rng - r1;
            self.rng = r1;
            *state = self.one_state[*state as usize];
        } else {
            self.rng -= r1;
            *state = self.zero_state[*state as usize];
        }
        self.renorm();
    }

    /// Encode a scalar symbol: zero flag, unary exponent, mantissa bits,
    /// and for signed symbols a sign bit
    pub fn put_symbol(&mut self, states: &mut [u8], v: i32, signed: bool) {
        if v == 0 {
            self.put_bit(&mut states[0], true);
            return;
        }
        let a = v.unsigned_abs();
        let e = 31 - a.leading_zeros();
        self.put_bit(&mut states[0], false);
        for i in 0..e {
            self.put_bit(&mut states[1 + i.min(9) as usize], true);
        }
        self.put_bit(&mut states[1 + e.min(9) as usize], false);
        for i in (0..e).rev() {
            self.put_bit(&mut states[22 + i.min(9) as usize], (a >> i) & 1 == 1);
        }
        if signed {
            self.put_bit(&mut states[11 + e.min(10) as usize], v < 0);
        }
    }

    /// Write the sentinel that ends the range-coded section ahead of a
    /// Golomb-Rice payload
    pub fn sentinel(&mut self) {
        let mut state: u8 = 129;
        self.put_bit(&mut state, false);
    }

    /// Flush and close the coded byte stream.
    ///
    /// The final pending byte is dropped; the decoder zero-fills past the
    /// end of the buffer, so the stream still decodes identically.
    pub fn terminate(mut self) -> Vec<u8> {
        self.rng = 0xFF;
        self.low += 0xFF;
        self.renorm();
        self.rng = 0xFF;
        self.renorm();
        self.out
    }
}

/// MSB-first bit accumulator for Golomb-Rice payloads
pub struct BitWriter {
    bits: Vec<bool>,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter { bits: Vec::new() }
    }

    pub fn put_bit(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    pub fn put_bits(&mut self, n: u32, v: u32) {
        for i in (0..n).rev() {
            self.bits.push((v >> i) & 1 == 1);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.bits.len() + 7) / 8);
        for chunk in self.bits.chunks(8) {
            let mut byte = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    byte |= 1 << (7 - i);
                }
            }
            out.push(byte);
        }
        out
    }
}

/// Encode-side twin of the decoder's adaptive Golomb-Rice context state
#[derive(Debug, Clone)]
pub struct EncVlcState {
    drift: i32,
    error_sum: i32,
    bias: i32,
    count: i32,
}

impl Default for EncVlcState {
    fn default() -> Self {
        EncVlcState { drift: 0, error_sum: 4, bias: 0, count: 1 }
    }
}

impl EncVlcState {
    fn k(&self) -> u32 {
        let mut i = self.count;
        let mut k = 0;
        while i < self.error_sum {
            k += 1;
            i += i;
        }
        k
    }

    fn update(&mut self, v: i32) {
        self.error_sum += v.abs();
        self.drift += v;
        if self.count == 128 {
            self.count >>= 1;
            self.drift >>= 1;
            self.error_sum >>= 1;
        }
        self.count += 1;
        if self.drift <= -self.count {
            self.bias = (self.bias - 1).max(-128);
            self.drift = (self.drift + self.count).max(-self.count + 1);
        } else if self.drift > 0 {
            self.bias = (self.bias + 1).min(127);
            self.drift = (self.drift - self.count).min(0);
        }
    }
}

/// Encode-side Golomb-Rice coder.
///
/// Only the run-break path of run mode is implemented: test images use
/// adjacent-distinct samples so a zero context is always followed by a
/// nonzero residual, coded as an immediate run break.
pub struct GolombEncoder {
    writer: BitWriter,
    run_mode: bool,
    run_index: usize,
    x: u32,
    width: u32,
}

impl GolombEncoder {
    pub fn new() -> Self {
        GolombEncoder {
            writer: BitWriter::new(),
            run_mode: false,
            run_index: 0,
            x: 0,
            width: 0,
        }
    }

    pub fn new_plane(&mut self, width: u32) {
        self.width = width;
        self.run_index = 0;
        self.x = 0;
    }

    pub fn new_line(&mut self) {
        assert!(!self.run_mode, "run spanning a line end is not supported here");
        assert!(self.x == 0 || self.x == self.width, "line ended mid-width");
        self.x = 0;
    }

    pub fn encode_residual(&mut self, context: i32, state: &mut EncVlcState, bits: u32, diff: i32) {
        if context == 0 && !self.run_mode {
            self.run_mode = true;
        }
        if self.run_mode {
            assert_ne!(diff, 0, "test images must break runs immediately");
            // A zero run-length break: one '0' run bit plus the coded
            // length of an empty partial run.
            self.writer.put_bits(1 + LOG2_RUN[self.run_index], 0);
            if self.run_index > 0 {
                self.run_index -= 1;
            }
            self.run_mode = false;
            let mut d = diff;
            // The symbol breaking a run skips the zero that would have
            // extended it.
            if d > 0 {
                d -= 1;
            }
            self.put_vlc_symbol(state, d, bits);
        } else {
            self.put_vlc_symbol(state, diff, bits);
        }
        self.x += 1;
    }

    fn put_vlc_symbol(&mut self, state: &mut EncVlcState, v: i32, bits: u32) {
        let v = sign_extend(v - state.bias, bits);
        let k = state.k();
        let code = if 2 * state.drift >= -state.count { v } else { -1 - v };
        self.put_signed_golomb(code, k, bits);
        state.update(v);
    }

    fn put_signed_golomb(&mut self, v: i32, k: u32, bits: u32) {
        let u = if v >= 0 { 2 * v } else { -2 * v - 1 };
        self.put_unsigned_golomb(u as u32, k, bits);
    }

    fn put_unsigned_golomb(&mut self, u: u32, k: u32, bits: u32) {
        let prefix = u >> k;
        if prefix < 12 {
            self.writer.put_bits(prefix, 0);
            self.writer.put_bit(true);
            self.writer.put_bits(k, u & ((1 << k) - 1));
        } else {
            self.writer.put_bits(12, 0);
            assert!(u - 11 < (1 << bits));
            self.writer.put_bits(bits, u - 11);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_bytes()
    }
}

/// Everything that goes into a configuration record
pub struct StreamSpec {
    pub coder_type: u32,
    pub bits: u32,
    pub colorspace: u32,
    pub chroma: bool,
    pub h_shift: u32,
    pub v_shift: u32,
    pub extra: bool,
    pub nh: u32,
    pub nv: u32,
    /// Per set, per context input, run lengths summing to 128
    pub quant_runs: Vec<Vec<Vec<u32>>>,
    pub ec: u32,
    pub intra: u32,
    pub state_deltas: Option<Vec<i32>>,
    /// Per set: coded initial context states, or none
    pub initial_states: Vec<Option<Vec<[u8; CONTEXT_SIZE]>>>,
}

impl Default for StreamSpec {
    fn default() -> Self {
        StreamSpec {
            coder_type: 1,
            bits: 8,
            colorspace: 0,
            chroma: true,
            h_shift: 0,
            v_shift: 0,
            extra: false,
            nh: 1,
            nv: 1,
            quant_runs: vec![default_runs()],
            ec: 0,
            intra: 0,
            state_deltas: None,
            initial_states: Vec::new(),
        }
    }
}

/// Two quantization levels per context input: 3^5 = 243 levels, 122 contexts
pub fn default_runs() -> Vec<Vec<u32>> {
    vec![vec![1, 127]; 5]
}

/// Mixed level counts per input: 5*5*3*3*1 = 225 levels, 113 contexts
pub fn fancy_runs() -> Vec<Vec<u32>> {
    vec![
        vec![1, 2, 125],
        vec![1, 2, 125],
        vec![1, 127],
        vec![1, 127],
        vec![128],
    ]
}

/// Build a configuration record, CRC parity included
pub fn build_config_record(spec: &StreamSpec) -> Vec<u8> {
    let mut enc = RangeEncoder::new();
    let mut st = [128u8; CONTEXT_SIZE];

    enc.put_symbol(&mut st, 3, false); // version
    enc.put_symbol(&mut st, 1, false); // micro_version
    enc.put_symbol(&mut st, spec.coder_type as i32, false);
    if spec.coder_type == 2 {
        for i in 1..256 {
            let delta = spec.state_deltas.as_ref().map_or(0, |d| d[i]);
            enc.put_symbol(&mut st, delta, true);
        }
    }
    enc.put_symbol(&mut st, spec.colorspace as i32, false);
    enc.put_symbol(&mut st, spec.bits as i32, false);
    enc.put_bit(&mut st[0], spec.chroma);
    enc.put_symbol(&mut st, spec.h_shift as i32, false);
    enc.put_symbol(&mut st, spec.v_shift as i32, false);
    enc.put_bit(&mut st[0], spec.extra);
    enc.put_symbol(&mut st, spec.nh as i32 - 1, false);
    enc.put_symbol(&mut st, spec.nv as i32 - 1, false);

    enc.put_symbol(&mut st, spec.quant_runs.len() as i32, false);
    for set in &spec.quant_runs {
        for table_runs in set {
            let mut quant_state = [128u8; CONTEXT_SIZE];
            for &len in table_runs {
                enc.put_symbol(&mut quant_state, len as i32 - 1, false);
            }
        }
    }

    for set_index in 0..spec.quant_runs.len() {
        match spec.initial_states.get(set_index).and_then(|s| s.as_ref()) {
            Some(states) => {
                enc.put_bit(&mut st[0], true);
                for j in 0..states.len() {
                    for k in 0..CONTEXT_SIZE {
                        let pred = if j > 0 { i32::from(states[j - 1][k]) } else { 128 };
                        let delta = i32::from(states[j][k]) - pred;
                        enc.put_symbol(&mut st, sign_extend(delta, 8), true);
                    }
                }
            }
            None => enc.put_bit(&mut st[0], false),
        }
    }

    enc.put_symbol(&mut st, spec.ec as i32, false);
    enc.put_symbol(&mut st, spec.intra as i32, false);

    let mut record = enc.terminate();
    let parity = crc32(&record);
    record.extend_from_slice(&parity.to_be_bytes());
    assert_eq!(crc32(&record), 0);
    record
}

/// Slice footer: 3-byte size, plus status byte and CRC when protected
pub fn slice_footer(data: &[u8], ec: bool) -> Vec<u8> {
    let size = data.len() as u32;
    let mut footer = vec![(size >> 16) as u8, (size >> 8) as u8, size as u8];
    if ec {
        footer.push(0);
        let mut whole = data.to_vec();
        whole.extend_from_slice(&footer);
        footer.extend_from_slice(&crc32(&whole).to_be_bytes());
    }
    footer
}

fn ceil_shift(value: u32, shift: u32) -> u32 {
    (value + (1 << shift) - 1) >> shift
}

#[derive(Clone, Copy)]
struct Geom {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    slot: usize,
}

fn slice_geoms(cfg: &StreamConfig, sx: u32, sy: u32) -> Vec<Geom> {
    let edge = |cell: u32, dim: u32, cells: u32| -> u32 {
        (u64::from(cell) * u64::from(dim) / u64::from(cells)) as u32
    };
    let x0 = edge(sx, cfg.width, cfg.num_h_slices);
    let x1 = edge(sx + 1, cfg.width, cfg.num_h_slices);
    let y0 = edge(sy, cfg.height, cfg.num_v_slices);
    let y1 = edge(sy + 1, cfg.height, cfg.num_v_slices);
    let luma = Geom { x: x0, y: y0, w: x1 - x0, h: y1 - y0, slot: 0 };

    let mut geoms = vec![luma];
    if cfg.chroma_planes {
        let chroma = Geom {
            x: x0 >> cfg.log2_chroma_h,
            y: y0 >> cfg.log2_chroma_v,
            w: ceil_shift(luma.w, u32::from(cfg.log2_chroma_h)),
            h: ceil_shift(luma.h, u32::from(cfg.log2_chroma_v)),
            slot: 1,
        };
        geoms.push(chroma);
        geoms.push(chroma);
    }
    if cfg.extra_plane {
        geoms.push(Geom { slot: 2, ..luma });
    }
    geoms
}

/// Persistent per-slice encoder state, the mirror of the decoder's
#[derive(Default)]
pub struct EncStates {
    range: Vec<Vec<[u8; CONTEXT_SIZE]>>,
    vlc: Vec<Vec<EncVlcState>>,
}

enum Enc {
    Range(RangeEncoder),
    Golomb { header: Vec<u8>, golomb: GolombEncoder },
}

/// Encode one slice of a frame.
///
/// `planes` are the full-frame planes in coded order: luma, Cb, Cr, alpha
/// for YCbCr; green, blue, red, alpha for RGB. Samples are plain integers
/// whatever the depth.
pub fn encode_slice(
    cfg: &StreamConfig,
    planes: &[Vec<i32>],
    sx: u32,
    sy: u32,
    slice_index: usize,
    states: &mut EncStates,
    keyframe: bool,
    quant_sets: &[usize],
) -> Vec<u8> {
    let mut enc = RangeEncoder::new();
    if slice_index == 0 {
        let mut state = 128u8;
        enc.put_bit(&mut state, keyframe);
    }
    if cfg.coder == CoderKind::RangeCustom {
        enc.set_state_transition(&cfg.state_transition);
    }

    let mut st = [128u8; CONTEXT_SIZE];
    enc.put_symbol(&mut st, sx as i32, false);
    enc.put_symbol(&mut st, sy as i32, false);
    enc.put_symbol(&mut st, 0, false); // width in cells - 1
    enc.put_symbol(&mut st, 0, false); // height in cells - 1
    let used_sets = &quant_sets[..cfg.quant_index_count()];
    for &qi in used_sets {
        enc.put_symbol(&mut st, qi as i32, false);
    }
    enc.put_symbol(&mut st, 0, false); // picture_structure
    enc.put_symbol(&mut st, 0, false); // sar_num
    enc.put_symbol(&mut st, 0, false); // sar_den

    if keyframe {
        states.range.clear();
        states.vlc.clear();
        for &qi in used_sets {
            let set = &cfg.quant_table_sets[qi];
            states.range.push(set.initial_states.clone());
            states.vlc.push(vec![EncVlcState::default(); set.context_count as usize]);
        }
    }

    let golomb_mode = cfg.coder == CoderKind::GolombRice;
    let mut coder = if golomb_mode {
        enc.sentinel();
        Enc::Golomb { header: enc.terminate(), golomb: GolombEncoder::new() }
    } else {
        Enc::Range(enc)
    };

    let geoms = slice_geoms(cfg, sx, sy);
    let bits = u32::from(cfg.bits_per_raw_sample);
    let chroma_width = ceil_shift(cfg.width, u32::from(cfg.log2_chroma_h));

    if cfg.color_space == ColorSpace::YCbCr {
        for (plane_index, geom) in geoms.iter().enumerate() {
            let plane_width = if geom.slot == 1 { chroma_width } else { cfg.width };
            let local = extract_rect(&planes[plane_index], plane_width as usize, geom);
            if let Enc::Golomb { golomb, .. } = &mut coder {
                golomb.new_plane(geom.w);
            }
            for y in 0..geom.h as usize {
                encode_line(
                    &mut coder,
                    states,
                    geom.slot,
                    &cfg.quant_table_sets[quant_sets[geom.slot]].tables,
                    &local,
                    geom.w as usize,
                    y,
                    bits,
                );
            }
        }
    } else {
        // Forward JPEG2000-RCT, then lines interleaved across planes
        let (w, h) = (geoms[0].w as usize, geoms[0].h as usize);
        let locals: Vec<Vec<i32>> = planes
            .iter()
            .map(|p| extract_rect(p, cfg.width as usize, &geoms[0]))
            .collect();
        let offset = 1i32 << bits;
        let mask = (1i32 << (bits + 1)) - 1;
        let mut coded = locals.clone();
        for i in 0..w * h {
            let g = locals[0][i];
            let b = locals[1][i];
            let r = locals[2][i];
            let cb = b - g;
            let cr = r - g;
            coded[0][i] = (g + ((cb + cr) >> 2)) & mask;
            coded[1][i] = cb + offset;
            coded[2][i] = cr + offset;
        }
        if let Enc::Golomb { golomb, .. } = &mut coder {
            golomb.new_plane(geoms[0].w);
        }
        for y in 0..h {
            for (plane_index, geom) in geoms.iter().enumerate() {
                let shift = if geom.slot == 2 { bits } else { bits + 1 };
                encode_line(
                    &mut coder,
                    states,
                    geom.slot,
                    &cfg.quant_table_sets[quant_sets[geom.slot]].tables,
                    &coded[plane_index],
                    w,
                    y,
                    shift,
                );
            }
        }
    }

    match coder {
        Enc::Range(enc) => enc.terminate(),
        Enc::Golomb { mut header, golomb } => {
            header.extend(golomb.into_bytes());
            header
        }
    }
}

fn extract_rect(plane: &[i32], plane_width: usize, geom: &Geom) -> Vec<i32> {
    let (x0, y0) = (geom.x as usize, geom.y as usize);
    let (w, h) = (geom.w as usize, geom.h as usize);
    let mut local = Vec::with_capacity(w * h);
    for row in 0..h {
        let from = (y0 + row) * plane_width + x0;
        local.extend_from_slice(&plane[from..from + w]);
    }
    local
}

#[allow(clippy::too_many_arguments)]
fn encode_line(
    coder: &mut Enc,
    states: &mut EncStates,
    slot: usize,
    tables: &[[i16; 256]; 5],
    buf: &[i32],
    width: usize,
    y: usize,
    shift: u32,
) {
    if let Enc::Golomb { golomb, .. } = coder {
        golomb.new_line();
    }
    for x in 0..width {
        let n = neighbourhood(buf, x, y, width, width);
        let mut context = classify(tables, &n);
        let sign = context < 0;
        if sign {
            context = -context;
        }
        let sample = buf[y * width + x];
        let mut diff = sign_extend(sample - predict(&n), shift);
        if sign {
            diff = -diff;
        }
        match coder {
            Enc::Range(enc) => enc.put_symbol(&mut states.range[slot][context as usize], diff, true),
            Enc::Golomb { golomb, .. } => {
                golomb.encode_residual(context, &mut states.vlc[slot][context as usize], shift, diff)
            }
        }
    }
}

/// Deterministic 8-bit test image
pub fn image(w: usize, h: usize, seed: u32) -> Vec<i32> {
    let mut s = u64::from(seed);
    (0..w * h)
        .map(|_| {
            s = (s * 1103515245 + 12345) & 0x7FFF_FFFF;
            ((s >> 16) & 0xFF) as i32
        })
        .collect()
}

/// Deterministic 16-bit test image
pub fn image16(w: usize, h: usize, seed: u32) -> Vec<i32> {
    let mut s = u64::from(seed);
    (0..w * h)
        .map(|_| {
            s = (s * 1103515245 + 12345) & 0x7FFF_FFFF;
            ((s >> 8) & 0xFFFF) as i32
        })
        .collect()
}

/// 8-bit image with adjacent-distinct samples, so Golomb-Rice runs always
/// break on the next sample
pub fn image_rundodge(w: usize, h: usize, seed: u32) -> Vec<i32> {
    let mut s = u64::from(seed);
    let mut prev = -1i32;
    (0..w * h)
        .map(|_| {
            s = (s * 1103515245 + 12345) & 0x7FFF_FFFF;
            let mut v = ((s >> 16) & 0xFF) as i32;
            if v == prev {
                v = (v + 1) & 0xFF;
            }
            prev = v;
            v
        })
        .collect()
}

/// Decoded plane samples widened to plain integers for comparison
pub fn plane_values(plane: &Plane) -> Vec<i32> {
    match &plane.samples {
        PlaneSamples::B8(v) => v.iter().map(|&s| i32::from(s)).collect(),
        PlaneSamples::B16(v) => v.iter().map(|&s| i32::from(s)).collect(),
    }
}
