//! Spatial prediction and context modeling
//!
//! Every sample is coded as a residual against the median of its causal
//! neighbours, under a probability model selected by quantizing the local
//! gradients. Both directions live here: neighbour derivation and context
//! classification before entropy decoding, and sample reconstruction after.

use num_traits::AsPrimitive;

use crate::config::MAX_CONTEXT_INPUTS;

/// Causal neighbourhood of one sample position.
///
/// ```text
/// +----+----+----+----+
/// |    |    | tt |    |
/// +----+----+----+----+
/// |    | tl |  t | tr |
/// +----+----+----+----+
/// | ll |  l |  X |    |
/// +----+----+----+----+
/// ```
///
/// Samples outside the plane take the value 0; the first column substitutes
/// the sample above for the missing left neighbour, and the top row clamps
/// the top-right neighbour to its own column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbourhood {
    pub tt: i32,
    pub ll: i32,
    pub t: i32,
    pub l: i32,
    pub tr: i32,
    pub tl: i32,
}

/// Derive the neighbourhood of `(x, y)` from the already-decoded part of a
/// plane. `width` and `stride` are in samples; only causal positions are
/// ever read.
pub fn neighbourhood<T>(plane: &[T], x: usize, y: usize, width: usize, stride: usize) -> Neighbourhood
where
    T: AsPrimitive<i32>,
{
    let pos = y * stride + x;

    let tt = if y > 1 { plane[pos - 2 * stride].as_() } else { 0 };

    let ll = if y > 0 && x == 1 {
        plane[pos - stride - 1].as_()
    } else if x > 1 {
        plane[pos - 2].as_()
    } else {
        0
    };

    let t = if y > 0 { plane[pos - stride].as_() } else { 0 };

    let l = if x > 0 {
        plane[pos - 1].as_()
    } else if y > 0 {
        plane[pos - stride].as_()
    } else {
        0
    };

    let tl = if y > 1 && x == 0 {
        plane[pos - 2 * stride].as_()
    } else if y > 0 && x > 0 {
        plane[pos - stride - 1].as_()
    } else {
        0
    };

    let tr = if y > 0 {
        plane[pos - stride + (width - 1 - x).min(1)].as_()
    } else {
        0
    };

    Neighbourhood { tt, ll, t, l, tr, tl }
}

/// Quantize the neighbour gradients into a signed context index.
///
/// The five signed differences each index their quantization table; the
/// tables carry positional weights, so the plain sum is the context. The
/// caller folds the sign into the residual.
pub fn classify(tables: &[[i16; 256]; MAX_CONTEXT_INPUTS], n: &Neighbourhood) -> i32 {
    i32::from(tables[0][(n.l - n.tl) as usize & 255])
        + i32::from(tables[1][(n.tl - n.t) as usize & 255])
        + i32::from(tables[2][(n.t - n.tr) as usize & 255])
        + i32::from(tables[3][(n.ll - n.l) as usize & 255])
        + i32::from(tables[4][(n.tt - n.t) as usize & 255])
}

/// Median of three values
pub fn median(a: i32, b: i32, c: i32) -> i32 {
    a + b + c - a.min(b.min(c)) - a.max(b.max(c))
}

/// Median prediction from the left, top, and gradient-combined neighbours
pub fn predict(n: &Neighbourhood) -> i32 {
    median(n.l, n.t, n.l + n.t - n.tl)
}

/// Reconstruct a sample from its prediction and decoded residual.
///
/// FFV1 wraps modulo the coded sample range rather than clamping, so
/// overflow in either direction folds back into `[0, 2^shift)`.
#[inline]
pub fn reconstruct(prediction: i32, residual: i32, shift: u32) -> u32 {
    ((prediction + residual) & ((1 << shift) - 1)) as u32
}
