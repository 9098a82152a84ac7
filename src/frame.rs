//! Decoded frame representation

use crate::config::{ColorSpace, StreamConfig};
use crate::error::Error;

/// A rectangle of luma samples within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Sample storage for one plane, sized by the stream's bit depth
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaneSamples {
    /// 8-bit samples
    B8(Vec<u8>),
    /// 9- to 16-bit samples
    B16(Vec<u16>),
}

impl PlaneSamples {
    /// Number of samples in the plane
    pub fn len(&self) -> usize {
        match self {
            PlaneSamples::B8(v) => v.len(),
            PlaneSamples::B16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded pixel plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    /// Plane width in samples
    pub width: u32,
    /// Plane height in samples
    pub height: u32,
    /// Flat sample array, row major, stride equal to width
    pub samples: PlaneSamples,
}

/// Corruption record for one slice of a decoded frame.
///
/// Errors local to a slice never abort its siblings; they are attached to
/// the returned frame so the caller can decide what to do with the
/// best-effort pixels inside the affected rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceCorruption {
    /// Index of the slice within the frame
    pub slice: usize,
    /// Luma rectangle covered by the slice, or `None` when the slice
    /// header itself could not be decoded
    pub rect: Option<Rect>,
    /// What went wrong
    pub error: Error,
}

/// A fully decoded frame.
///
/// Planes are in the codec's native order: luma, Cb, Cr, alpha for YCbCr
/// streams and green, blue, red, alpha for RGB streams. Chroma planes are
/// subsampled as declared in the stream configuration; all other planes
/// are full resolution.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Frame width in luma samples
    pub width: u32,
    /// Frame height in luma samples
    pub height: u32,
    /// Bits per sample (8-16)
    pub bit_depth: u8,
    pub color_space: ColorSpace,
    /// Whether Cb/Cr planes are present
    pub has_chroma: bool,
    /// Whether an alpha plane is present
    pub has_alpha: bool,
    /// Log2 horizontal chroma subsampling
    pub log2_chroma_h: u8,
    /// Log2 vertical chroma subsampling
    pub log2_chroma_v: u8,
    /// Whether the frame was coded as a keyframe
    pub keyframe: bool,
    /// Sample aspect ratio from the first slice, 0/0 when unspecified
    pub sar_num: u32,
    pub sar_den: u32,
    /// Decoded planes
    pub planes: Vec<Plane>,
    /// Per-slice corruption, empty for a clean frame
    pub corruption: Vec<SliceCorruption>,
}

impl DecodedFrame {
    /// Allocate a zeroed frame sized to the stream configuration
    pub(crate) fn alloc(config: &StreamConfig) -> Self {
        let deep = config.bits_per_raw_sample > 8;
        let chroma_width = ceil_shift(config.width, config.log2_chroma_h);
        let chroma_height = ceil_shift(config.height, config.log2_chroma_v);

        let mut planes = Vec::with_capacity(config.plane_count());
        planes.push(Plane::zeroed(config.width, config.height, deep));
        if config.chroma_planes {
            // RGB never subsamples, so these are full size there.
            planes.push(Plane::zeroed(chroma_width, chroma_height, deep));
            planes.push(Plane::zeroed(chroma_width, chroma_height, deep));
        }
        if config.extra_plane {
            planes.push(Plane::zeroed(config.width, config.height, deep));
        }

        DecodedFrame {
            width: config.width,
            height: config.height,
            bit_depth: config.bits_per_raw_sample,
            color_space: config.color_space,
            has_chroma: config.chroma_planes,
            has_alpha: config.extra_plane,
            log2_chroma_h: if config.chroma_planes { config.log2_chroma_h } else { 0 },
            log2_chroma_v: if config.chroma_planes { config.log2_chroma_v } else { 0 },
            keyframe: false,
            sar_num: 0,
            sar_den: 0,
            planes: Vec::new(),
            corruption: Vec::new(),
        }
        .with_planes(planes)
    }

    fn with_planes(mut self, planes: Vec<Plane>) -> Self {
        self.planes = planes;
        self
    }

    /// Whether any slice of this frame failed to decode cleanly
    pub fn is_corrupt(&self) -> bool {
        !self.corruption.is_empty()
    }
}

impl Plane {
    fn zeroed(width: u32, height: u32, deep: bool) -> Self {
        let len = width as usize * height as usize;
        let samples = if deep {
            PlaneSamples::B16(vec![0u16; len])
        } else {
            PlaneSamples::B8(vec![0u8; len])
        };
        Plane { width, height, samples }
    }
}

/// Shift right, rounding up: the subsampled size of a plane dimension
pub(crate) fn ceil_shift(value: u32, shift: u8) -> u32 {
    (value + (1 << shift) - 1) >> shift
}
