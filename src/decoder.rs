//! Frame decoder
//!
//! Owns the parsed stream configuration and the per-slice adaptive coder
//! states, which persist across frames so non-keyframes can continue from
//! the states their keyframe left behind. Slices are independent by
//! construction, so their entropy decoding runs in parallel; the decoded
//! slice rectangles are then copied into the frame sequentially.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::frame::{DecodedFrame, PlaneSamples, SliceCorruption};
use crate::slice::{
    decode_slice, is_keyframe, parse_slice_footers, PlaneGeom, SliceCoderState, SliceOutput,
};

/// Stateful FFV1 frame decoder for one stream
pub struct Decoder {
    config: StreamConfig,
    states: Vec<SliceCoderState>,
    seen_keyframe: bool,
}

impl Decoder {
    /// Create a decoder from a parsed stream configuration
    pub fn new(config: StreamConfig) -> Self {
        let slices = config.slice_count();
        Decoder {
            config,
            states: vec![SliceCoderState::default(); slices],
            seen_keyframe: false,
        }
    }

    /// Create a decoder straight from the codec configuration record.
    ///
    /// `extradata` must be the bare configuration record; container
    /// framing (such as a VFW BITMAPINFOHEADER in front of it) is the
    /// caller's job to strip. `width` and `height` come from the
    /// container.
    pub fn from_extradata(extradata: &[u8], width: u32, height: u32) -> Result<Self> {
        Ok(Decoder::new(StreamConfig::parse(extradata, width, height)?))
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Decode one frame payload.
    ///
    /// Fatal errors (no slices can be located, or an inter frame arrives
    /// with no keyframe state to build on) fail the whole call. Anything
    /// local to a slice is contained: the rest of the frame decodes and
    /// the failure is recorded in [`DecodedFrame::corruption`].
    pub fn decode_frame(&mut self, payload: &[u8]) -> Result<DecodedFrame> {
        if payload.is_empty() {
            return Err(Error::invalid_input("empty frame payload"));
        }

        let keyframe = is_keyframe(payload)? || self.config.intra;
        if !keyframe && !self.seen_keyframe {
            return Err(Error::corrupt("inter frame before the first keyframe"));
        }

        let infos = parse_slice_footers(payload, self.config.error_correction)?;
        if infos.len() != self.config.slice_count() {
            return Err(Error::corrupt("frame slice count does not match the configuration"));
        }

        let config = &self.config;
        let results: Vec<_> = self
            .states
            .par_iter_mut()
            .zip(infos.par_iter())
            .enumerate()
            .map(|(index, (state, info))| {
                decode_slice(config, state, payload, info, index, keyframe)
            })
            .collect();

        let mut frame = DecodedFrame::alloc(&self.config);
        frame.keyframe = keyframe;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(output) => {
                    if index == 0 {
                        frame.sar_num = output.sar_num;
                        frame.sar_den = output.sar_den;
                    }
                    blit_slice(&mut frame, output);
                }
                Err(failure) => {
                    warn!(slice = index, error = %failure.error, "slice failed to decode");
                    frame.corruption.push(SliceCorruption {
                        slice: index,
                        rect: failure.rect,
                        error: failure.error,
                    });
                }
            }
        }

        if keyframe {
            self.seen_keyframe = true;
        }
        debug!(
            keyframe,
            slices = self.config.slice_count(),
            corrupt = frame.corruption.len(),
            "decoded frame"
        );
        Ok(frame)
    }
}

/// Copy a slice's local plane buffers into their rectangles of the frame
fn blit_slice(frame: &mut DecodedFrame, output: SliceOutput) {
    for (plane_index, (geom, samples)) in output.planes.into_iter().enumerate() {
        let plane = &mut frame.planes[plane_index];
        let stride = plane.width as usize;
        match (&mut plane.samples, samples) {
            (PlaneSamples::B8(dst), PlaneSamples::B8(src)) => {
                copy_rect(dst, stride, &src, &geom);
            }
            (PlaneSamples::B16(dst), PlaneSamples::B16(src)) => {
                copy_rect(dst, stride, &src, &geom);
            }
            // Slice depth always matches the frame allocation
            _ => debug_assert!(false, "slice and frame sample depth disagree"),
        }
    }
}

fn copy_rect<T: Copy>(dst: &mut [T], dst_stride: usize, src: &[T], geom: &PlaneGeom) {
    let w = geom.width as usize;
    for row in 0..geom.height as usize {
        let from = row * w;
        let to = (geom.start_y as usize + row) * dst_stride + geom.start_x as usize;
        dst[to..to + w].copy_from_slice(&src[from..from + w]);
    }
}
