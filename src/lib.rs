//! ffv1dec - An FFV1 version 3 lossless video decoder in pure Rust
//!
//! FFV1 is the lossless intra/inter video codec standardized in RFC 9043
//! and widely used for archival. This crate decodes version 3 streams:
//! YCbCr and RGB, 8 to 16 bits per sample, range or Golomb-Rice entropy
//! coding, multi-slice frames with optional per-slice CRC protection.
//!
//! # Architecture
//!
//! - `config`: configuration record (extradata) parsing
//! - `coder`: range coder and Golomb-Rice coder
//! - `slice`: slice location, headers, and entropy decoding
//! - `frame`: decoded frame and plane representation
//! - `decoder`: the stateful per-stream frame decoder
//! - `prediction`: median prediction and context modelling
//! - `rct`: the reversible color transform for RGB streams
//!
//! # Example
//!
//! ```no_run
//! use ffv1dec::Decoder;
//!
//! # fn demo(extradata: &[u8], packet: &[u8]) -> ffv1dec::Result<()> {
//! let mut decoder = Decoder::from_extradata(extradata, 1920, 1080)?;
//! let frame = decoder.decode_frame(packet)?;
//! if frame.is_corrupt() {
//!     eprintln!("{} damaged slice(s)", frame.corruption.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod bitstream;
pub mod coder;
pub mod config;
pub mod crc;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod prediction;
pub mod rct;
mod slice;

pub use config::{ColorSpace, CoderKind, QuantTableSet, StreamConfig};
pub use decoder::Decoder;
pub use error::{Error, Result};
pub use frame::{DecodedFrame, Plane, PlaneSamples, Rect, SliceCorruption};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
