//! Entropy coders
//!
//! FFV1 streams select one of two symbol-coding modes at configuration time:
//! the adaptive binary range coder or the Golomb-Rice coder. Slice headers
//! are always range coded; in Golomb-Rice mode the coder switches over after
//! a sentinel terminates the range-coded section.

pub mod golomb;
pub mod range;
pub mod tables;

pub use golomb::{GolombCoder, VlcState};
pub use range::{RangeCoder, CONTEXT_SIZE};
