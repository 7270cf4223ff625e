//! Frame reconstruction for unframed byte streams.
//!
//! Producers write pixel buffers back to back over TCP with no length prefix.
//! This crate turns those streams back into discrete frames:
//! - [`FrameAccumulator`] slices fixed-size frames and carries surplus bytes over
//! - [`LineDecoder`] splits delimiter-terminated base64 text and decodes each line
//!
//! No partial frames ever leave this layer.

pub mod accumulator;
pub mod error;
pub mod frame;
pub mod line;

pub use accumulator::FrameAccumulator;
pub use error::{FrameError, Result};
pub use frame::{Frame, FrameKind};
pub use line::{LineDecoder, DEFAULT_DELIMITER, DEFAULT_MAX_LINE};
