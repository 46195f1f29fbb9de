//! Frame processing module
//!
//! Classical resampling of RGB24 frames with a selectable interpolation
//! kernel. Pure functions, no I/O.

mod scale;

pub use scale::{resize, Kernel, ResizeTarget};
