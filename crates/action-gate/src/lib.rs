//! Gate primitives for replay
//!
//! - [`wait_until`]: poll a condition under a deadline
//! - [`PopupSentinel`]: find and handle dialogs, new windows and modal
//!   overlays before each step
//! - [`CheckpointMatcher`]: compare live values with recorded expectations

pub mod checkpoint;
pub mod errors;
pub mod popup;
pub mod wait;

pub use checkpoint::*;
pub use errors::*;
pub use popup::*;
pub use wait::*;
