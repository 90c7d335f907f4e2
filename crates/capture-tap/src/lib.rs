//! Passive page instrumentation.
//!
//! A shim injected into the page records network calls, storage writes,
//! console output and DOM additions into an in-page queue. A background
//! poller swaps that queue out on a fixed interval and appends every entry,
//! numbered, to a [`CaptureLog`] that tests query and assert against while
//! the page keeps running.

pub mod assertions;
pub mod config;
pub mod errors;
pub mod log;
mod network;
pub mod query;
pub mod report;
pub mod session;
pub mod shim;

pub use config::CaptureConfig;
pub use errors::CaptureError;
pub use log::CaptureLog;
pub use query::SimpleSelector;
pub use report::CaptureReport;
pub use session::{CaptureSession, NetworkFeed, PageHost, ShimHost};
