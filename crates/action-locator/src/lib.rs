//! Element location with self-healing
//!
//! This crate resolves recorded element descriptors against a live page:
//! - Ordered lookup over the recorded id, name, css and xpath values
//! - One healer consultation when all of them miss
//! - A tag + visible text XPath as the last resort

pub mod errors;
pub mod healer;
pub mod interceptor;
pub mod resolver;
pub mod types;

pub use errors::*;
pub use healer::*;
pub use interceptor::*;
pub use resolver::*;
pub use types::*;
