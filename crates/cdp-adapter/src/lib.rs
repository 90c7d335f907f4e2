//! Remote debugging protocol connector.
//!
//! [`WsTransport`] keeps one websocket to the browser, correlates command
//! replies by id and fans unsolicited events out to listeners. [`CdpPage`]
//! layers element lookup, input and page inspection on top of it behind the
//! [`PageDriver`] trait; [`MemoryPage`] is the in-memory stand-in.

pub mod config;
pub mod error;
pub mod memory;
pub mod page;
pub mod protocol;
pub mod transport;

pub use config::CdpConfig;
pub use error::{AdapterError, AdapterErrorKind};
pub use memory::{ClickEffect, MemoryElement, MemoryPage};
pub use page::{CdpPage, ClickKind, DialogInfo, ElementHandle, FindBy, PageDriver, WindowInfo};
pub use protocol::{RemoteError, TargetInfo, TransportEvent};
pub use transport::{
    CdpTransport, CommandTarget, EventListener, ListenerId, NoopTransport, WsTransport,
};
